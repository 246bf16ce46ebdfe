//! Run-to-completion step semantics: firing paths, entering and exiting
//! states, history capture and replay, completion cascades, deferral,
//! timers and activities.

use super::active::ActiveNode;
use super::error::ExecutionError;
use super::listener::TransitionInfo;
use super::reentry::Inbound;
use super::resolver::{dead_end, Path, Resolver};
use super::scheduler::Task;
use super::status::{ActivityGate, ActivityHandle, StateStatus};
use super::{Executor, Phase, TakeOutcome};
use crate::core::{
    Activity, CancelToken, Event, EventKey, PseudoKind, RegionId, StateMachine, TransitionId,
    TransitionKind, VertexId, VertexKind, VertexOwner,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

impl<C: 'static> Executor<C> {
    pub(super) fn start_machine(&mut self) -> Result<(), ExecutionError> {
        self.phase = Phase::Started;
        info!(machine = self.machine.id(), instance = %self.instance, "machine started");
        let id = self.machine.id().to_string();
        self.listeners.notify(|l| l.machine_started(&id));

        let event = Event::Completion;
        self.enter_defaults(&event)?;
        self.settle()
    }

    pub(super) fn dispatch(&mut self, event: &Event) -> Result<TakeOutcome, ExecutionError> {
        if self.step(event)? {
            self.listeners.notify(|l| l.event_accepted(event));
            self.settle()?;
            return Ok(TakeOutcome::Accepted);
        }
        if self.is_deferred(&event.key()) {
            debug!(machine = self.machine.id(), ?event, "event deferred");
            self.deferred.push_back(event.clone());
            self.listeners.notify(|l| l.event_deferred(event));
            return Ok(TakeOutcome::Deferred);
        }
        Ok(self.deny(event))
    }

    pub(super) fn dispatch_in(
        &mut self,
        event: &Event,
        state: VertexId,
    ) -> Result<TakeOutcome, ExecutionError> {
        let machine = Arc::clone(&self.machine);
        let mut fired = false;
        let mut cursor = Some(state);
        while let Some(current) = cursor {
            if let Some(path) = self.resolve(event, current)? {
                self.fire_root(&path, event)?;
                fired = true;
                break;
            }
            cursor = machine.container_state(current);
        }
        self.joins.clear_all();

        if !fired {
            return Ok(self.deny(event));
        }
        self.listeners.notify(|l| l.event_accepted(event));
        self.settle()?;
        Ok(TakeOutcome::Accepted)
    }

    pub(super) fn handle_inbound(&mut self, inbound: Inbound) -> Result<(), ExecutionError> {
        if self.phase != Phase::Started {
            debug!(machine = self.machine.id(), ?inbound, "machine not running; inbound dropped");
            return Ok(());
        }
        match inbound {
            Inbound::Timeout {
                state,
                activation,
                transition,
            } => {
                if !self.is_current(state, activation) {
                    trace!(?state, activation, "stale timeout dropped");
                    return Ok(());
                }
                self.dispatch_in(&Event::Timeout(transition), state)
                    .map(|_| ())
            }
            Inbound::ActivityDone { state, activation } => {
                if !self.is_current(state, activation) {
                    trace!(?state, activation, "stale activity completion dropped");
                    return Ok(());
                }
                if let Some(status) = self.status.get_mut(&state) {
                    status.activity = None;
                    status.activity_finished = true;
                }
                self.settle()
            }
        }
    }

    fn is_current(&self, state: VertexId, activation: u64) -> bool {
        self.active.is_active(state)
            && self
                .status
                .get(&state)
                .is_some_and(|status| status.activation == activation)
    }

    fn is_deferred(&self, key: &EventKey) -> bool {
        self.active.all().into_iter().any(|state| {
            self.machine
                .vertex(state)
                .state()
                .is_some_and(|data| data.defers(key))
        })
    }

    pub(super) fn resolve(
        &mut self,
        event: &Event,
        vertex: VertexId,
    ) -> Result<Option<Path>, ExecutionError> {
        Resolver {
            machine: &self.machine,
            context: &self.context,
            history: &self.history,
            joins: &mut self.joins,
            disabled: &mut self.disabled,
            listeners: &self.listeners,
            failover: self.config.history_failover,
        }
        .resolve(event, vertex)
    }

    /// Offer `event` to every active leaf, walking outward until a state
    /// takes it. Returns whether anything fired.
    fn step(&mut self, event: &Event) -> Result<bool, ExecutionError> {
        let machine = Arc::clone(&self.machine);
        let mut fired = false;
        let mut visited = HashSet::new();

        for leaf in self.active.leaves() {
            if self.phase == Phase::Terminated {
                break;
            }
            if !self.active.is_active(leaf) {
                continue;
            }
            let mut cursor = Some(leaf);
            while let Some(state) = cursor {
                if !visited.insert(state) {
                    break;
                }
                if let Some(path) = self.resolve(event, state)? {
                    self.fire_root(&path, event)?;
                    fired = true;
                    // Outer transitions would conflict with the one just taken.
                    visited.extend(machine.ancestors(state));
                    break;
                }
                cursor = machine.container_state(state);
            }
        }
        self.joins.clear_all();
        Ok(fired)
    }

    /// Fire a resolved path, then fill any region it left empty.
    pub(super) fn fire_root(&mut self, path: &Path, event: &Event) -> Result<(), ExecutionError> {
        self.fire(path, event)?;
        if self.phase == Phase::Started {
            self.enter_defaults(event)?;
        }
        Ok(())
    }

    fn fire(&mut self, path: &Path, event: &Event) -> Result<(), ExecutionError> {
        let machine = Arc::clone(&self.machine);
        let transition = machine.transition(path.transition);
        let info = TransitionInfo::describe(&machine, path.transition);
        debug!(
            machine = machine.id(),
            source = info.source,
            target = info.target,
            kind = ?info.kind,
            "firing transition"
        );
        self.listeners.notify(|l| l.transition_started(&info));

        let terminates = matches!(
            machine.vertex(transition.target()).kind(),
            VertexKind::Pseudo(PseudoKind::Terminate)
        );
        if transition.kind() == TransitionKind::Internal {
            self.run_effect(&machine, path.transition, event);
        } else if terminates {
            // The configuration is frozen as is; nothing is exited.
            self.run_effect(&machine, path.transition, event);
            self.terminate();
        } else {
            self.leave(transition.owner(), event)?;
            self.run_effect(&machine, path.transition, event);
            self.enter(path, event)?;
        }

        self.listeners.notify(|l| l.transition_ended(&info));
        Ok(())
    }

    fn run_effect(&mut self, machine: &StateMachine<C>, transition: TransitionId, event: &Event) {
        let Some(effect) = machine.transition(transition).effect() else {
            return;
        };
        let info = TransitionInfo::describe(machine, transition);
        self.listeners.notify(|l| l.effect_before(&info));
        match effect.run(&mut self.context, event) {
            Ok(()) => self.listeners.notify(|l| l.effect_after(&info)),
            Err(error) => {
                warn!(source = info.source, target = info.target, %error, "transition effect failed");
                self.listeners.notify(|l| l.effect_exception(&info, &error));
            }
        }
    }

    /// Enter the target of `path.transition` and continue along the path.
    fn enter(&mut self, path: &Path, event: &Event) -> Result<(), ExecutionError> {
        let machine = Arc::clone(&self.machine);
        let target = machine.transition(path.transition).target();
        let vertex = machine.vertex(target);

        for state in self.inactive_ancestry(&machine, target) {
            self.activate(state, event)?;
        }

        let kind = match vertex.kind() {
            VertexKind::Pseudo(kind) => *kind,
            _ => return Ok(()),
        };
        let next = || path.next.first().ok_or_else(|| dead_end(&machine, target));

        match kind {
            PseudoKind::Initial
            | PseudoKind::Junction
            | PseudoKind::EntryPoint
            | PseudoKind::ExitPoint => self.fire(next()?, event),
            PseudoKind::Choice => {
                let chosen = self
                    .resolve(event, target)?
                    .ok_or_else(|| dead_end(&machine, target))?;
                self.fire(&chosen, event)
            }
            PseudoKind::Fork => {
                let first = next()?;
                self.leave(machine.transition(first.transition).owner(), event)?;
                for branch in &path.next {
                    let info = TransitionInfo::describe(&machine, branch.transition);
                    self.listeners.notify(|l| l.transition_started(&info));
                    self.run_effect(&machine, branch.transition, event);
                    self.enter(branch, event)?;
                    self.listeners.notify(|l| l.transition_ended(&info));
                }
                Ok(())
            }
            PseudoKind::Join => {
                for &incoming in vertex.incoming() {
                    if incoming != path.transition {
                        self.run_effect(&machine, incoming, event);
                    }
                }
                self.joins.clear(target);
                self.fire(next()?, event)
            }
            PseudoKind::ShallowHistory | PseudoKind::DeepHistory => match path.next.first() {
                Some(default) => self.fire(default, event),
                None => self.restore_history(target, kind == PseudoKind::DeepHistory, event),
            },
            PseudoKind::Terminate => {
                self.terminate();
                Ok(())
            }
        }
    }

    /// States to activate, outermost first, so that `vertex` ends up with
    /// an active container.
    fn inactive_ancestry(&self, machine: &StateMachine<C>, vertex: VertexId) -> Vec<VertexId> {
        let target = machine.vertex(vertex);
        let anchor = match target.kind() {
            VertexKind::State(_) | VertexKind::Final => Some(vertex),
            VertexKind::Pseudo(PseudoKind::EntryPoint) => match target.owner() {
                VertexOwner::State(state) => Some(state),
                _ => None,
            },
            VertexKind::Pseudo(PseudoKind::ExitPoint) => None,
            VertexKind::Pseudo(_) => machine.container_state(vertex),
        };

        let mut chain = Vec::new();
        let mut cursor = anchor;
        while let Some(state) = cursor {
            if self.active.is_active(state) {
                break;
            }
            chain.push(state);
            cursor = machine.container_state(state);
        }
        chain.reverse();
        chain
    }

    /// Mark `state` active, run its entry behaviors, start its activity
    /// and arm its timers.
    fn activate(&mut self, state: VertexId, event: &Event) -> Result<(), ExecutionError> {
        let machine = Arc::clone(&self.machine);
        self.mark_active(&machine, state, Utc::now())?;

        let vertex = machine.vertex(state);
        let id = vertex.id();
        trace!(machine = machine.id(), state = id, "entering state");
        self.listeners.notify(|l| l.state_enter_before(id));
        if let Some(data) = vertex.state() {
            for behavior in &data.entry {
                if let Err(error) = behavior.run(&mut self.context, event) {
                    warn!(state = id, %error, "entry behavior failed");
                    self.listeners.notify(|l| l.state_enter_exception(id, &error));
                }
            }
        }
        self.listeners.notify(|l| l.state_enter_after(id));

        self.start_work(&machine, state);
        Ok(())
    }

    /// Record `state` as active without running behaviors.
    pub(super) fn mark_active(
        &mut self,
        machine: &StateMachine<C>,
        state: VertexId,
        activated_at: DateTime<Utc>,
    ) -> Result<(), ExecutionError> {
        let vertex = machine.vertex(state);
        let region = vertex
            .region()
            .ok_or_else(|| ExecutionError::UnknownState(vertex.id().to_string()))?;
        self.active
            .activate(state, region, machine.container_state(state))?;
        self.serial += 1;
        self.status
            .insert(state, StateStatus::new(self.serial, activated_at));
        Ok(())
    }

    /// Start the activity and arm the timers of a freshly active state.
    pub(super) fn start_work(&mut self, machine: &StateMachine<C>, state: VertexId) {
        if let Some(activity) = machine.vertex(state).state().and_then(|data| data.activity()) {
            self.start_activity(machine, state, activity.clone());
        }
        self.arm_timers(machine, state);
    }

    /// Exit whatever is active in `region`, innermost first.
    fn leave(&mut self, region: RegionId, event: &Event) -> Result<(), ExecutionError> {
        if let Some(state) = self.active.active_in(region) {
            self.capture_history(region)?;
            self.exit_state(state, event)?;
        }
        Ok(())
    }

    fn exit_state(&mut self, state: VertexId, event: &Event) -> Result<(), ExecutionError> {
        let machine = Arc::clone(&self.machine);
        let vertex = machine.vertex(state);
        if let Some(data) = vertex.state() {
            for &region in data.regions() {
                self.leave(region, event)?;
            }
        }

        let id = vertex.id();
        trace!(machine = machine.id(), state = id, "exiting state");
        self.listeners.notify(|l| l.state_exit_before(id));
        if let Some(data) = vertex.state() {
            for behavior in &data.exit {
                if let Err(error) = behavior.run(&mut self.context, event) {
                    warn!(state = id, %error, "exit behavior failed");
                    self.listeners.notify(|l| l.state_exit_exception(id, &error));
                }
            }
        }
        if let Some(mut status) = self.status.remove(&state) {
            status.cancel();
        }
        self.active.deactivate(state);
        self.listeners.notify(|l| l.state_exit_after(id));
        Ok(())
    }

    /// Save what is active in `region` if the region owns a history
    /// pseudostate. A region left from its final state forgets its history.
    fn capture_history(&mut self, region: RegionId) -> Result<(), ExecutionError> {
        let machine = Arc::clone(&self.machine);
        let owner = machine.region(region);
        if !owner.has_history() {
            return Ok(());
        }
        let Some(state) = self.active.active_in(region) else {
            return Ok(());
        };
        if machine.vertex(state).is_final() {
            self.history.forget(region);
            return Ok(());
        }

        let saved = if owner.deep_history().is_some() {
            self.active.subtree(state)?
        } else {
            ActiveNode::leaf(state)
        };
        self.history.record(region, saved);

        if !self.disabled.is_empty() {
            for history in [owner.shallow_history(), owner.deep_history()]
                .into_iter()
                .flatten()
            {
                for transition in machine.vertex(history).incoming() {
                    self.disabled.remove(transition);
                }
            }
        }
        Ok(())
    }

    fn restore_history(
        &mut self,
        history: VertexId,
        deep: bool,
        event: &Event,
    ) -> Result<(), ExecutionError> {
        let machine = Arc::clone(&self.machine);
        let vertex = machine.vertex(history);
        let saved = vertex
            .region()
            .and_then(|region| self.history.get(region))
            .cloned()
            .ok_or_else(|| ExecutionError::UnreachableHistory {
                vertex: vertex.id().to_string(),
            })?;
        debug!(history = vertex.id(), deep, "restoring history");
        if deep {
            self.replay(&saved, event)
        } else {
            self.activate(saved.state, event)
        }
    }

    fn replay(&mut self, node: &ActiveNode, event: &Event) -> Result<(), ExecutionError> {
        if !self.active.is_active(node.state) {
            self.activate(node.state, event)?;
        }
        for child in &node.children {
            self.replay(child, event)?;
        }
        Ok(())
    }

    /// Default-enter every empty region that should have an active state.
    fn enter_defaults(&mut self, event: &Event) -> Result<(), ExecutionError> {
        while let Some(region) = self.first_empty_region() {
            self.default_enter(region, event)?;
            if self.phase != Phase::Started {
                return Ok(());
            }
            if self.active.active_in(region).is_none() {
                let initial = self.machine.region(region).initial();
                return Err(match initial {
                    Some(initial) => dead_end(&self.machine, initial),
                    None => ExecutionError::MissingInitial {
                        region: self.region_label(region),
                    },
                });
            }
        }
        Ok(())
    }

    fn first_empty_region(&self) -> Option<RegionId> {
        let machine = &self.machine;
        let top = machine
            .top_regions()
            .iter()
            .copied()
            .find(|region| self.active.active_in(*region).is_none());
        if top.is_some() {
            return top;
        }
        self.active.all().into_iter().find_map(|state| {
            machine.vertex(state).state().and_then(|data| {
                data.regions()
                    .iter()
                    .copied()
                    .find(|region| self.active.active_in(*region).is_none())
            })
        })
    }

    fn default_enter(&mut self, region: RegionId, event: &Event) -> Result<(), ExecutionError> {
        let initial = self
            .machine
            .region(region)
            .initial()
            .ok_or_else(|| ExecutionError::MissingInitial {
                region: self.region_label(region),
            })?;
        let path = self
            .resolve(event, initial)?
            .ok_or_else(|| dead_end(&self.machine, initial))?;
        self.fire(&path, event)
    }

    /// Stop everything without running exit behaviors.
    fn terminate(&mut self) {
        for status in self.status.values_mut() {
            status.cancel();
        }
        self.phase = Phase::Terminated;
        self.deferred.clear();
        info!(machine = self.machine.id(), instance = %self.instance, "machine terminated");
        let id = self.machine.id().to_string();
        self.listeners.notify(|l| l.machine_terminated(&id));
    }

    /// Terminate once every top region rests in a final state.
    fn check_finished(&mut self) -> bool {
        if self.phase == Phase::Terminated {
            return true;
        }
        let machine = Arc::clone(&self.machine);
        let finished = !machine.top_regions().is_empty()
            && machine.top_regions().iter().all(|&region| {
                self.active
                    .active_in(region)
                    .is_some_and(|state| machine.vertex(state).is_final())
            });
        if finished {
            self.terminate();
        }
        finished
    }

    /// Completion cascade followed by a retry of deferred events.
    pub(super) fn settle(&mut self) -> Result<(), ExecutionError> {
        self.run_completions()?;
        self.retry_deferred()
    }

    fn run_completions(&mut self) -> Result<(), ExecutionError> {
        let completion = Event::Completion;
        let mut previous: Option<(Vec<VertexId>, u64)> = None;

        for _ in 0..self.config.max_completion_iterations {
            if self.check_finished() {
                return Ok(());
            }
            let completed = self.completed_states();
            if completed.is_empty() {
                return Ok(());
            }
            // Without a fingerprint a context change is invisible, so only
            // an idle iteration or the iteration cap ends the cascade.
            let observed = self
                .fingerprint
                .as_ref()
                .map(|digest| (completed.clone(), digest(&self.context)));
            if observed.is_some() && previous == observed {
                debug!(machine = self.machine.id(), "completion loop reached a fixpoint");
                return Ok(());
            }

            let mut fired = false;
            for state in completed {
                if self.phase != Phase::Started {
                    break;
                }
                if !self.active.is_active(state) {
                    continue;
                }
                if let Some(path) = self.resolve(&completion, state)? {
                    self.fire_root(&path, &completion)?;
                    fired = true;
                }
            }
            self.joins.clear_all();
            if !fired {
                self.check_finished();
                return Ok(());
            }
            previous = observed;
        }

        warn!(
            machine = self.machine.id(),
            limit = self.config.max_completion_iterations,
            "completion cascade hit the iteration limit"
        );
        self.check_finished();
        Ok(())
    }

    /// Completed states with completion transitions, innermost first.
    fn completed_states(&self) -> Vec<VertexId> {
        let machine = &self.machine;
        let mut completed: Vec<VertexId> = self
            .active
            .all()
            .into_iter()
            .filter(|&state| {
                let vertex = machine.vertex(state);
                !vertex.completions().is_empty() && self.is_completed(machine, state)
            })
            .collect();
        completed.reverse();
        completed
    }

    fn is_completed(&self, machine: &StateMachine<C>, state: VertexId) -> bool {
        let Some(data) = machine.vertex(state).state() else {
            return false;
        };
        let activity_done = data.activity().is_none()
            || self
                .status
                .get(&state)
                .is_some_and(|status| status.activity_finished);
        activity_done
            && data.regions().iter().all(|&region| {
                self.active
                    .active_in(region)
                    .is_some_and(|child| machine.vertex(child).is_final())
            })
    }

    fn retry_deferred(&mut self) -> Result<(), ExecutionError> {
        if self.deferred.is_empty() {
            return Ok(());
        }
        let pending: Vec<Event> = self.deferred.drain(..).collect();
        for event in pending {
            if self.phase != Phase::Started {
                break;
            }
            if self.is_deferred(&event.key()) {
                self.deferred.push_back(event);
                continue;
            }
            debug!(machine = self.machine.id(), ?event, "retrying deferred event");
            if self.step(&event)? {
                self.listeners.notify(|l| l.event_accepted(&event));
                self.run_completions()?;
            } else {
                self.deny(&event);
            }
        }
        Ok(())
    }

    fn arm_timers(&mut self, machine: &StateMachine<C>, state: VertexId) {
        let triggers = machine.vertex(state).time_triggers();
        if triggers.is_empty() {
            return;
        }
        let Some(status) = self.status.get_mut(&state) else {
            return;
        };
        if !status.timers.is_empty() {
            return;
        }
        let elapsed = (Utc::now() - status.activated_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        for &transition in triggers {
            let delay = machine.transition(transition).delay().unwrap_or_default();
            let remaining = match delay.checked_sub(elapsed) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => {
                    warn!(
                        state = machine.vertex(state).id(),
                        ?delay,
                        ?elapsed,
                        "time trigger already due; firing immediately"
                    );
                    Duration::ZERO
                }
            };
            let reentry = Arc::clone(&self.reentry);
            let inbound = Inbound::Timeout {
                state,
                activation: status.activation,
                transition,
            };
            let task: Task = Box::new(move || reentry.deliver(inbound));
            status.timers.push(self.scheduler.schedule(remaining, task));
        }
    }

    fn start_activity(&mut self, machine: &StateMachine<C>, state: VertexId, activity: Activity) {
        let Some(status) = self.status.get_mut(&state) else {
            return;
        };
        let gate = ActivityGate::default();
        let token = CancelToken::new();
        let id = machine.vertex(state).id().to_string();
        let activation = status.activation;
        let listeners = self.listeners.clone();
        let reentry = Arc::clone(&self.reentry);
        let finished = gate.clone();
        let cancel = token.clone();

        let task: Task = Box::new(move || {
            listeners.notify(|l| l.activity_before(&id));
            match activity.run(&cancel) {
                Ok(()) => listeners.notify(|l| l.activity_after(&id)),
                Err(error) => {
                    warn!(state = %id, %error, "activity failed");
                    listeners.notify(|l| l.activity_exception(&id, &error));
                }
            }
            if finished.finish() {
                reentry.deliver(Inbound::ActivityDone { state, activation });
            }
        });
        let task = self.scheduler.spawn(task);
        status.activity = Some(ActivityHandle { gate, token, task });
    }
}
