//! Run-to-completion execution of a built machine.
//!
//! An [`Executor`] owns the mutable side of one machine instance: the
//! active-state configuration, saved history, deferred events, timers and
//! running activities. The [`StateMachine`] itself is shared and never
//! mutated, so many executors can run the same machine.
//!
//! Every call to [`Executor::take`] is one run-to-completion step: a
//! single event is fully processed, including the completion transitions
//! it unlocks, before the call returns.
//!
//! # Example
//!
//! ```rust
//! use orthogon::builder::StateMachineBuilder;
//! use orthogon::executor::{Executor, TakeOutcome};
//! use std::sync::Arc;
//!
//! let machine = StateMachineBuilder::<Vec<String>>::new("door")
//!     .region("main", |r| r.initial("init").simple("closed").simple("open"))
//!     .transition("init", "closed", |t| t)
//!     .transition("closed", "open", |t| {
//!         t.on("open").effect(|log: &mut Vec<String>, _| log.push("opening".into()))
//!     })
//!     .build()
//!     .unwrap();
//!
//! let mut executor = Executor::new(Arc::new(machine), Vec::new());
//! assert_eq!(executor.take("open").unwrap(), TakeOutcome::Accepted);
//! assert!(executor.is_active("open"));
//! assert_eq!(executor.take("open").unwrap(), TakeOutcome::Denied);
//! assert_eq!(executor.context(), &vec!["opening".to_string()]);
//! ```

mod active;
pub mod config;
pub mod error;
mod history;
mod join;
pub mod listener;
pub mod reentry;
mod resolver;
mod rtc;
pub mod scheduler;
mod snapshot;
mod status;

pub use active::ActiveNode;
pub use config::{ExecutorConfig, HistoryFailover};
pub use error::ExecutionError;
pub use listener::{Listener, ListenerSet, TransitionInfo};
pub use reentry::{Inbound, Mailbox, Reentry};
pub use scheduler::{ManualScheduler, Scheduler, Task, TaskHandle, TokioScheduler};

use crate::core::{ActiveStrategy, Event, RegionId, StateMachine, TransitionId, VertexId};
use active::ActiveStates;
use history::HistoryStore;
use join::JoinRegistry;
use serde::{Deserialize, Serialize};
use status::StateStatus;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Cheap digest of the context, used to notice completion transitions that
/// keep re-firing without changing anything.
pub type Fingerprint<C> = Arc<dyn Fn(&C) -> u64 + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    NotStarted,
    Started,
    Terminated,
}

/// What happened to an event handed to [`Executor::take`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TakeOutcome {
    /// At least one transition fired.
    Accepted,
    /// Nothing fired and no active state defers the event.
    Denied,
    /// Nothing fired; the event waits until no active state defers it.
    Deferred,
}

impl TakeOutcome {
    pub fn is_accepted(self) -> bool {
        self == TakeOutcome::Accepted
    }
}

/// Executes one instance of a [`StateMachine`].
pub struct Executor<C> {
    machine: Arc<StateMachine<C>>,
    instance: Uuid,
    context: C,
    config: ExecutorConfig,
    phase: Phase,
    poisoned: bool,
    active: Box<dyn ActiveStates>,
    history: HistoryStore,
    joins: JoinRegistry,
    disabled: HashSet<TransitionId>,
    status: HashMap<VertexId, StateStatus>,
    deferred: VecDeque<Event>,
    listeners: ListenerSet,
    scheduler: Arc<dyn Scheduler>,
    reentry: Arc<dyn Reentry>,
    mailbox: Mailbox,
    fingerprint: Option<Fingerprint<C>>,
    serial: u64,
}

/// Assembles an [`Executor`] with non-default collaborators.
pub struct ExecutorBuilder<C> {
    machine: Arc<StateMachine<C>>,
    config: ExecutorConfig,
    listeners: ListenerSet,
    scheduler: Option<Arc<dyn Scheduler>>,
    fingerprint: Option<Fingerprint<C>>,
}

impl<C: 'static> ExecutorBuilder<C> {
    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.listeners.add(listener);
        self
    }

    /// Scheduler for timers and activities. Defaults to a private
    /// [`ManualScheduler`], which never fires on its own.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn fingerprint<F>(mut self, digest: F) -> Self
    where
        F: Fn(&C) -> u64 + Send + Sync + 'static,
    {
        self.fingerprint = Some(Arc::new(digest));
        self
    }

    pub fn build(self, context: C) -> Executor<C> {
        let strategy = self
            .config
            .strategy
            .unwrap_or_else(|| self.machine.meta().active_strategy());
        let mailbox = Mailbox::new();
        Executor {
            instance: Uuid::new_v4(),
            context,
            phase: Phase::NotStarted,
            poisoned: false,
            active: active::for_strategy(strategy),
            history: HistoryStore::default(),
            joins: JoinRegistry::default(),
            disabled: HashSet::new(),
            status: HashMap::new(),
            deferred: VecDeque::new(),
            listeners: self.listeners,
            scheduler: self
                .scheduler
                .unwrap_or_else(|| Arc::new(ManualScheduler::new())),
            reentry: Arc::new(mailbox.clone()),
            mailbox,
            fingerprint: self.fingerprint,
            serial: 0,
            machine: self.machine,
            config: self.config,
        }
    }
}

impl<C: 'static> Executor<C> {
    pub fn builder(machine: Arc<StateMachine<C>>) -> ExecutorBuilder<C> {
        ExecutorBuilder {
            machine,
            config: ExecutorConfig::default(),
            listeners: ListenerSet::new(),
            scheduler: None,
            fingerprint: None,
        }
    }

    pub fn new(machine: Arc<StateMachine<C>>, context: C) -> Self {
        Self::builder(machine).build(context)
    }

    /// Enter the top regions by default. Calling it again is a no-op.
    pub fn start(&mut self) -> Result<(), ExecutionError> {
        self.ensure_usable()?;
        if self.phase != Phase::NotStarted {
            return Ok(());
        }
        self.guarded(|this| this.start_machine())
    }

    /// Process one event to completion.
    ///
    /// Inbound work already queued in the mailbox is not processed here;
    /// call [`pump`](Self::pump) for that.
    pub fn take(&mut self, event: impl Into<Event>) -> Result<TakeOutcome, ExecutionError> {
        let event = event.into();
        self.ensure_usable()?;
        if self.phase == Phase::NotStarted && self.config.auto_start {
            self.start()?;
        }
        if self.phase != Phase::Started {
            return Ok(self.deny(&event));
        }
        self.guarded(|this| this.dispatch(&event))
    }

    /// Process an event only against `state` and its ancestors, and only
    /// while `state` is active.
    pub fn take_in(
        &mut self,
        event: impl Into<Event>,
        state: &str,
    ) -> Result<TakeOutcome, ExecutionError> {
        let event = event.into();
        self.ensure_usable()?;
        let state = self
            .machine
            .find_vertex(state)
            .ok_or_else(|| ExecutionError::UnknownState(state.to_string()))?;
        if self.phase != Phase::Started || !self.active.is_active(state) {
            return Ok(self.deny(&event));
        }
        self.guarded(|this| this.dispatch_in(&event, state))
    }

    /// Handle a timer expiry or finished activity. Work addressed to a
    /// state activation that has since ended is dropped.
    pub fn deliver(&mut self, inbound: Inbound) -> Result<(), ExecutionError> {
        self.ensure_usable()?;
        self.guarded(|this| this.handle_inbound(inbound))
    }

    /// Deliver everything queued in the mailbox; returns how many items
    /// were processed.
    pub fn pump(&mut self) -> Result<usize, ExecutionError> {
        let batch = self.mailbox.drain();
        let count = batch.len();
        for inbound in batch {
            self.deliver(inbound)?;
        }
        Ok(count)
    }

    pub fn machine(&self) -> &Arc<StateMachine<C>> {
        &self.machine
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn strategy(&self) -> ActiveStrategy {
        self.active.strategy()
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_started(&self) -> bool {
        self.phase != Phase::NotStarted
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == Phase::Terminated
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn is_active(&self, state: &str) -> bool {
        self.machine
            .find_vertex(state)
            .is_some_and(|vertex| self.active.is_active(vertex))
    }

    /// Active state ids, parents before children.
    pub fn active_states(&self) -> Vec<String> {
        self.labels(self.active.all())
    }

    /// Innermost active state ids.
    pub fn active_leaves(&self) -> Vec<String> {
        self.labels(self.active.leaves())
    }

    /// Active configuration as trees rooted at the top regions' states.
    pub fn active_tree(&self) -> Vec<ActiveNode> {
        self.active
            .children(None)
            .into_iter()
            .filter_map(|root| self.active.subtree(root).ok())
            .collect()
    }

    /// State ids saved for `region`, parents before children.
    pub fn saved_history(&self, region: &str) -> Option<Vec<String>> {
        let region = self.machine.find_region(region)?;
        self.history
            .get(region)
            .map(|node| self.labels(node.states()))
    }

    pub fn deferred_events(&self) -> impl Iterator<Item = &Event> {
        self.deferred.iter()
    }

    /// Inbound work waiting for [`pump`](Self::pump).
    pub fn pending_inbound(&self) -> usize {
        self.mailbox.len()
    }

    pub(crate) fn set_reentry(&mut self, reentry: Arc<dyn Reentry>) {
        self.reentry = reentry;
    }

    fn labels(&self, states: Vec<VertexId>) -> Vec<String> {
        states
            .into_iter()
            .map(|state| self.machine.vertex(state).id().to_string())
            .collect()
    }

    fn ensure_usable(&self) -> Result<(), ExecutionError> {
        if self.poisoned {
            return Err(ExecutionError::Poisoned);
        }
        Ok(())
    }

    /// Run `step`, poisoning the executor if it fails midway.
    fn guarded<T>(
        &mut self,
        step: impl FnOnce(&mut Self) -> Result<T, ExecutionError>,
    ) -> Result<T, ExecutionError> {
        let result = step(self);
        if let Err(error) = &result {
            tracing::error!(
                machine = self.machine.id(),
                instance = %self.instance,
                %error,
                "step aborted; executor is no longer usable"
            );
            self.poisoned = true;
        }
        result
    }

    fn deny(&self, event: &Event) -> TakeOutcome {
        tracing::debug!(machine = self.machine.id(), ?event, "event denied");
        self.listeners.notify(|l| l.event_denied(event));
        TakeOutcome::Denied
    }

    fn region_label(&self, region: RegionId) -> String {
        self.machine.region(region).id().to_string()
    }
}

impl<C> Drop for Executor<C> {
    fn drop(&mut self) {
        for status in self.status.values_mut() {
            status.cancel();
        }
    }
}

impl<C> fmt::Debug for Executor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("machine", &self.machine.id())
            .field("instance", &self.instance)
            .field("phase", &self.phase)
            .field("poisoned", &self.poisoned)
            .field("deferred", &self.deferred.len())
            .finish_non_exhaustive()
    }
}
