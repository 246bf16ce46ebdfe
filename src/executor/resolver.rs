//! Enabled-path search.
//!
//! Starting from one vertex, finds the first enabled transition and follows
//! it through required pseudostates (initial, junction, connection points,
//! fork branches, joins and default history entries) until it reaches a
//! state or a pseudostate decided at firing time. Guards along the path are
//! evaluated here, once, against the context as it is before anything fires.

use super::config::HistoryFailover;
use super::error::ExecutionError;
use super::history::HistoryStore;
use super::join::JoinRegistry;
use super::listener::{ListenerSet, TransitionInfo};
use crate::core::{Event, PseudoKind, StateMachine, TransitionId, VertexId, VertexKind};
use std::collections::HashSet;
use tracing::{debug, warn};

/// A transition plus whatever must fire after it in the same step.
///
/// `next` holds one entry for pass-through pseudostates, one per branch
/// for forks, and is empty when the path ends at the transition target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Path {
    pub transition: TransitionId,
    pub next: Vec<Path>,
}

impl Path {
    fn leaf(transition: TransitionId) -> Self {
        Self {
            transition,
            next: Vec::new(),
        }
    }

    fn then(transition: TransitionId, next: Path) -> Self {
        Self {
            transition,
            next: vec![next],
        }
    }
}

pub(crate) struct Resolver<'a, C> {
    pub machine: &'a StateMachine<C>,
    pub context: &'a C,
    pub history: &'a HistoryStore,
    pub joins: &'a mut JoinRegistry,
    pub disabled: &'a mut HashSet<TransitionId>,
    pub listeners: &'a ListenerSet,
    pub failover: HistoryFailover,
}

impl<'a, C> Resolver<'a, C> {
    /// First enabled path leaving `vertex` for `event`, in declaration order.
    pub fn resolve(
        &mut self,
        event: &Event,
        vertex: VertexId,
    ) -> Result<Option<Path>, ExecutionError> {
        let machine = self.machine;
        let source = machine.vertex(vertex);
        let candidates = if !source.is_stateful() {
            source.outgoing()
        } else if event.is_completion() {
            source.completions()
        } else {
            source.triggered_by(&event.key())
        };

        for &transition in candidates {
            if self.disabled.contains(&transition) || !self.guard(transition, event) {
                continue;
            }
            if let Some(path) = self.follow(event, transition)? {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Like [`resolve`](Self::resolve), for pseudostates that must let
    /// something through.
    fn required(&mut self, event: &Event, vertex: VertexId) -> Result<Path, ExecutionError> {
        self.resolve(event, vertex)?
            .ok_or_else(|| dead_end(self.machine, vertex))
    }

    fn follow(
        &mut self,
        event: &Event,
        transition: TransitionId,
    ) -> Result<Option<Path>, ExecutionError> {
        let machine = self.machine;
        let target = machine.transition(transition).target();
        let vertex = machine.vertex(target);
        let kind = match vertex.kind() {
            VertexKind::Pseudo(kind) => *kind,
            _ => return Ok(Some(Path::leaf(transition))),
        };

        match kind {
            PseudoKind::Choice | PseudoKind::Terminate => Ok(Some(Path::leaf(transition))),
            PseudoKind::ShallowHistory | PseudoKind::DeepHistory => {
                if vertex.region().is_some_and(|region| self.history.contains(region)) {
                    return Ok(Some(Path::leaf(transition)));
                }
                if let Some(default) = self.resolve(event, target)? {
                    return Ok(Some(Path::then(transition, default)));
                }
                match self.failover {
                    HistoryFailover::Fail => Err(ExecutionError::UnreachableHistory {
                        vertex: vertex.id().to_string(),
                    }),
                    HistoryFailover::Disable => {
                        warn!(
                            history = vertex.id(),
                            ?transition,
                            "history has nothing to restore; disabling transition"
                        );
                        self.disabled.insert(transition);
                        Ok(None)
                    }
                }
            }
            PseudoKind::Join => {
                if !self.joins.arrive(target, transition, vertex.incoming()) {
                    debug!(join = vertex.id(), ?transition, "waiting for remaining join branches");
                    return Ok(None);
                }
                let next = self.required(event, target)?;
                Ok(Some(Path::then(transition, next)))
            }
            PseudoKind::Fork => {
                let mut branches = Vec::with_capacity(vertex.outgoing().len());
                for &branch in vertex.outgoing() {
                    match self.follow(event, branch)? {
                        Some(path) => branches.push(path),
                        None => return Err(dead_end(machine, target)),
                    }
                }
                if branches.is_empty() {
                    return Err(dead_end(machine, target));
                }
                Ok(Some(Path {
                    transition,
                    next: branches,
                }))
            }
            PseudoKind::Initial
            | PseudoKind::Junction
            | PseudoKind::EntryPoint
            | PseudoKind::ExitPoint => {
                let next = self.required(event, target)?;
                Ok(Some(Path::then(transition, next)))
            }
        }
    }

    fn guard(&self, transition: TransitionId, event: &Event) -> bool {
        let Some(guard) = self.machine.transition(transition).guard() else {
            return true;
        };
        let info = TransitionInfo::describe(self.machine, transition);
        self.listeners.notify(|l| l.guard_before(&info));
        match guard.check(self.context, event) {
            Ok(passed) => {
                self.listeners.notify(|l| l.guard_after(&info, passed));
                passed
            }
            Err(error) => {
                warn!(source = info.source, target = info.target, %error, "guard failed; treating as false");
                self.listeners.notify(|l| l.guard_exception(&info, &error));
                false
            }
        }
    }
}

pub(crate) fn dead_end<C>(machine: &StateMachine<C>, vertex: VertexId) -> ExecutionError {
    ExecutionError::DeadEnd {
        vertex: machine.vertex(vertex).id().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StateMachineBuilder;

    struct Fixture {
        machine: StateMachine<i32>,
        history: HistoryStore,
        joins: JoinRegistry,
        disabled: HashSet<TransitionId>,
        listeners: ListenerSet,
    }

    impl Fixture {
        fn new(machine: StateMachine<i32>) -> Self {
            Self {
                machine,
                history: HistoryStore::default(),
                joins: JoinRegistry::default(),
                disabled: HashSet::new(),
                listeners: ListenerSet::new(),
            }
        }

        fn resolve(
            &mut self,
            context: &i32,
            event: &str,
            from: &str,
            failover: HistoryFailover,
        ) -> Result<Option<Path>, ExecutionError> {
            let vertex = self.machine.find_vertex(from).unwrap();
            Resolver {
                machine: &self.machine,
                context,
                history: &self.history,
                joins: &mut self.joins,
                disabled: &mut self.disabled,
                listeners: &self.listeners,
                failover,
            }
            .resolve(&Event::named(event), vertex)
        }

        fn target(&self, path: &Path) -> &str {
            let transition = self.machine.transition(path.transition);
            self.machine.vertex(transition.target()).id()
        }
    }

    fn junction_machine() -> StateMachine<i32> {
        StateMachineBuilder::new("junction")
            .region("main", |r| {
                r.initial("init")
                    .simple("a")
                    .junction("j")
                    .simple("small")
                    .simple("large")
            })
            .transition("init", "a", |t| t)
            .transition("a", "j", |t| t.on("go"))
            .transition("j", "small", |t| t.guard(|n: &i32, _| *n < 10))
            .transition("j", "large", |t| t.guard(|n: &i32, _| *n >= 10))
            .build()
            .unwrap()
    }

    #[test]
    fn junction_paths_resolve_guards_up_front() {
        let mut fixture = Fixture::new(junction_machine());

        let path = fixture
            .resolve(&3, "go", "a", HistoryFailover::Fail)
            .unwrap()
            .unwrap();
        assert_eq!(fixture.target(&path), "j");
        assert_eq!(fixture.target(&path.next[0]), "small");

        let path = fixture
            .resolve(&30, "go", "a", HistoryFailover::Fail)
            .unwrap()
            .unwrap();
        assert_eq!(fixture.target(&path.next[0]), "large");
    }

    #[test]
    fn unmatched_event_resolves_nothing() {
        let mut fixture = Fixture::new(junction_machine());
        let path = fixture.resolve(&0, "other", "a", HistoryFailover::Fail).unwrap();
        assert!(path.is_none());
    }

    #[test]
    fn failing_guard_counts_as_false() {
        let machine = StateMachineBuilder::new("faulty")
            .region("main", |r| r.initial("init").simple("a").simple("b"))
            .transition("init", "a", |t| t)
            .transition("a", "b", |t| {
                t.on("go")
                    .try_guard(|_: &i32, _| Err(anyhow::anyhow!("boom")))
            })
            .build()
            .unwrap();
        let mut fixture = Fixture::new(machine);
        assert!(fixture
            .resolve(&0, "go", "a", HistoryFailover::Fail)
            .unwrap()
            .is_none());
    }

    fn history_machine() -> StateMachine<i32> {
        StateMachineBuilder::new("history")
            .region("main", |r| {
                r.initial("init").simple("idle").state("s", |s| {
                    s.region("inner", |r| r.initial("si").simple("x").shallow_history("h"))
                })
            })
            .transition("init", "idle", |t| t)
            .transition("si", "x", |t| t)
            .transition("idle", "h", |t| t.on("back"))
            .build()
            .unwrap()
    }

    #[test]
    fn history_without_default_follows_failover() {
        let mut fixture = Fixture::new(history_machine());

        let error = fixture
            .resolve(&0, "back", "idle", HistoryFailover::Fail)
            .unwrap_err();
        assert!(matches!(error, ExecutionError::UnreachableHistory { .. }));

        let path = fixture
            .resolve(&0, "back", "idle", HistoryFailover::Disable)
            .unwrap();
        assert!(path.is_none());
        assert_eq!(fixture.disabled.len(), 1);
    }

    #[test]
    fn saved_history_ends_the_path() {
        let mut fixture = Fixture::new(history_machine());
        let inner = fixture.machine.find_region("inner").unwrap();
        let x = fixture.machine.find_vertex("x").unwrap();
        fixture
            .history
            .record(inner, super::super::active::ActiveNode::leaf(x));

        let path = fixture
            .resolve(&0, "back", "idle", HistoryFailover::Fail)
            .unwrap()
            .unwrap();
        assert_eq!(fixture.target(&path), "h");
        assert!(path.next.is_empty());
    }
}
