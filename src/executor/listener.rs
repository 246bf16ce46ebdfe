//! Observation hooks.
//!
//! Listeners are called synchronously and best-effort. A panicking listener
//! is logged and skipped; it never interrupts the step being observed.

use crate::core::{Event, StateMachine, TransitionId, TransitionKind};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Borrowed description of a transition handed to listeners.
#[derive(Clone, Copy, Debug)]
pub struct TransitionInfo<'a> {
    pub id: TransitionId,
    pub source: &'a str,
    pub target: &'a str,
    pub kind: TransitionKind,
}

impl<'a> TransitionInfo<'a> {
    pub(crate) fn describe<C>(machine: &'a StateMachine<C>, id: TransitionId) -> Self {
        let transition = machine.transition(id);
        Self {
            id,
            source: machine.vertex(transition.source()).id(),
            target: machine.vertex(transition.target()).id(),
            kind: transition.kind(),
        }
    }
}

/// Lifecycle hooks. Every method defaults to doing nothing.
#[allow(unused_variables)]
pub trait Listener: Send + Sync {
    fn event_accepted(&self, event: &Event) {}
    fn event_denied(&self, event: &Event) {}
    fn event_deferred(&self, event: &Event) {}

    fn machine_started(&self, machine: &str) {}
    fn machine_terminated(&self, machine: &str) {}

    fn transition_started(&self, transition: &TransitionInfo<'_>) {}
    fn transition_ended(&self, transition: &TransitionInfo<'_>) {}

    fn guard_before(&self, transition: &TransitionInfo<'_>) {}
    fn guard_after(&self, transition: &TransitionInfo<'_>, passed: bool) {}
    fn guard_exception(&self, transition: &TransitionInfo<'_>, error: &anyhow::Error) {}

    fn effect_before(&self, transition: &TransitionInfo<'_>) {}
    fn effect_after(&self, transition: &TransitionInfo<'_>) {}
    fn effect_exception(&self, transition: &TransitionInfo<'_>, error: &anyhow::Error) {}

    fn state_enter_before(&self, state: &str) {}
    fn state_enter_after(&self, state: &str) {}
    fn state_enter_exception(&self, state: &str, error: &anyhow::Error) {}

    fn state_exit_before(&self, state: &str) {}
    fn state_exit_after(&self, state: &str) {}
    fn state_exit_exception(&self, state: &str, error: &anyhow::Error) {}

    fn activity_before(&self, state: &str) {}
    fn activity_after(&self, state: &str) {}
    fn activity_exception(&self, state: &str, error: &anyhow::Error) {}
}

/// Registered listeners, shared with activity tasks.
#[derive(Clone, Default)]
pub struct ListenerSet {
    listeners: Vec<Arc<dyn Listener>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Arc<dyn Listener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub(crate) fn notify(&self, hook: impl Fn(&dyn Listener)) {
        for listener in &self.listeners {
            if catch_unwind(AssertUnwindSafe(|| hook(listener.as_ref()))).is_err() {
                warn!("listener panicked; notification skipped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        denied: AtomicUsize,
    }

    impl Listener for Counter {
        fn event_denied(&self, _event: &Event) {
            self.denied.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicky;

    impl Listener for Panicky {
        fn event_denied(&self, _event: &Event) {
            panic!("listener bug");
        }
    }

    #[test]
    fn panicking_listener_does_not_stop_others() {
        let counter = Arc::new(Counter::default());
        let mut set = ListenerSet::new();
        set.add(Arc::new(Panicky));
        set.add(counter.clone());

        set.notify(|l| l.event_denied(&Event::named("x")));

        assert_eq!(counter.denied.load(Ordering::SeqCst), 1);
        assert_eq!(set.len(), 2);
    }
}
