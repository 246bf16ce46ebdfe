//! Per-activation bookkeeping of active states.

use super::scheduler::TaskHandle;
use crate::core::CancelToken;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const RUNNING: u8 = 0;
const DONE: u8 = 1;
const CANCELLED: u8 = 2;

/// Settles the race between an activity finishing and its state exiting.
/// Exactly one of [`finish`](Self::finish) and [`cancel`](Self::cancel)
/// returns true.
#[derive(Clone, Debug, Default)]
pub(crate) struct ActivityGate {
    state: Arc<AtomicU8>,
}

impl ActivityGate {
    pub fn finish(&self) -> bool {
        self.transition_to(DONE)
    }

    pub fn cancel(&self) -> bool {
        self.transition_to(CANCELLED)
    }

    fn transition_to(&self, next: u8) -> bool {
        self.state
            .compare_exchange(RUNNING, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Debug)]
pub(crate) struct ActivityHandle {
    pub gate: ActivityGate,
    pub token: CancelToken,
    pub task: TaskHandle,
}

impl ActivityHandle {
    fn cancel(&self) {
        if self.gate.cancel() {
            self.token.cancel();
            self.task.cancel();
        }
    }
}

#[derive(Debug)]
pub(crate) struct StateStatus {
    /// Serial of the activation; stale inbound work carries an older one.
    pub activation: u64,
    pub activated_at: DateTime<Utc>,
    pub activity: Option<ActivityHandle>,
    /// Set once the activity's completion has been processed.
    pub activity_finished: bool,
    pub timers: Vec<TaskHandle>,
}

impl StateStatus {
    pub fn new(activation: u64, activated_at: DateTime<Utc>) -> Self {
        Self {
            activation,
            activated_at,
            activity: None,
            activity_finished: false,
            timers: Vec::new(),
        }
    }

    pub fn cancel(&mut self) {
        if let Some(activity) = self.activity.take() {
            activity.cancel();
        }
        for timer in self.timers.drain(..) {
            timer.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_admits_one_outcome() {
        let gate = ActivityGate::default();
        assert!(gate.finish());
        assert!(!gate.cancel());
        assert!(!gate.finish());
    }

    #[test]
    fn cancel_before_finish_suppresses_completion() {
        let gate = ActivityGate::default();
        let handle = ActivityHandle {
            gate: gate.clone(),
            token: CancelToken::new(),
            task: TaskHandle::default(),
        };
        let mut status = StateStatus::new(1, Utc::now());
        status.activity = Some(handle);
        status.cancel();

        assert!(!gate.finish());
        assert!(status.activity.is_none());
    }
}
