//! Asynchronous work coming back into an executor.

use crate::core::{TransitionId, VertexId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Results of scheduled work, addressed to one activation of a state.
///
/// `activation` identifies which entry of `state` armed the work; anything
/// addressed to an earlier activation is dropped on delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Inbound {
    Timeout {
        state: VertexId,
        activation: u64,
        transition: TransitionId,
    },
    ActivityDone {
        state: VertexId,
        activation: u64,
    },
}

impl Inbound {
    /// Activity completions jump ahead of queued events.
    pub fn is_priority(&self) -> bool {
        matches!(self, Inbound::ActivityDone { .. })
    }
}

/// Where timer callbacks and finished activities hand their result.
///
/// Each concurrency wrapper installs the sink matching its discipline.
pub trait Reentry: Send + Sync {
    fn deliver(&self, inbound: Inbound);
}

/// Default sink: queue inbound work until the owner calls
/// [`Executor::pump`](super::Executor::pump).
#[derive(Clone, Default)]
pub struct Mailbox {
    queue: Arc<Mutex<VecDeque<Inbound>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub(crate) fn drain(&self) -> Vec<Inbound> {
        self.queue.lock().drain(..).collect()
    }

    pub(crate) fn clear(&self) {
        self.queue.lock().clear();
    }
}

impl Reentry for Mailbox {
    fn deliver(&self, inbound: Inbound) {
        let mut queue = self.queue.lock();
        if inbound.is_priority() {
            queue.push_front(inbound);
        } else {
            queue.push_back(inbound);
        }
    }
}
