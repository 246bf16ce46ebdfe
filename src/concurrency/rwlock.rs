use crate::checkpoint::Snapshot;
use crate::core::Event;
use crate::executor::{ExecutionError, Executor, Inbound, Reentry, TakeOutcome};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tracing::warn;

/// Executor behind a reader-writer lock.
///
/// Events and inbound work take the write lock; snapshots and queries
/// share the read lock and may run concurrently.
pub struct RwExecutor<C> {
    inner: Arc<RwLock<Executor<C>>>,
}

impl<C> Clone for RwExecutor<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct WriteReentry<C> {
    target: Weak<RwLock<Executor<C>>>,
}

impl<C: Send + Sync + 'static> Reentry for WriteReentry<C> {
    fn deliver(&self, inbound: Inbound) {
        let Some(target) = self.target.upgrade() else {
            return;
        };
        let mut executor = target.write();
        if let Err(error) = executor.deliver(inbound) {
            warn!(%error, ?inbound, "inbound work failed");
        }
    }
}

impl<C: Send + Sync + 'static> RwExecutor<C> {
    pub fn new(executor: Executor<C>) -> Self {
        let inner = Arc::new(RwLock::new(executor));
        let reentry = Arc::new(WriteReentry {
            target: Arc::downgrade(&inner),
        });
        inner.write().set_reentry(reentry);
        Self { inner }
    }

    pub fn start(&self) -> Result<(), ExecutionError> {
        self.inner.write().start()
    }

    pub fn take(&self, event: impl Into<Event>) -> Result<TakeOutcome, ExecutionError> {
        self.inner.write().take(event)
    }

    pub fn resume(&self, snapshot: &Snapshot) -> Result<(), ExecutionError> {
        self.inner.write().resume(snapshot)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.read().snapshot()
    }

    pub fn active_states(&self) -> Vec<String> {
        self.inner.read().active_states()
    }

    pub fn is_active(&self, state: &str) -> bool {
        self.inner.read().is_active(state)
    }

    /// Run `f` under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&Executor<C>) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run `f` under the write lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut Executor<C>) -> R) -> R {
        f(&mut self.inner.write())
    }
}
