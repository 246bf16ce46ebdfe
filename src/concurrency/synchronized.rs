use crate::checkpoint::Snapshot;
use crate::core::Event;
use crate::executor::{ExecutionError, Executor, Inbound, Reentry, TakeOutcome};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::warn;

/// Executor shared behind a mutex. Clones drive the same instance.
///
/// Timer and activity callbacks take the same lock, so they serialize with
/// callers. Schedulers must run callbacks off the calling stack, otherwise
/// a callback fired while the lock is held would deadlock.
pub struct SynchronizedExecutor<C> {
    inner: Arc<Mutex<Executor<C>>>,
}

impl<C> Clone for SynchronizedExecutor<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct LockedReentry<C> {
    target: Weak<Mutex<Executor<C>>>,
}

impl<C: Send + 'static> Reentry for LockedReentry<C> {
    fn deliver(&self, inbound: Inbound) {
        let Some(target) = self.target.upgrade() else {
            return;
        };
        let mut executor = target.lock();
        if let Err(error) = executor.deliver(inbound) {
            warn!(%error, ?inbound, "inbound work failed");
        }
    }
}

impl<C: Send + 'static> SynchronizedExecutor<C> {
    pub fn new(executor: Executor<C>) -> Self {
        let inner = Arc::new(Mutex::new(executor));
        let reentry = Arc::new(LockedReentry {
            target: Arc::downgrade(&inner),
        });
        inner.lock().set_reentry(reentry);
        Self { inner }
    }

    pub fn start(&self) -> Result<(), ExecutionError> {
        self.inner.lock().start()
    }

    pub fn take(&self, event: impl Into<Event>) -> Result<TakeOutcome, ExecutionError> {
        self.inner.lock().take(event)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock().snapshot()
    }

    pub fn resume(&self, snapshot: &Snapshot) -> Result<(), ExecutionError> {
        self.inner.lock().resume(snapshot)
    }

    pub fn is_active(&self, state: &str) -> bool {
        self.inner.lock().is_active(state)
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.lock().is_terminated()
    }

    /// Run `f` with the executor locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut Executor<C>) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
