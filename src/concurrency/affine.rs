use crate::checkpoint::Snapshot;
use crate::core::Event;
use crate::executor::{ExecutionError, Executor, TakeOutcome};
use std::sync::OnceLock;
use std::thread::{self, ThreadId};
use tracing::error;

/// Executor bound to the first thread that drives it.
///
/// Calls from any other thread fail with
/// [`ExecutionError::WrongThread`]. Inbound timer and activity work is
/// drained on the owning thread before every event.
#[derive(Debug)]
pub struct AffineExecutor<C> {
    inner: Executor<C>,
    owner: OnceLock<ThreadId>,
}

impl<C: 'static> AffineExecutor<C> {
    pub fn new(executor: Executor<C>) -> Self {
        Self {
            inner: executor,
            owner: OnceLock::new(),
        }
    }

    /// Bind to the calling thread right away instead of on first use.
    pub fn bind(executor: Executor<C>) -> Self {
        let affine = Self::new(executor);
        let _ = affine.owner.set(thread::current().id());
        affine
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.owner.get().copied()
    }

    fn check_thread(&self) -> Result<(), ExecutionError> {
        let caller = thread::current().id();
        let owner = *self.owner.get_or_init(|| caller);
        if owner != caller {
            error!(?owner, ?caller, "executor used from a foreign thread");
            return Err(ExecutionError::WrongThread { owner, caller });
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), ExecutionError> {
        self.check_thread()?;
        self.inner.start()
    }

    pub fn take(&mut self, event: impl Into<Event>) -> Result<TakeOutcome, ExecutionError> {
        self.check_thread()?;
        self.inner.pump()?;
        self.inner.take(event)
    }

    /// Process queued timer expiries and activity completions.
    pub fn pump(&mut self) -> Result<usize, ExecutionError> {
        self.check_thread()?;
        self.inner.pump()
    }

    pub fn snapshot(&self) -> Result<Snapshot, ExecutionError> {
        self.check_thread()?;
        Ok(self.inner.snapshot())
    }

    pub fn resume(&mut self, snapshot: &Snapshot) -> Result<(), ExecutionError> {
        self.check_thread()?;
        self.inner.resume(snapshot)
    }

    pub fn executor(&self) -> Result<&Executor<C>, ExecutionError> {
        self.check_thread()?;
        Ok(&self.inner)
    }

    pub fn executor_mut(&mut self) -> Result<&mut Executor<C>, ExecutionError> {
        self.check_thread()?;
        Ok(&mut self.inner)
    }
}
