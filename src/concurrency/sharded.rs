//! Executors pinned to worker threads.
//!
//! Every executor lives on exactly one worker, chosen from its instance id.
//! All calls are jobs on that worker's queue, so one executor never sees
//! two steps at once while different executors run in parallel. Activity
//! completions jump to the front of the queue.

use crate::checkpoint::Snapshot;
use crate::core::Event;
use crate::executor::{ExecutionError, Executor, Inbound, Reentry, TakeOutcome};
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

type Job<C> = Box<dyn FnOnce(&mut Shard<C>) + Send>;

struct Shard<C> {
    executors: HashMap<Uuid, Executor<C>>,
}

struct WorkerQueue<C> {
    jobs: Mutex<QueueState<C>>,
    ready: Condvar,
}

struct QueueState<C> {
    jobs: VecDeque<Job<C>>,
    open: bool,
}

impl<C> WorkerQueue<C> {
    fn new() -> Self {
        Self {
            jobs: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                open: true,
            }),
            ready: Condvar::new(),
        }
    }

    /// Queue a job; dropped if the worker has stopped.
    fn push(&self, job: Job<C>, urgent: bool) {
        let mut state = self.jobs.lock();
        if !state.open {
            return;
        }
        if urgent {
            state.jobs.push_front(job);
        } else {
            state.jobs.push_back(job);
        }
        self.ready.notify_one();
    }

    fn close(&self) {
        self.jobs.lock().open = false;
        self.ready.notify_all();
    }

    /// Next job, or `None` once closed and drained.
    fn next(&self) -> Option<Job<C>> {
        let mut state = self.jobs.lock();
        loop {
            if let Some(job) = state.jobs.pop_front() {
                return Some(job);
            }
            if !state.open {
                return None;
            }
            self.ready.wait(&mut state);
        }
    }
}

struct ShardReentry<C> {
    queue: Weak<WorkerQueue<C>>,
    instance: Uuid,
}

impl<C: Send + 'static> Reentry for ShardReentry<C> {
    fn deliver(&self, inbound: Inbound) {
        let Some(queue) = self.queue.upgrade() else {
            return;
        };
        let instance = self.instance;
        queue.push(
            Box::new(move |shard: &mut Shard<C>| {
                if let Some(executor) = shard.executors.get_mut(&instance) {
                    if let Err(error) = executor.deliver(inbound) {
                        warn!(%instance, %error, "inbound work failed");
                    }
                }
            }),
            inbound.is_priority(),
        );
    }
}

/// Fixed pool of worker threads owning executors.
pub struct ShardedPool<C> {
    queues: Vec<Arc<WorkerQueue<C>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<C: Send + 'static> ShardedPool<C> {
    /// Spawn `size` workers (at least one).
    pub fn new(size: usize) -> std::io::Result<Self> {
        let size = size.max(1);
        let mut queues = Vec::with_capacity(size);
        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let queue = Arc::new(WorkerQueue::new());
            let worker_queue = Arc::clone(&queue);
            let handle = thread::Builder::new()
                .name(format!("orthogon-shard-{index}"))
                .spawn(move || run_worker(index, worker_queue))?;
            queues.push(queue);
            workers.push(handle);
        }
        Ok(Self {
            queues,
            workers: Mutex::new(workers),
        })
    }

    pub fn size(&self) -> usize {
        self.queues.len()
    }

    /// Worker index an instance id maps to.
    pub fn shard_of(&self, instance: Uuid) -> usize {
        (instance.as_u128() % self.queues.len() as u128) as usize
    }

    /// Move `executor` onto its worker.
    pub fn attach(&self, mut executor: Executor<C>) -> ShardedHandle<C> {
        let instance = executor.instance_id();
        let shard = self.shard_of(instance);
        let queue = Arc::clone(&self.queues[shard]);
        executor.set_reentry(Arc::new(ShardReentry {
            queue: Arc::downgrade(&queue),
            instance,
        }));
        queue.push(
            Box::new(move |state: &mut Shard<C>| {
                state.executors.insert(instance, executor);
            }),
            false,
        );
        debug!(%instance, shard, "executor attached");
        ShardedHandle {
            instance,
            shard,
            queue,
        }
    }

    /// Stop accepting work, finish queued jobs and join the workers.
    pub fn shutdown(&self) {
        for queue in &self.queues {
            queue.close();
        }
        for worker in self.workers.lock().drain(..) {
            if worker.join().is_err() {
                error!("shard worker panicked");
            }
        }
    }
}

impl<C> Drop for ShardedPool<C> {
    fn drop(&mut self) {
        for queue in &self.queues {
            queue.close();
        }
        for worker in self.workers.get_mut().drain(..) {
            let _ = worker.join();
        }
    }
}

fn run_worker<C>(index: usize, queue: Arc<WorkerQueue<C>>) {
    let mut shard = Shard {
        executors: HashMap::new(),
    };
    while let Some(job) = queue.next() {
        if catch_unwind(AssertUnwindSafe(|| job(&mut shard))).is_err() {
            error!(shard = index, "job panicked; worker continues");
        }
    }
    debug!(shard = index, executors = shard.executors.len(), "worker stopped");
}

/// Reply to a call on a sharded executor.
#[must_use = "a pending reply does nothing unless waited on"]
pub struct Pending<R> {
    reply: Receiver<Result<R, ExecutionError>>,
}

impl<R> Pending<R> {
    pub fn wait(self) -> Result<R, ExecutionError> {
        self.reply
            .recv()
            .unwrap_or(Err(ExecutionError::WorkerUnavailable))
    }

    /// `None` if no reply arrived within `timeout`.
    pub fn wait_timeout(self, timeout: Duration) -> Option<Result<R, ExecutionError>> {
        match self.reply.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(ExecutionError::WorkerUnavailable)),
        }
    }
}

/// Address of an executor living on a [`ShardedPool`] worker.
pub struct ShardedHandle<C> {
    instance: Uuid,
    shard: usize,
    queue: Arc<WorkerQueue<C>>,
}

impl<C> Clone for ShardedHandle<C> {
    fn clone(&self) -> Self {
        Self {
            instance: self.instance,
            shard: self.shard,
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<C: Send + 'static> ShardedHandle<C> {
    pub fn instance_id(&self) -> Uuid {
        self.instance
    }

    pub fn shard(&self) -> usize {
        self.shard
    }

    pub fn start(&self) -> Pending<()> {
        self.submit(|executor| executor.start())
    }

    pub fn take(&self, event: impl Into<Event>) -> Pending<TakeOutcome> {
        let event = event.into();
        self.submit(move |executor| executor.take(event))
    }

    pub fn snapshot(&self) -> Pending<Snapshot> {
        self.submit(|executor| Ok(executor.snapshot()))
    }

    pub fn resume(&self, snapshot: Snapshot) -> Pending<()> {
        self.submit(move |executor| executor.resume(&snapshot))
    }

    /// Run `f` on the worker with the executor.
    pub fn with<R, F>(&self, f: F) -> Pending<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Executor<C>) -> R + Send + 'static,
    {
        self.submit(move |executor| Ok(f(executor)))
    }

    /// Take the executor back off its worker.
    pub fn detach(&self) -> Pending<Executor<C>> {
        let (reply, pending) = channel::bounded(1);
        let instance = self.instance;
        self.queue.push(
            Box::new(move |shard: &mut Shard<C>| {
                let result = shard
                    .executors
                    .remove(&instance)
                    .ok_or(ExecutionError::WorkerUnavailable);
                let _ = reply.send(result);
            }),
            false,
        );
        Pending { reply: pending }
    }

    fn submit<R, F>(&self, f: F) -> Pending<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Executor<C>) -> Result<R, ExecutionError> + Send + 'static,
    {
        let (reply, pending) = channel::bounded(1);
        let instance = self.instance;
        self.queue.push(
            Box::new(move |shard: &mut Shard<C>| {
                let result = match shard.executors.get_mut(&instance) {
                    Some(executor) => f(executor),
                    None => Err(ExecutionError::WorkerUnavailable),
                };
                let _ = reply.send(result);
            }),
            false,
        );
        Pending { reply: pending }
    }
}
