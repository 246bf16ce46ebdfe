//! Timer and background-task services.
//!
//! The executor never runs scheduled work inline: a callback that fires
//! re-enters the executor through its [`Reentry`](super::Reentry) sink,
//! which is why a scheduler must always run tasks on another call stack.

use crate::core::CancelToken;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to scheduled work. Cancelling an already-run task is a no-op.
#[derive(Clone, Debug, Default)]
pub struct TaskHandle {
    token: CancelToken,
    abort: Option<tokio::task::AbortHandle>,
}

impl TaskHandle {
    pub fn new(token: CancelToken) -> Self {
        Self { token, abort: None }
    }

    fn with_abort(token: CancelToken, abort: tokio::task::AbortHandle) -> Self {
        Self {
            token,
            abort: Some(abort),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub trait Scheduler: Send + Sync {
    /// Run `task` once `delay` has elapsed, unless cancelled first.
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle;

    /// Run `task` on a background worker as soon as possible.
    fn spawn(&self, task: Task) -> TaskHandle;
}

/// Scheduler backed by a tokio runtime.
///
/// Timers sleep on the runtime; both timer callbacks and activities run on
/// its blocking pool since they may take executor locks.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime of the calling context. Panics outside a runtime.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let token = CancelToken::new();
        let armed = token.clone();
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if !armed.is_cancelled() {
                let _ = tokio::task::spawn_blocking(task).await;
            }
        });
        TaskHandle::with_abort(token, join.abort_handle())
    }

    fn spawn(&self, task: Task) -> TaskHandle {
        let token = CancelToken::new();
        let armed = token.clone();
        self.handle.spawn_blocking(move || {
            if !armed.is_cancelled() {
                task();
            }
        });
        TaskHandle::new(token)
    }
}

struct Timer {
    due: Duration,
    seq: u64,
    token: CancelToken,
    task: Task,
}

#[derive(Default)]
struct ManualQueue {
    now: Duration,
    seq: u64,
    timers: Vec<Timer>,
    ready: VecDeque<(CancelToken, Task)>,
}

/// Deterministic scheduler driven by the caller.
///
/// Virtual time only moves in [`advance`](Self::advance); spawned tasks only
/// run in [`run_pending`](Self::run_pending). Tasks always run with the
/// internal lock released so they may schedule more work.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<ManualQueue>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.queue.lock().now
    }

    /// Timers neither fired nor cancelled.
    pub fn pending_timers(&self) -> usize {
        self.queue
            .lock()
            .timers
            .iter()
            .filter(|timer| !timer.token.is_cancelled())
            .count()
    }

    /// Spawned tasks not yet run nor cancelled.
    pub fn pending_tasks(&self) -> usize {
        self.queue
            .lock()
            .ready
            .iter()
            .filter(|(token, _)| !token.is_cancelled())
            .count()
    }

    /// Move virtual time forward, firing due timers in deadline order.
    /// Returns how many timers ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut fired = 0;
        loop {
            let next = {
                let mut queue = self.queue.lock();
                let due = queue
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.due <= target)
                    .min_by_key(|(_, timer)| (timer.due, timer.seq))
                    .map(|(index, _)| index);
                match due {
                    Some(index) => {
                        let timer = queue.timers.swap_remove(index);
                        queue.now = queue.now.max(timer.due);
                        Some(timer)
                    }
                    None => {
                        queue.now = target;
                        None
                    }
                }
            };
            match next {
                Some(timer) if !timer.token.is_cancelled() => {
                    (timer.task)();
                    fired += 1;
                }
                Some(_) => {}
                None => return fired,
            }
        }
    }

    /// Run spawned tasks, including ones spawned while running.
    /// Returns how many tasks ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.queue.lock().ready.pop_front();
            match next {
                Some((token, task)) if !token.is_cancelled() => {
                    task();
                    ran += 1;
                }
                Some(_) => {}
                None => return ran,
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let token = CancelToken::new();
        let mut queue = self.queue.lock();
        queue.seq += 1;
        let timer = Timer {
            due: queue.now + delay,
            seq: queue.seq,
            token: token.clone(),
            task,
        };
        queue.timers.push(timer);
        TaskHandle::new(token)
    }

    fn spawn(&self, task: Task) -> TaskHandle {
        let token = CancelToken::new();
        self.queue.lock().ready.push_back((token.clone(), task));
        TaskHandle::new(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |label: &'static str| -> Task {
            let sink = sink.clone();
            Box::new(move || sink.lock().push(label))
        };
        (log, make)
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();
        scheduler.schedule(Duration::from_secs(3), task("late"));
        scheduler.schedule(Duration::from_secs(1), task("early"));
        scheduler.schedule(Duration::from_secs(10), task("never"));

        assert_eq!(scheduler.advance(Duration::from_secs(5)), 2);
        assert_eq!(*log.lock(), vec!["early", "late"]);
        assert_eq!(scheduler.now(), Duration::from_secs(5));
        assert_eq!(scheduler.pending_timers(), 1);
    }

    #[test]
    fn cancelled_work_never_runs() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();
        scheduler
            .schedule(Duration::from_secs(1), task("timer"))
            .cancel();
        scheduler.spawn(task("job")).cancel();

        assert_eq!(scheduler.advance(Duration::from_secs(2)), 0);
        assert_eq!(scheduler.run_pending(), 0);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn tasks_may_schedule_more_work() {
        let scheduler = Arc::new(ManualScheduler::new());
        let (log, task) = recorder();
        let inner = scheduler.clone();
        let follow_up = task("second");
        scheduler.spawn(Box::new(move || {
            inner.spawn(follow_up);
        }));

        assert_eq!(scheduler.run_pending(), 2);
        assert_eq!(*log.lock(), vec!["second"]);
    }

    #[tokio::test]
    async fn tokio_scheduler_runs_timer() {
        let scheduler = TokioScheduler::current();
        let (tx, rx) = tokio::sync::oneshot::channel();
        scheduler.schedule(
            Duration::from_millis(5),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        assert!(rx.await.is_ok());
    }
}
