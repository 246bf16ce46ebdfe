//! Executors driven from more than one thread.

use orthogon::builder::StateMachineBuilder;
use orthogon::concurrency::{AffineExecutor, RwExecutor, ShardedPool, SynchronizedExecutor};
use orthogon::core::StateMachine;
use orthogon::executor::{ExecutionError, Executor, ManualScheduler, TakeOutcome};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn counter() -> Arc<StateMachine<u64>> {
    let machine = StateMachineBuilder::new("counter")
        .region("main", |r| {
            r.initial("init")
                .simple("counting")
                .simple("waiting")
                .simple("done")
        })
        .transition("init", "counting", |t| t)
        .transition("counting", "counting", |t| {
            t.on("inc").internal().effect(|n: &mut u64, _| *n += 1)
        })
        .transition("counting", "waiting", |t| t.on("wait"))
        .transition("waiting", "done", |t| t.after(Duration::from_millis(50)))
        .build()
        .unwrap();
    Arc::new(machine)
}

fn worker() -> Arc<StateMachine<u64>> {
    let machine = StateMachineBuilder::new("worker")
        .region("main", |r| {
            r.initial("init")
                .state("busy", |s| s.activity(|_| Ok(())))
                .simple("idle")
        })
        .transition("init", "busy", |t| t)
        .transition("busy", "idle", |t| t)
        .build()
        .unwrap();
    Arc::new(machine)
}

#[test]
fn affine_executor_rejects_other_threads() {
    let mut affine = AffineExecutor::new(Executor::new(counter(), 0));
    affine.start().unwrap();
    assert_eq!(affine.take("inc").unwrap(), TakeOutcome::Accepted);

    let owner = affine.owner();
    let result = thread::scope(|scope| scope.spawn(|| affine.take("inc")).join().unwrap());
    match result {
        Err(ExecutionError::WrongThread { owner: reported, .. }) => {
            assert_eq!(Some(reported), owner);
        }
        other => panic!("expected a wrong-thread error, got {other:?}"),
    }

    assert_eq!(*affine.executor().unwrap().context(), 1);
}

#[test]
fn affine_executor_pumps_inbound_before_each_event() {
    let scheduler = Arc::new(ManualScheduler::new());
    let executor = Executor::builder(counter())
        .scheduler(scheduler.clone())
        .build(0);
    let mut affine = AffineExecutor::new(executor);
    affine.take("wait").unwrap();

    scheduler.advance(Duration::from_millis(50));
    assert_eq!(affine.take("noise").unwrap(), TakeOutcome::Denied);
    assert!(affine.executor().unwrap().is_active("done"));
}

#[test]
fn synchronized_executor_serializes_callers() {
    let shared = SynchronizedExecutor::new(Executor::new(counter(), 0));
    shared.start().unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    shared.take("inc").unwrap();
                }
            })
        })
        .collect();
    for handle in workers {
        handle.join().unwrap();
    }

    assert_eq!(shared.with(|executor| *executor.context()), 400);
}

#[test]
fn synchronized_executor_handles_timers_without_pumping() {
    let scheduler = Arc::new(ManualScheduler::new());
    let shared = SynchronizedExecutor::new(
        Executor::builder(counter())
            .scheduler(scheduler.clone())
            .build(0),
    );
    shared.take("wait").unwrap();
    assert!(shared.is_active("waiting"));

    scheduler.advance(Duration::from_millis(50));
    assert!(shared.is_active("done"));
}

#[test]
fn rw_executor_serves_concurrent_readers() {
    let shared = RwExecutor::new(Executor::new(counter(), 0));
    shared.start().unwrap();
    shared.take("inc").unwrap();

    let snapshots: Vec<_> = thread::scope(|scope| {
        let readers: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| shared.snapshot()))
            .collect();
        readers.into_iter().map(|r| r.join().unwrap()).collect()
    });

    for snapshot in &snapshots {
        assert_eq!(snapshot.active_ids(), vec!["counting"]);
    }
    assert_eq!(shared.read(|executor| *executor.context()), 1);
    assert_eq!(shared.active_states(), vec!["counting"]);
}

#[test]
fn sharded_pool_runs_each_executor_on_one_worker() {
    let pool = ShardedPool::new(3).unwrap();
    let handles: Vec<_> = (0..6)
        .map(|_| pool.attach(Executor::new(counter(), 0)))
        .collect();

    for handle in &handles {
        assert_eq!(handle.shard(), pool.shard_of(handle.instance_id()));
        handle.start().wait().unwrap();
    }
    let pending: Vec<_> = handles
        .iter()
        .flat_map(|handle| (0..10).map(move |_| handle.take("inc")))
        .collect();
    for reply in pending {
        assert_eq!(reply.wait().unwrap(), TakeOutcome::Accepted);
    }

    for handle in &handles {
        let count = handle.with(|executor| *executor.context()).wait().unwrap();
        assert_eq!(count, 10);
    }
}

#[test]
fn sharded_activity_completion_is_processed_on_the_worker() {
    let pool = ShardedPool::new(2).unwrap();
    let scheduler = Arc::new(ManualScheduler::new());
    let handle = pool.attach(
        Executor::builder(worker())
            .scheduler(scheduler.clone())
            .build(0),
    );
    handle.start().wait().unwrap();
    assert_eq!(scheduler.run_pending(), 1);

    let snapshot = handle.snapshot().wait().unwrap();
    assert_eq!(snapshot.active_ids(), vec!["idle"]);
}

#[test]
fn detached_executor_keeps_its_state() {
    let pool = ShardedPool::new(2).unwrap();
    let handle = pool.attach(Executor::new(counter(), 0));
    handle.take("inc").wait().unwrap();

    let executor = handle.detach().wait().unwrap();
    assert_eq!(*executor.context(), 1);
    assert!(matches!(
        handle.take("inc").wait(),
        Err(ExecutionError::WorkerUnavailable)
    ));
}

#[test]
fn calls_after_shutdown_report_unavailable_worker() {
    let pool = ShardedPool::new(1).unwrap();
    let handle = pool.attach(Executor::new(counter(), 0));
    handle.start().wait().unwrap();

    pool.shutdown();
    assert!(matches!(
        handle.take("inc").wait(),
        Err(ExecutionError::WorkerUnavailable)
    ));
}
