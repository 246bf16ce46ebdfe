//! Property-based tests for execution and checkpointing.
//!
//! These tests use proptest to drive machines with random event
//! sequences and check that the active configuration stays well formed
//! and survives snapshots.

use orthogon::builder::StateMachineBuilder;
use orthogon::checkpoint::{Snapshot, SnapshotTree};
use orthogon::core::StateMachine;
use orthogon::executor::Executor;
use proptest::prelude::*;
use std::sync::Arc;

const EVENTS: [&str; 6] = ["enter", "leave", "a", "b", "back", "noise"];

fn machine() -> Arc<StateMachine<u32>> {
    let machine = StateMachineBuilder::new("toggles")
        .region("main", |r| {
            r.initial("init").simple("idle").state("P", |s| {
                s.region("left", |r| {
                    r.initial("li").simple("a1").simple("a2").deep_history("lh")
                })
                .region("right", |r| r.initial("ri").simple("b1").simple("b2"))
            })
        })
        .transition("init", "idle", |t| t)
        .transition("li", "a1", |t| t)
        .transition("ri", "b1", |t| t)
        .transition("lh", "a1", |t| t)
        .transition("idle", "P", |t| t.on("enter"))
        .transition("idle", "lh", |t| t.on("back"))
        .transition("P", "idle", |t| t.on("leave"))
        .transition("a1", "a2", |t| t.on("a").effect(|n: &mut u32, _| *n += 1))
        .transition("a2", "a1", |t| t.on("a").effect(|n: &mut u32, _| *n += 1))
        .transition("b1", "b2", |t| t.on("b"))
        .transition("b2", "b1", |t| t.on("b"))
        .build()
        .unwrap();
    Arc::new(machine)
}

fn fork_join() -> Arc<StateMachine<Vec<String>>> {
    let machine = StateMachineBuilder::new("fan")
        .region("main", |r| {
            r.initial("init")
                .simple("idle")
                .simple("done")
                .fork("split")
                .join("merge")
                .state("P", |s| {
                    s.region("r0", |r| r.initial("i0").simple("s0").simple("t0"))
                        .region("r1", |r| r.initial("i1").simple("s1").simple("t1"))
                        .region("r2", |r| r.initial("i2").simple("s2").simple("t2"))
                })
        })
        .transition("init", "idle", |t| t)
        .transition("i0", "s0", |t| t)
        .transition("i1", "s1", |t| t)
        .transition("i2", "s2", |t| t)
        .transition("idle", "split", |t| t.on("go"))
        .transition("split", "s0", |t| t)
        .transition("split", "s1", |t| t)
        .transition("split", "s2", |t| t)
        .transition("s0", "t0", |t| t.on("e0"))
        .transition("s1", "t1", |t| t.on("e1"))
        .transition("s2", "t2", |t| t.on("e2"))
        .transition("t0", "merge", |t| {
            t.on("sync").effect(|log: &mut Vec<String>, _| log.push("t0".into()))
        })
        .transition("t1", "merge", |t| {
            t.on("sync").effect(|log: &mut Vec<String>, _| log.push("t1".into()))
        })
        .transition("t2", "merge", |t| {
            t.on("sync").effect(|log: &mut Vec<String>, _| log.push("t2".into()))
        })
        .transition("merge", "done", |t| t)
        .build()
        .unwrap();
    Arc::new(machine)
}

/// Every active state has exactly one active child per region.
fn well_formed<C>(machine: &StateMachine<C>, tree: &SnapshotTree) -> bool {
    tree.iter().all(|(id, node)| {
        let Some(vertex) = machine.find_vertex(id) else {
            return false;
        };
        let regions = machine
            .vertex(vertex)
            .state()
            .map_or(0, |data| data.regions().len());
        regions == node.children.len() && well_formed(machine, &node.children)
    })
}

prop_compose! {
    fn arbitrary_events()(picks in prop::collection::vec(0..EVENTS.len(), 0..40)) -> Vec<&'static str> {
        picks.into_iter().map(|i| EVENTS[i]).collect()
    }
}

proptest! {
    #[test]
    fn configuration_stays_well_formed(events in arbitrary_events()) {
        let machine = machine();
        let mut executor = Executor::new(Arc::clone(&machine), 0);
        executor.start().unwrap();

        for event in events {
            executor.take(event).unwrap();
            let snapshot = executor.snapshot();
            prop_assert_eq!(snapshot.active.len(), 1);
            prop_assert!(well_formed(&machine, &snapshot.active));
            prop_assert!(!executor.is_poisoned());
        }
    }

    #[test]
    fn resumed_executor_behaves_like_the_original(
        prefix in arbitrary_events(),
        suffix in arbitrary_events(),
    ) {
        let machine = machine();
        let mut original = Executor::new(Arc::clone(&machine), 0);
        for event in prefix {
            original.take(event).unwrap();
        }

        let snapshot = Snapshot::from_binary(&original.snapshot().to_binary().unwrap()).unwrap();
        let mut restored = Executor::new(Arc::clone(&machine), 0);
        restored.resume(&snapshot).unwrap();
        prop_assert!(restored.snapshot().same_configuration(&original.snapshot()));

        for event in suffix {
            let expected = original.take(event).unwrap();
            let actual = restored.take(event).unwrap();
            prop_assert_eq!(expected, actual);
        }
        prop_assert!(restored.snapshot().same_configuration(&original.snapshot()));
    }

    #[test]
    fn resume_then_snapshot_is_stable(events in arbitrary_events()) {
        let machine = machine();
        let mut executor = Executor::new(Arc::clone(&machine), 0);
        for event in events {
            executor.take(event).unwrap();
        }
        let first = executor.snapshot();

        executor.resume(&first).unwrap();
        let second = executor.snapshot();
        prop_assert!(first.same_configuration(&second));

        let json = Snapshot::from_json(&second.to_json().unwrap()).unwrap();
        prop_assert_eq!(json, second);
    }

    #[test]
    fn join_fires_once_for_any_arrival_order(
        order in Just(vec!["e0", "e1", "e2"]).prop_shuffle(),
    ) {
        let mut executor = Executor::new(fork_join(), Vec::new());
        executor.take("go").unwrap();

        for event in &order {
            prop_assert!(!executor.take("sync").unwrap().is_accepted());
            executor.take(*event).unwrap();
        }
        prop_assert!(executor.take("sync").unwrap().is_accepted());

        let mut joined = executor.context().clone();
        joined.sort();
        prop_assert_eq!(joined, vec!["t0", "t1", "t2"]);
        prop_assert_eq!(executor.active_states(), vec!["done"]);
    }
}
