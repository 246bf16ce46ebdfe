//! Orthogon: a hierarchical statechart execution engine
//!
//! Orthogon runs UML-style state machines: nested states, orthogonal
//! regions, history, fork/join, choice and junction pseudostates, entry and
//! exit points, deferred events, time triggers and activities. Machines are
//! built once into an immutable graph and then driven by any number of
//! executors, each holding its own active configuration.
//!
//! # Core Concepts
//!
//! - **Builder**: Describe regions, states and transitions; every structural
//!   problem is reported at once when the machine is built
//! - **StateMachine**: Immutable, shareable graph with precomputed trigger
//!   indexes and transition owner regions
//! - **Executor**: Run-to-completion processing of one event at a time
//! - **Concurrency**: Affine, mutex, read-write and sharded disciplines
//! - **Checkpoint**: Snapshots of the active configuration and history,
//!   encodable as JSON or binary
//!
//! # Example
//!
//! ```rust
//! use orthogon::{Executor, StateMachineBuilder, TakeOutcome};
//! use std::sync::Arc;
//!
//! let machine = StateMachineBuilder::<u32>::new("turnstile")
//!     .region("main", |r| r.initial("init").simple("locked").simple("unlocked"))
//!     .transition("init", "locked", |t| t)
//!     .transition("locked", "unlocked", |t| {
//!         t.on("coin").effect(|coins: &mut u32, _| *coins += 1)
//!     })
//!     .transition("unlocked", "locked", |t| t.on("push"))
//!     .build()
//!     .unwrap();
//!
//! let mut executor = Executor::new(Arc::new(machine), 0);
//! executor.start().unwrap();
//! assert!(executor.is_active("locked"));
//!
//! assert_eq!(executor.take("coin").unwrap(), TakeOutcome::Accepted);
//! assert_eq!(executor.take("coin").unwrap(), TakeOutcome::Denied);
//! assert_eq!(executor.take("push").unwrap(), TakeOutcome::Accepted);
//! assert_eq!(*executor.context(), 1);
//!
//! let snapshot = executor.snapshot();
//! assert_eq!(snapshot.active_ids(), vec!["locked"]);
//! ```

pub mod builder;
pub mod checkpoint;
pub mod concurrency;
pub mod core;
pub mod executor;

// Re-export commonly used types
pub use builder::{BuildError, BuildErrors, StateMachineBuilder};
pub use checkpoint::{CheckpointError, Snapshot};
pub use core::{Event, EventKey, StateMachine};
pub use executor::{ExecutionError, Executor, ExecutorConfig, Listener, TakeOutcome};
