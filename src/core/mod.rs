//! Core graph model.
//!
//! This module holds the immutable side of the engine:
//! - Arena ids addressing vertices, regions and transitions
//! - Events and the keys transitions are triggered by
//! - Guards, behaviors and activities supplied by the application
//! - The finalized `StateMachine` and its aggregate metadata
//!
//! Nothing here is mutated after a machine is built, so a machine can be
//! shared by any number of executors.

mod behavior;
mod event;
mod ids;
mod machine;
mod meta;
mod region;
mod transition;
mod vertex;

pub use behavior::{Activity, Behavior, CancelToken, Guard};
pub use event::{CustomEvent, Event, EventKey};
pub use ids::{RegionId, TransitionId, VertexId};
pub use machine::StateMachine;
pub use meta::{ActiveStrategy, StateMachineMeta};
pub use region::{Region, RegionOwner};
pub use transition::{Transition, TransitionKind, Trigger};
pub use vertex::{PseudoKind, StateData, Vertex, VertexKind, VertexOwner};
