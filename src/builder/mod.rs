//! Builder API for statechart construction.
//!
//! Machines are described with nested closures, then finalized in one
//! step: ids are resolved, submachines inlined, transition owner regions
//! computed and every structural rule checked. All violations are reported
//! together instead of one at a time.

pub mod error;
pub mod machine;
mod ownership;
pub mod region;
pub mod transition;
mod validate;

pub use error::{BuildError, BuildErrors};
pub use machine::{MachineDefinition, StateMachineBuilder};
pub use region::{RegionBuilder, StateBuilder};
pub use transition::TransitionBuilder;
