//! Run-time structural errors.

use crate::checkpoint::CheckpointError;
use crate::core::{ActiveStrategy, RegionId};
use std::thread::ThreadId;
use thiserror::Error;

/// Errors that abort an executor operation.
///
/// Everything here points at an inconsistency between the model, the
/// active configuration or a snapshot. Failures of user behaviors never
/// show up as an `ExecutionError`; they are reported to listeners instead.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Region '{region}' is entered by default but has no initial pseudostate")]
    MissingInitial { region: String },

    #[error("Pseudostate '{vertex}' has no transition able to fire")]
    DeadEnd { vertex: String },

    #[error("History '{vertex}' is unreachable: nothing saved and no default transition")]
    UnreachableHistory { vertex: String },

    #[error("Unknown state id '{0}'")]
    UnknownState(String),

    #[error("Unknown region id '{0}'")]
    UnknownRegion(String),

    #[error("{strategy:?} active-state strategy cannot {operation}")]
    Unsupported {
        strategy: ActiveStrategy,
        operation: &'static str,
    },

    #[error("Region {0:?} already has an active state")]
    RegionOccupied(RegionId),

    #[error("Executor bound to thread {owner:?} was called from {caller:?}")]
    WrongThread { owner: ThreadId, caller: ThreadId },

    #[error("Executor is unusable after an earlier fatal error")]
    Poisoned,

    #[error("Worker owning this executor is no longer running")]
    WorkerUnavailable,

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}
