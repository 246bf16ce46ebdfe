//! Model-definition errors raised while building a machine.

use crate::core::PseudoKind;
use std::fmt;
use thiserror::Error;

/// A single structural problem found while building a machine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuildError {
    #[error("Machine '{0}' has no region. Call .region(id, ..) before .build()")]
    NoRegions(String),

    #[error("Vertex id '{0}' is declared more than once")]
    DuplicateVertexId(String),

    #[error("Region id '{0}' is declared more than once")]
    DuplicateRegionId(String),

    #[error("Region '{region}' declares more than one {kind:?} pseudostate")]
    DuplicateDefault { region: String, kind: PseudoKind },

    #[error("Transition source '{0}' does not exist")]
    UnresolvedSource(String),

    #[error("Transition target '{target}' (from '{from}') does not exist")]
    UnresolvedTarget { from: String, target: String },

    #[error("No common ancestor region for transition '{from}' -> '{target}'")]
    NoCommonAncestor { from: String, target: String },

    #[error("State '{state}' is declared orthogonal but has {found} region(s)")]
    OrthogonalNeedsRegions { state: String, found: usize },

    #[error("Local transition '{from}' -> '{target}' needs a composite source containing its target")]
    UnsupportedLocal { from: String, target: String },

    #[error("Internal transition '{from}' -> '{target}' must loop on a state")]
    UnsupportedInternal { from: String, target: String },

    #[error("Final state '{0}' cannot have outgoing transitions")]
    FinalStateOutgoing(String),

    #[error("Transition leaving pseudostate '{0}' cannot have triggers")]
    TriggeredPseudostateExit(String),

    #[error("Fork '{0}' branches cannot have guards")]
    GuardedForkBranch(String),
}

/// All problems found in one build, in discovery order.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildErrors(pub Vec<BuildError>);

impl BuildErrors {
    pub fn errors(&self) -> &[BuildError] {
        &self.0
    }

    pub fn contains(&self, predicate: impl Fn(&BuildError) -> bool) -> bool {
        self.0.iter().any(predicate)
    }
}

impl fmt::Display for BuildErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} build error(s)", self.0.len())?;
        for error in &self.0 {
            write!(f, "; {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildErrors {}
