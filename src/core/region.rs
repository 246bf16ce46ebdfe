//! Regions: containers of vertices and the transitions they own.

use super::ids::{TransitionId, VertexId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionOwner {
    State(VertexId),
    Machine,
}

/// A region of a composite state or of the machine.
///
/// At most one initial, one shallow history and one deep history
/// pseudostate; the builder rejects anything else, so the caches below are
/// unambiguous.
#[derive(Clone, Debug)]
pub struct Region {
    pub(crate) id: String,
    pub(crate) owner: RegionOwner,
    pub(crate) vertices: Vec<VertexId>,
    pub(crate) transitions: Vec<TransitionId>,
    pub(crate) initial: Option<VertexId>,
    pub(crate) shallow_history: Option<VertexId>,
    pub(crate) deep_history: Option<VertexId>,
}

impl Region {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner(&self) -> RegionOwner {
        self.owner
    }

    /// The state owning this region, if it is not a top region.
    pub fn owner_state(&self) -> Option<VertexId> {
        match self.owner {
            RegionOwner::State(state) => Some(state),
            RegionOwner::Machine => None,
        }
    }

    pub fn vertices(&self) -> &[VertexId] {
        &self.vertices
    }

    /// Transitions whose leave/enter scope is this region.
    pub fn transitions(&self) -> &[TransitionId] {
        &self.transitions
    }

    pub fn initial(&self) -> Option<VertexId> {
        self.initial
    }

    pub fn shallow_history(&self) -> Option<VertexId> {
        self.shallow_history
    }

    pub fn deep_history(&self) -> Option<VertexId> {
        self.deep_history
    }

    pub fn has_history(&self) -> bool {
        self.shallow_history.is_some() || self.deep_history.is_some()
    }
}
