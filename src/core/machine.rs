//! The immutable behavioral graph.

use super::ids::{RegionId, TransitionId, VertexId};
use super::meta::StateMachineMeta;
use super::region::Region;
use super::transition::Transition;
use super::vertex::{Vertex, VertexOwner};
use std::collections::HashMap;

/// A finalized statechart.
///
/// Built once by [`StateMachineBuilder`](crate::builder::StateMachineBuilder)
/// and never mutated afterwards; wrap it in an `Arc` to share it between any
/// number of executors.
pub struct StateMachine<C> {
    pub(crate) id: String,
    pub(crate) vertices: Vec<Vertex<C>>,
    pub(crate) regions: Vec<Region>,
    pub(crate) transitions: Vec<Transition<C>>,
    pub(crate) top_regions: Vec<RegionId>,
    pub(crate) connection_points: Vec<VertexId>,
    pub(crate) meta: StateMachineMeta,
    pub(crate) vertex_index: HashMap<String, VertexId>,
    pub(crate) region_index: HashMap<String, RegionId>,
}

impl<C> StateMachine<C> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn meta(&self) -> &StateMachineMeta {
        &self.meta
    }

    pub fn vertex(&self, id: VertexId) -> &Vertex<C> {
        &self.vertices[id.index()]
    }

    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id.index()]
    }

    pub fn transition(&self, id: TransitionId) -> &Transition<C> {
        &self.transitions[id.index()]
    }

    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &Vertex<C>)> {
        self.vertices
            .iter()
            .enumerate()
            .map(|(i, v)| (VertexId::new(i), v))
    }

    pub fn regions(&self) -> impl Iterator<Item = (RegionId, &Region)> {
        self.regions
            .iter()
            .enumerate()
            .map(|(i, r)| (RegionId::new(i), r))
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition<C>> {
        self.transitions.iter()
    }

    pub fn top_regions(&self) -> &[RegionId] {
        &self.top_regions
    }

    /// Entry and exit points of the machine itself.
    pub fn connection_points(&self) -> &[VertexId] {
        &self.connection_points
    }

    pub fn find_vertex(&self, id: &str) -> Option<VertexId> {
        self.vertex_index.get(id).copied()
    }

    pub fn find_region(&self, id: &str) -> Option<RegionId> {
        self.region_index.get(id).copied()
    }

    /// Nearest state that encloses `vertex`.
    ///
    /// Connection points sit on the boundary of their owner, so they share
    /// the owner's enclosing state.
    pub fn container_state(&self, vertex: VertexId) -> Option<VertexId> {
        match self.vertex(vertex).owner {
            VertexOwner::Region(region) => self.region(region).owner_state(),
            VertexOwner::State(owner) => self.container_state(owner),
            VertexOwner::Machine => None,
        }
    }

    /// Enclosing states of `vertex`, innermost first.
    pub fn ancestors(&self, vertex: VertexId) -> Vec<VertexId> {
        let mut chain = Vec::new();
        let mut cursor = self.container_state(vertex);
        while let Some(state) = cursor {
            chain.push(state);
            cursor = self.container_state(state);
        }
        chain
    }

    /// True when `vertex` lies strictly inside `state`.
    pub fn is_inside(&self, vertex: VertexId, state: VertexId) -> bool {
        self.ancestors(vertex).contains(&state)
    }

    /// Regions from the top of the machine down to the one holding `vertex`.
    /// Connection points report their owner's path.
    pub fn region_path(&self, vertex: VertexId) -> Vec<RegionId> {
        let mut path = Vec::new();
        let mut cursor = Some(vertex);
        while let Some(current) = cursor {
            match self.vertex(current).owner {
                VertexOwner::Region(region) => {
                    path.push(region);
                    cursor = self.region(region).owner_state();
                }
                VertexOwner::State(owner) => cursor = Some(owner),
                VertexOwner::Machine => cursor = None,
            }
        }
        path.reverse();
        path
    }

    /// The region of `state` on the way down to `vertex`.
    pub fn region_towards(&self, state: VertexId, vertex: VertexId) -> Option<RegionId> {
        self.region_path(vertex)
            .into_iter()
            .find(|region| self.region(*region).owner_state() == Some(state))
    }

    /// Display label: the name if set, otherwise the id.
    pub fn label(&self, vertex: VertexId) -> &str {
        let vertex = self.vertex(vertex);
        vertex.name().unwrap_or(vertex.id())
    }
}

impl<C> std::fmt::Debug for StateMachine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("id", &self.id)
            .field("vertices", &self.vertices.len())
            .field("regions", &self.regions.len())
            .field("transitions", &self.transitions.len())
            .field("meta", &self.meta)
            .finish()
    }
}
