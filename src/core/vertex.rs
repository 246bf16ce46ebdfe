//! Vertices: states, final states and pseudostates.

use super::behavior::{Activity, Behavior};
use super::event::EventKey;
use super::ids::{RegionId, TransitionId, VertexId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// The ten pseudostate kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PseudoKind {
    Initial,
    Choice,
    Junction,
    Fork,
    Join,
    ShallowHistory,
    DeepHistory,
    EntryPoint,
    ExitPoint,
    Terminate,
}

impl PseudoKind {
    pub fn is_history(self) -> bool {
        matches!(self, PseudoKind::ShallowHistory | PseudoKind::DeepHistory)
    }

    /// Connection points are owned by a state or the machine, not a region.
    pub fn is_connection_point(self) -> bool {
        matches!(self, PseudoKind::EntryPoint | PseudoKind::ExitPoint)
    }
}

/// Who owns a vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexOwner {
    Region(RegionId),
    /// Entry or exit point of a state.
    State(VertexId),
    /// Entry or exit point of the machine itself.
    Machine,
}

/// Data carried by a (non-final) state.
pub struct StateData<C> {
    pub(crate) regions: Vec<RegionId>,
    pub(crate) entry: Vec<Behavior<C>>,
    pub(crate) exit: Vec<Behavior<C>>,
    pub(crate) activity: Option<Activity>,
    pub(crate) connection_points: Vec<VertexId>,
    pub(crate) deferred: HashSet<EventKey>,
    pub(crate) submachine: Option<String>,
}

impl<C> StateData<C> {
    pub fn regions(&self) -> &[RegionId] {
        &self.regions
    }

    pub fn is_simple(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn is_composite(&self) -> bool {
        !self.regions.is_empty()
    }

    pub fn is_orthogonal(&self) -> bool {
        self.regions.len() > 1
    }

    pub fn activity(&self) -> Option<&Activity> {
        self.activity.as_ref()
    }

    pub fn connection_points(&self) -> &[VertexId] {
        &self.connection_points
    }

    pub fn defers(&self, key: &EventKey) -> bool {
        self.deferred.contains(key)
    }

    /// Id of the machine this state's regions were inlined from.
    pub fn submachine(&self) -> Option<&str> {
        self.submachine.as_deref()
    }
}

pub enum VertexKind<C> {
    State(StateData<C>),
    Final,
    Pseudo(PseudoKind),
}

/// A node of the behavioral graph.
pub struct Vertex<C> {
    pub(crate) id: String,
    pub(crate) name: Option<String>,
    pub(crate) owner: VertexOwner,
    pub(crate) kind: VertexKind<C>,
    pub(crate) outgoing: Vec<TransitionId>,
    pub(crate) incoming: Vec<TransitionId>,
    pub(crate) by_trigger: HashMap<EventKey, Vec<TransitionId>>,
    pub(crate) completions: Vec<TransitionId>,
    pub(crate) time_triggers: Vec<TransitionId>,
}

impl<C> Vertex<C> {
    /// Machine-wide unique id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn owner(&self) -> VertexOwner {
        self.owner
    }

    /// Owning region; `None` for connection points.
    pub fn region(&self) -> Option<RegionId> {
        match self.owner {
            VertexOwner::Region(region) => Some(region),
            _ => None,
        }
    }

    pub fn kind(&self) -> &VertexKind<C> {
        &self.kind
    }

    pub fn state(&self) -> Option<&StateData<C>> {
        match &self.kind {
            VertexKind::State(data) => Some(data),
            _ => None,
        }
    }

    pub fn pseudo_kind(&self) -> Option<PseudoKind> {
        match self.kind {
            VertexKind::Pseudo(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is_state(&self) -> bool {
        matches!(self.kind, VertexKind::State(_))
    }

    pub fn is_final(&self) -> bool {
        matches!(self.kind, VertexKind::Final)
    }

    /// States and final states can be part of the active configuration.
    pub fn is_stateful(&self) -> bool {
        !matches!(self.kind, VertexKind::Pseudo(_))
    }

    pub fn is_pseudo(&self, kind: PseudoKind) -> bool {
        self.pseudo_kind() == Some(kind)
    }

    pub fn outgoing(&self) -> &[TransitionId] {
        &self.outgoing
    }

    pub fn incoming(&self) -> &[TransitionId] {
        &self.incoming
    }

    /// Outgoing transitions triggered by `key`, in declaration order.
    pub fn triggered_by(&self, key: &EventKey) -> &[TransitionId] {
        self.by_trigger.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Outgoing transitions with an empty trigger set.
    pub fn completions(&self) -> &[TransitionId] {
        &self.completions
    }

    /// Outgoing transitions triggered by a time event.
    pub fn time_triggers(&self) -> &[TransitionId] {
        &self.time_triggers
    }
}
