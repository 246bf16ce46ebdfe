//! Transitions between vertices.

use super::behavior::{Behavior, Guard};
use super::event::EventKey;
use super::ids::{RegionId, TransitionId, VertexId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// UML transition kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    /// Exits the source (scoped by the least common ancestor region).
    #[default]
    External,
    /// Stays inside a composite source; only its active substates are left.
    Local,
    /// Runs the effect without leaving or entering anything.
    Internal,
}

/// What triggers a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
    Event(EventKey),
    /// Fires once the source has been active for the given time.
    After(Duration),
}

/// A directed edge of the graph. An empty trigger set makes it a completion
/// transition when leaving a state, or an ordinary hop when leaving a
/// pseudostate.
pub struct Transition<C> {
    pub(crate) id: TransitionId,
    pub(crate) source: VertexId,
    pub(crate) target: VertexId,
    pub(crate) kind: TransitionKind,
    pub(crate) owner: RegionId,
    pub(crate) triggers: Vec<Trigger>,
    pub(crate) guard: Option<Guard<C>>,
    pub(crate) effect: Option<Behavior<C>>,
}

impl<C> Transition<C> {
    pub fn id(&self) -> TransitionId {
        self.id
    }

    pub fn source(&self) -> VertexId {
        self.source
    }

    pub fn target(&self) -> VertexId {
        self.target
    }

    pub fn kind(&self) -> TransitionKind {
        self.kind
    }

    /// Region whose active content this transition leaves and re-enters.
    pub fn owner(&self) -> RegionId {
        self.owner
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn guard(&self) -> Option<&Guard<C>> {
        self.guard.as_ref()
    }

    pub fn effect(&self) -> Option<&Behavior<C>> {
        self.effect.as_ref()
    }

    pub fn is_completion(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Delay of the time trigger, if this transition has one.
    pub fn delay(&self) -> Option<Duration> {
        self.triggers.iter().find_map(|trigger| match trigger {
            Trigger::After(delay) => Some(*delay),
            Trigger::Event(_) => None,
        })
    }
}
