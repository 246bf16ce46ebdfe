use crate::core::{TransitionId, VertexId};
use std::collections::{HashMap, HashSet};

/// Join arrivals within the current step. Cleared between steps.
#[derive(Debug, Default)]
pub(crate) struct JoinRegistry {
    arrivals: HashMap<VertexId, HashSet<TransitionId>>,
}

impl JoinRegistry {
    /// Record `transition` reaching `join`; true once every transition in
    /// `expected` has arrived.
    pub fn arrive(&mut self, join: VertexId, transition: TransitionId, expected: &[TransitionId]) -> bool {
        let arrived = self.arrivals.entry(join).or_default();
        arrived.insert(transition);
        expected.iter().all(|incoming| arrived.contains(incoming))
    }

    pub fn clear(&mut self, join: VertexId) {
        self.arrivals.remove(&join);
    }

    pub fn clear_all(&mut self) {
        self.arrivals.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.arrivals.is_empty()
    }
}
