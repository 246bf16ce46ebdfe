//! Saved region configurations.

use super::active::ActiveNode;
use crate::core::RegionId;
use std::collections::HashMap;

/// Last active configuration of every region that owns a history
/// pseudostate. Shallow history replays only the root of the saved node.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct HistoryStore {
    saved: HashMap<RegionId, ActiveNode>,
}

impl HistoryStore {
    pub fn record(&mut self, region: RegionId, node: ActiveNode) {
        self.saved.insert(region, node);
    }

    pub fn get(&self, region: RegionId) -> Option<&ActiveNode> {
        self.saved.get(&region)
    }

    pub fn contains(&self, region: RegionId) -> bool {
        self.saved.contains_key(&region)
    }

    pub fn forget(&mut self, region: RegionId) {
        self.saved.remove(&region);
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &ActiveNode)> {
        self.saved.iter().map(|(region, node)| (*region, node))
    }

    pub fn len(&self) -> usize {
        self.saved.len()
    }
}
