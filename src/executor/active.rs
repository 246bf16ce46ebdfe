//! Active-state configuration.
//!
//! Three layouts share one interface, picked from machine metadata:
//! a single slot for flat machines, a chain for nested machines without
//! orthogonality, and a tree for everything else.

use super::error::ExecutionError;
use crate::core::{ActiveStrategy, RegionId, VertexId};
use std::collections::HashMap;

/// An active state together with its active descendants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveNode {
    pub state: VertexId,
    pub children: Vec<ActiveNode>,
}

impl ActiveNode {
    pub fn leaf(state: VertexId) -> Self {
        Self {
            state,
            children: Vec::new(),
        }
    }

    /// States of this subtree, parents before children.
    pub fn states(&self) -> Vec<VertexId> {
        let mut states = vec![self.state];
        for child in &self.children {
            states.extend(child.states());
        }
        states
    }
}

pub(crate) trait ActiveStates: Send + Sync {
    fn strategy(&self) -> ActiveStrategy;

    /// Mark `state` active in `region`, nested under `parent`.
    fn activate(
        &mut self,
        state: VertexId,
        region: RegionId,
        parent: Option<VertexId>,
    ) -> Result<(), ExecutionError>;

    /// Remove `state` and everything below it.
    fn deactivate(&mut self, state: VertexId);

    fn is_active(&self, state: VertexId) -> bool;

    fn active_in(&self, region: RegionId) -> Option<VertexId>;

    /// Direct active children of `parent`; `None` asks for the top level.
    fn children(&self, parent: Option<VertexId>) -> Vec<VertexId>;

    fn clear(&mut self);

    fn is_empty(&self) -> bool {
        self.children(None).is_empty()
    }

    /// Active states without active children.
    fn leaves(&self) -> Vec<VertexId> {
        let mut leaves = Vec::new();
        let mut stack: Vec<VertexId> = self.children(None).into_iter().rev().collect();
        while let Some(state) = stack.pop() {
            let children = self.children(Some(state));
            if children.is_empty() {
                leaves.push(state);
            }
            stack.extend(children.into_iter().rev());
        }
        leaves
    }

    /// All active states, parents before children.
    fn all(&self) -> Vec<VertexId> {
        let mut all = Vec::new();
        let mut stack: Vec<VertexId> = self.children(None).into_iter().rev().collect();
        while let Some(state) = stack.pop() {
            all.push(state);
            stack.extend(self.children(Some(state)).into_iter().rev());
        }
        all
    }

    fn subtree(&self, state: VertexId) -> Result<ActiveNode, ExecutionError> {
        Ok(ActiveNode {
            state,
            children: self
                .children(Some(state))
                .into_iter()
                .map(|child| self.subtree(child))
                .collect::<Result<_, _>>()?,
        })
    }
}

pub(crate) fn for_strategy(strategy: ActiveStrategy) -> Box<dyn ActiveStates> {
    match strategy {
        ActiveStrategy::Simple => Box::<SimpleActive>::default(),
        ActiveStrategy::Composite => Box::<ChainActive>::default(),
        ActiveStrategy::Orthogonal => Box::<TreeActive>::default(),
    }
}

#[derive(Debug, Default)]
struct SimpleActive {
    current: Option<(VertexId, RegionId)>,
}

impl ActiveStates for SimpleActive {
    fn strategy(&self) -> ActiveStrategy {
        ActiveStrategy::Simple
    }

    fn activate(
        &mut self,
        state: VertexId,
        region: RegionId,
        parent: Option<VertexId>,
    ) -> Result<(), ExecutionError> {
        if parent.is_some() {
            return Err(ExecutionError::Unsupported {
                strategy: ActiveStrategy::Simple,
                operation: "nest active states",
            });
        }
        if self.current.is_some() {
            return Err(ExecutionError::RegionOccupied(region));
        }
        self.current = Some((state, region));
        Ok(())
    }

    fn deactivate(&mut self, state: VertexId) {
        if self.is_active(state) {
            self.current = None;
        }
    }

    fn is_active(&self, state: VertexId) -> bool {
        matches!(self.current, Some((current, _)) if current == state)
    }

    fn active_in(&self, region: RegionId) -> Option<VertexId> {
        self.current
            .filter(|(_, owner)| *owner == region)
            .map(|(state, _)| state)
    }

    fn children(&self, parent: Option<VertexId>) -> Vec<VertexId> {
        match parent {
            None => self.current.map(|(state, _)| state).into_iter().collect(),
            Some(_) => Vec::new(),
        }
    }

    fn clear(&mut self) {
        self.current = None;
    }

    fn subtree(&self, _state: VertexId) -> Result<ActiveNode, ExecutionError> {
        Err(ExecutionError::Unsupported {
            strategy: ActiveStrategy::Simple,
            operation: "copy active subtrees",
        })
    }
}

/// Outermost state first.
#[derive(Debug, Default)]
struct ChainActive {
    chain: Vec<(VertexId, RegionId)>,
}

impl ChainActive {
    fn position(&self, state: VertexId) -> Option<usize> {
        self.chain.iter().position(|(active, _)| *active == state)
    }
}

impl ActiveStates for ChainActive {
    fn strategy(&self) -> ActiveStrategy {
        ActiveStrategy::Composite
    }

    fn activate(
        &mut self,
        state: VertexId,
        region: RegionId,
        parent: Option<VertexId>,
    ) -> Result<(), ExecutionError> {
        let last = self.chain.last().map(|(active, _)| *active);
        match (parent, last) {
            (None, None) => {}
            (Some(parent), Some(last)) if parent == last => {}
            (Some(parent), _) if self.position(parent).is_none() => {
                return Err(ExecutionError::Unsupported {
                    strategy: ActiveStrategy::Composite,
                    operation: "activate a state below an inactive parent",
                })
            }
            _ => return Err(ExecutionError::RegionOccupied(region)),
        }
        self.chain.push((state, region));
        Ok(())
    }

    fn deactivate(&mut self, state: VertexId) {
        if let Some(position) = self.position(state) {
            self.chain.truncate(position);
        }
    }

    fn is_active(&self, state: VertexId) -> bool {
        self.position(state).is_some()
    }

    fn active_in(&self, region: RegionId) -> Option<VertexId> {
        self.chain
            .iter()
            .find(|(_, owner)| *owner == region)
            .map(|(state, _)| *state)
    }

    fn children(&self, parent: Option<VertexId>) -> Vec<VertexId> {
        let next = match parent {
            None => self.chain.first(),
            Some(parent) => self
                .position(parent)
                .and_then(|position| self.chain.get(position + 1)),
        };
        next.map(|(state, _)| *state).into_iter().collect()
    }

    fn clear(&mut self) {
        self.chain.clear();
    }
}

#[derive(Debug)]
struct TreeNode {
    parent: Option<VertexId>,
    region: RegionId,
    children: Vec<VertexId>,
}

#[derive(Debug, Default)]
struct TreeActive {
    nodes: HashMap<VertexId, TreeNode>,
    roots: Vec<VertexId>,
    by_region: HashMap<RegionId, VertexId>,
}

impl ActiveStates for TreeActive {
    fn strategy(&self) -> ActiveStrategy {
        ActiveStrategy::Orthogonal
    }

    fn activate(
        &mut self,
        state: VertexId,
        region: RegionId,
        parent: Option<VertexId>,
    ) -> Result<(), ExecutionError> {
        if self.by_region.contains_key(&region) || self.nodes.contains_key(&state) {
            return Err(ExecutionError::RegionOccupied(region));
        }
        match parent {
            Some(parent) => match self.nodes.get_mut(&parent) {
                Some(node) => node.children.push(state),
                None => {
                    return Err(ExecutionError::Unsupported {
                        strategy: ActiveStrategy::Orthogonal,
                        operation: "activate a state below an inactive parent",
                    })
                }
            },
            None => self.roots.push(state),
        }
        self.nodes.insert(
            state,
            TreeNode {
                parent,
                region,
                children: Vec::new(),
            },
        );
        self.by_region.insert(region, state);
        Ok(())
    }

    fn deactivate(&mut self, state: VertexId) {
        let Some(node) = self.nodes.remove(&state) else {
            return;
        };
        for child in node.children {
            self.deactivate(child);
        }
        self.by_region.remove(&node.region);
        let siblings = match node.parent.and_then(|parent| self.nodes.get_mut(&parent)) {
            Some(parent) => &mut parent.children,
            None => &mut self.roots,
        };
        siblings.retain(|sibling| *sibling != state);
    }

    fn is_active(&self, state: VertexId) -> bool {
        self.nodes.contains_key(&state)
    }

    fn active_in(&self, region: RegionId) -> Option<VertexId> {
        self.by_region.get(&region).copied()
    }

    fn children(&self, parent: Option<VertexId>) -> Vec<VertexId> {
        match parent {
            None => self.roots.clone(),
            Some(parent) => self
                .nodes
                .get(&parent)
                .map(|node| node.children.clone())
                .unwrap_or_default(),
        }
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        self.by_region.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(index: usize) -> VertexId {
        VertexId::new(index)
    }

    fn r(index: usize) -> RegionId {
        RegionId::new(index)
    }

    #[test]
    fn simple_holds_one_state() {
        let mut active = for_strategy(ActiveStrategy::Simple);
        active.activate(v(0), r(0), None).unwrap();

        assert!(matches!(
            active.activate(v(1), r(0), None),
            Err(ExecutionError::RegionOccupied(_))
        ));
        assert!(matches!(
            active.activate(v(1), r(1), Some(v(0))),
            Err(ExecutionError::Unsupported { .. })
        ));
        assert!(active.subtree(v(0)).is_err());

        active.deactivate(v(0));
        assert!(active.is_empty());
    }

    #[test]
    fn chain_truncates_below_deactivated_state() {
        let mut active = for_strategy(ActiveStrategy::Composite);
        active.activate(v(0), r(0), None).unwrap();
        active.activate(v(1), r(1), Some(v(0))).unwrap();
        active.activate(v(2), r(2), Some(v(1))).unwrap();

        assert_eq!(active.leaves(), vec![v(2)]);
        assert_eq!(active.active_in(r(1)), Some(v(1)));
        assert_eq!(
            active.subtree(v(0)).unwrap().states(),
            vec![v(0), v(1), v(2)]
        );

        active.deactivate(v(1));
        assert_eq!(active.all(), vec![v(0)]);
        assert_eq!(active.active_in(r(2)), None);
    }

    #[test]
    fn chain_rejects_second_branch() {
        let mut active = for_strategy(ActiveStrategy::Composite);
        active.activate(v(0), r(0), None).unwrap();
        active.activate(v(1), r(1), Some(v(0))).unwrap();

        assert!(active.activate(v(2), r(1), Some(v(0))).is_err());
    }

    #[test]
    fn tree_tracks_orthogonal_regions() {
        let mut active = for_strategy(ActiveStrategy::Orthogonal);
        active.activate(v(0), r(0), None).unwrap();
        active.activate(v(1), r(1), Some(v(0))).unwrap();
        active.activate(v(2), r(2), Some(v(0))).unwrap();
        active.activate(v(3), r(3), Some(v(2))).unwrap();

        assert_eq!(active.leaves(), vec![v(1), v(3)]);
        assert_eq!(active.all(), vec![v(0), v(1), v(2), v(3)]);
        assert!(active.activate(v(4), r(1), Some(v(0))).is_err());

        active.deactivate(v(2));
        assert_eq!(active.children(Some(v(0))), vec![v(1)]);
        assert!(!active.is_active(v(3)));
        assert_eq!(active.active_in(r(3)), None);
    }
}
