//! Aggregate facts about a finalized machine.

use super::ids::RegionId;
use super::region::Region;
use super::transition::Transition;
use super::vertex::{PseudoKind, Vertex, VertexKind};
use serde::{Deserialize, Serialize};

/// How an executor stores its active-state configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActiveStrategy {
    /// One top region, no nesting: a single active state.
    Simple,
    /// Strict chain, at most one active child per state.
    Composite,
    /// General tree with orthogonal branches.
    Orthogonal,
}

/// Read-only facts computed once after build. Used to pick the
/// active-state strategy and to skip timer, activity and completion work
/// the machine can never need.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMachineMeta {
    pub has_completion_transitions: bool,
    pub has_time_triggers: bool,
    pub has_activities: bool,
    pub has_deferred_events: bool,
    pub history_count: usize,
    pub join_count: usize,
    /// Deepest state nesting; top-level states have depth 1.
    pub max_depth: usize,
    /// Regions that contain no composite state.
    pub leaf_region_count: usize,
    pub top_region_count: usize,
    pub has_simple_states: bool,
    pub has_composite_states: bool,
    pub has_orthogonal_states: bool,
    pub has_submachine_states: bool,
}

impl StateMachineMeta {
    pub(crate) fn compute<C>(
        vertices: &[Vertex<C>],
        regions: &[Region],
        transitions: &[Transition<C>],
        top_regions: &[RegionId],
    ) -> Self {
        let mut meta = StateMachineMeta {
            top_region_count: top_regions.len(),
            ..Self::default()
        };

        for vertex in vertices {
            match &vertex.kind {
                VertexKind::State(data) => {
                    match data.regions.len() {
                        0 => meta.has_simple_states = true,
                        1 => meta.has_composite_states = true,
                        _ => meta.has_orthogonal_states = true,
                    }
                    meta.has_activities |= data.activity.is_some();
                    meta.has_deferred_events |= !data.deferred.is_empty();
                    meta.has_submachine_states |= data.submachine.is_some();
                    meta.has_completion_transitions |= !vertex.completions.is_empty();
                }
                VertexKind::Pseudo(kind) if kind.is_history() => meta.history_count += 1,
                VertexKind::Pseudo(PseudoKind::Join) => meta.join_count += 1,
                _ => {}
            }
        }

        meta.has_time_triggers = transitions.iter().any(|t| t.delay().is_some());

        meta.leaf_region_count = regions
            .iter()
            .filter(|region| {
                region.vertices.iter().all(|v| {
                    vertices[v.index()]
                        .state()
                        .is_none_or(|data| data.regions.is_empty())
                })
            })
            .count();

        meta.max_depth = Self::depth_of(vertices, regions, top_regions);
        meta
    }

    fn depth_of<C>(vertices: &[Vertex<C>], regions: &[Region], from: &[RegionId]) -> usize {
        from.iter()
            .flat_map(|r| regions[r.index()].vertices.iter())
            .filter_map(|v| vertices[v.index()].state())
            .map(|data| 1 + Self::depth_of(vertices, regions, &data.regions))
            .max()
            .unwrap_or(0)
    }

    /// Cheapest active-state strategy able to represent this machine.
    pub fn active_strategy(&self) -> ActiveStrategy {
        let single_root = self.top_region_count <= 1;
        if single_root
            && !self.has_composite_states
            && !self.has_orthogonal_states
            && !self.has_submachine_states
            && self.history_count == 0
        {
            ActiveStrategy::Simple
        } else if single_root && !self.has_orthogonal_states {
            ActiveStrategy::Composite
        } else {
            ActiveStrategy::Orthogonal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_machine_uses_simple_strategy() {
        let meta = StateMachineMeta {
            top_region_count: 1,
            has_simple_states: true,
            ..Default::default()
        };
        assert_eq!(meta.active_strategy(), ActiveStrategy::Simple);
    }

    #[test]
    fn history_forces_tree_capable_strategy() {
        let meta = StateMachineMeta {
            top_region_count: 1,
            history_count: 1,
            ..Default::default()
        };
        assert_eq!(meta.active_strategy(), ActiveStrategy::Composite);
    }

    #[test]
    fn orthogonal_states_or_top_regions_need_tree() {
        let nested = StateMachineMeta {
            top_region_count: 1,
            has_orthogonal_states: true,
            ..Default::default()
        };
        let parallel_roots = StateMachineMeta {
            top_region_count: 2,
            ..Default::default()
        };
        assert_eq!(nested.active_strategy(), ActiveStrategy::Orthogonal);
        assert_eq!(parallel_roots.active_strategy(), ActiveStrategy::Orthogonal);
    }
}
