//! Region ownership of transitions.
//!
//! Computed once while finalizing a machine. The owning region is the scope
//! a transition leaves and re-enters at run time.

use super::error::BuildError;
use crate::core::{PseudoKind, RegionId, StateMachine, TransitionKind, VertexId, VertexOwner};

pub(crate) fn owning_region<C>(
    machine: &StateMachine<C>,
    source: VertexId,
    target: VertexId,
    kind: TransitionKind,
) -> Result<RegionId, BuildError> {
    match kind {
        TransitionKind::Internal => internal_owner(machine, source, target),
        TransitionKind::Local => local_owner(machine, source, target),
        TransitionKind::External => external_owner(machine, source, target),
    }
}

fn ids<C>(machine: &StateMachine<C>, source: VertexId, target: VertexId) -> (String, String) {
    (
        machine.vertex(source).id().to_string(),
        machine.vertex(target).id().to_string(),
    )
}

fn internal_owner<C>(
    machine: &StateMachine<C>,
    source: VertexId,
    target: VertexId,
) -> Result<RegionId, BuildError> {
    let vertex = machine.vertex(source);
    match vertex.region() {
        Some(region) if source == target && vertex.is_state() => Ok(region),
        _ => {
            let (from, target) = ids(machine, source, target);
            Err(BuildError::UnsupportedInternal { from, target })
        }
    }
}

fn local_owner<C>(
    machine: &StateMachine<C>,
    source: VertexId,
    target: VertexId,
) -> Result<RegionId, BuildError> {
    let regions = machine
        .vertex(source)
        .state()
        .map(|data| data.regions())
        .unwrap_or(&[]);

    let owner = match regions {
        [] => None,
        _ if !machine.is_inside(target, source) => None,
        [only] => Some(*only),
        _ => machine.region_towards(source, target),
    };

    owner.ok_or_else(|| {
        let (from, target) = ids(machine, source, target);
        BuildError::UnsupportedLocal { from, target }
    })
}

fn external_owner<C>(
    machine: &StateMachine<C>,
    source: VertexId,
    target: VertexId,
) -> Result<RegionId, BuildError> {
    let src = machine.vertex(source);
    let tgt = machine.vertex(target);

    // Entering a state's content through its entry point.
    if src.is_pseudo(PseudoKind::EntryPoint) {
        if let VertexOwner::State(state) = src.owner() {
            if machine.is_inside(target, state) {
                if let Some(region) = machine.region_towards(state, target) {
                    return Ok(region);
                }
            }
        }
    }

    // Leaving a state's content through its exit point: only the region the
    // source sits in is left; the exit point's own outgoing transition
    // leaves the state itself.
    if tgt.is_pseudo(PseudoKind::ExitPoint) {
        if let VertexOwner::State(state) = tgt.owner() {
            if machine.is_inside(source, state) {
                if let Some(region) = machine.region_towards(state, source) {
                    return Ok(region);
                }
            }
        }
    }

    let source_path = machine.region_path(source);
    let target_path = machine.region_path(target);

    // Machine-level connection points have an empty path.
    let common = match (source_path.is_empty(), target_path.is_empty()) {
        (true, false) => target_path.first().copied(),
        (false, true) => source_path.first().copied(),
        _ => source_path
            .iter()
            .zip(target_path.iter())
            .take_while(|(a, b)| a == b)
            .last()
            .map(|(a, _)| *a),
    };

    common.ok_or_else(|| {
        let (from, target) = ids(machine, source, target);
        BuildError::NoCommonAncestor { from, target }
    })
}
