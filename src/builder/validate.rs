//! Structural checks run once the graph is assembled.
//!
//! Like the rest of the build, every check reports through `Validation` so
//! a single build returns all problems at once.

use super::error::BuildError;
use crate::core::{PseudoKind, StateMachine, VertexKind};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

pub(crate) type Check = Validation<(), NonEmptyVec<BuildError>>;

pub(crate) fn structure<C>(machine: &StateMachine<C>) -> Vec<Check> {
    let mut checks = Vec::new();

    for (_, vertex) in machine.vertices() {
        match vertex.kind() {
            VertexKind::Final if !vertex.outgoing().is_empty() => {
                checks.push(Validation::fail(BuildError::FinalStateOutgoing(
                    vertex.id().to_string(),
                )));
            }
            VertexKind::Pseudo(kind) => {
                let leaving = vertex.outgoing().iter().map(|t| machine.transition(*t));
                let mut triggered = false;
                let mut guarded = false;
                for transition in leaving {
                    triggered |= !transition.triggers().is_empty();
                    guarded |= transition.guard().is_some();
                }
                if triggered {
                    checks.push(Validation::fail(BuildError::TriggeredPseudostateExit(
                        vertex.id().to_string(),
                    )));
                }
                if guarded && *kind == PseudoKind::Fork {
                    checks.push(Validation::fail(BuildError::GuardedForkBranch(
                        vertex.id().to_string(),
                    )));
                }
            }
            _ => {}
        }
    }

    checks
}
