use super::active::{self, ActiveNode, ActiveStates};
use super::error::ExecutionError;
use super::history::HistoryStore;
use super::status::StateStatus;
use super::{Executor, Phase};
use crate::checkpoint::{CheckpointError, Snapshot, SnapshotNode, SnapshotTree};
use crate::core::{StateMachine, VertexId};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

impl<C: 'static> Executor<C> {
    /// Capture the active configuration and saved history.
    ///
    /// The context is not included; attach it with
    /// [`Snapshot::with_context`] when it is serializable.
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new(self.machine.id());
        snapshot.started = self.phase != Phase::NotStarted;
        snapshot.terminated = self.phase == Phase::Terminated;
        snapshot.active = self.active_level(None);
        snapshot.history = self
            .history
            .iter()
            .map(|(region, node)| {
                (
                    self.machine.region(region).id().to_string(),
                    self.history_tree(node),
                )
            })
            .collect();
        snapshot
    }

    fn active_level(&self, parent: Option<VertexId>) -> SnapshotTree {
        self.active
            .children(parent)
            .into_iter()
            .map(|state| {
                let node = SnapshotNode {
                    activated_at: self.status.get(&state).map(|status| status.activated_at),
                    children: self.active_level(Some(state)),
                };
                (self.machine.vertex(state).id().to_string(), node)
            })
            .collect()
    }

    fn history_tree(&self, node: &ActiveNode) -> SnapshotTree {
        let children = node
            .children
            .iter()
            .flat_map(|child| self.history_tree(child))
            .collect();
        BTreeMap::from([(
            self.machine.vertex(node.state).id().to_string(),
            SnapshotNode {
                activated_at: None,
                children,
            },
        )])
    }

    /// Replace the current configuration with the one in `snapshot`.
    ///
    /// No entry or exit behaviors run. Timers are re-armed for the time
    /// remaining since each state's recorded activation, and activities of
    /// restored states start over. On error the executor is left as it was.
    pub fn resume(&mut self, snapshot: &Snapshot) -> Result<(), ExecutionError> {
        self.ensure_usable()?;
        let machine = Arc::clone(&self.machine);
        snapshot.validate(machine.id())?;

        let mut restored = active::for_strategy(self.active.strategy());
        let mut activations = Vec::new();
        restore_level(
            &machine,
            restored.as_mut(),
            None,
            &snapshot.active,
            &mut activations,
        )?;

        let mut history = HistoryStore::default();
        for (region_id, tree) in &snapshot.history {
            let region = machine
                .find_region(region_id)
                .ok_or_else(|| ExecutionError::UnknownRegion(region_id.clone()))?;
            if !machine.region(region).has_history() {
                return Err(CheckpointError::ValidationFailed(format!(
                    "region '{region_id}' keeps no history"
                ))
                .into());
            }
            let node = history_node(&machine, tree)?;
            history.record(region, node);
        }

        for status in self.status.values_mut() {
            status.cancel();
        }
        self.status.clear();
        self.active = restored;
        self.history = history;
        self.joins.clear_all();
        self.disabled.clear();
        self.deferred.clear();
        self.mailbox.clear();
        self.phase = match (snapshot.started, snapshot.terminated) {
            (_, true) => Phase::Terminated,
            (true, false) => Phase::Started,
            (false, false) => Phase::NotStarted,
        };

        for (state, activated_at) in &activations {
            self.serial += 1;
            self.status
                .insert(*state, StateStatus::new(self.serial, *activated_at));
        }
        if self.phase == Phase::Started {
            for (state, _) in activations {
                self.start_work(&machine, state);
            }
        }

        info!(
            machine = machine.id(),
            instance = %self.instance,
            snapshot = %snapshot.id,
            "resumed from snapshot"
        );
        Ok(())
    }
}

fn restore_level<C>(
    machine: &StateMachine<C>,
    active: &mut dyn ActiveStates,
    parent: Option<VertexId>,
    tree: &SnapshotTree,
    activations: &mut Vec<(VertexId, DateTime<Utc>)>,
) -> Result<(), ExecutionError> {
    for (id, node) in tree {
        let state = stateful(machine, id)?;
        let region = machine
            .vertex(state)
            .region()
            .ok_or_else(|| ExecutionError::UnknownState(id.clone()))?;
        if machine.region(region).owner_state() != parent {
            return Err(CheckpointError::ValidationFailed(format!(
                "state '{id}' is not a direct child of its snapshot parent"
            ))
            .into());
        }
        active.activate(state, region, parent)?;
        activations.push((state, node.activated_at.unwrap_or_else(Utc::now)));
        restore_level(machine, active, Some(state), &node.children, activations)?;
    }
    Ok(())
}

fn history_node<C>(
    machine: &StateMachine<C>,
    tree: &SnapshotTree,
) -> Result<ActiveNode, ExecutionError> {
    let mut roots = tree.iter();
    let (Some((id, node)), None) = (roots.next(), roots.next()) else {
        return Err(
            CheckpointError::ValidationFailed("history must have exactly one root".into()).into(),
        );
    };
    let state = stateful(machine, id)?;
    let children = node
        .children
        .iter()
        .map(|(child, grandchildren)| {
            history_node(
                machine,
                &BTreeMap::from([(child.clone(), grandchildren.clone())]),
            )
        })
        .collect::<Result<_, _>>()?;
    Ok(ActiveNode { state, children })
}

fn stateful<C>(machine: &StateMachine<C>, id: &str) -> Result<VertexId, ExecutionError> {
    machine
        .find_vertex(id)
        .filter(|vertex| machine.vertex(*vertex).is_stateful())
        .ok_or_else(|| ExecutionError::UnknownState(id.to_string()))
}
