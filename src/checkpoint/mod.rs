//! Snapshots of an executor's active configuration.
//!
//! A snapshot records which states are active (as a tree keyed by state
//! id), what every history-owning region last saved, and whether the
//! machine was started or terminated. Behaviors are not serializable and
//! are never part of a snapshot; the application context may be attached
//! separately as JSON.
//!
//! Snapshots survive both JSON and binary encoding, so long-running
//! machines can outlive the process that started them.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub mod error;

pub use error::CheckpointError;

/// Version identifier for the snapshot format
pub const SNAPSHOT_VERSION: u32 = 1;

/// Active states below one parent, keyed by state id.
pub type SnapshotTree = BTreeMap<String, SnapshotNode>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    /// When the state was entered. Absent in saved history.
    pub activated_at: Option<DateTime<Utc>>,
    pub children: SnapshotTree,
}

/// Serializable picture of an executor at one point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot format version
    pub version: u32,

    /// Unique snapshot identifier
    pub id: Uuid,

    /// Id of the machine the executor runs
    pub machine_id: String,

    pub taken_at: DateTime<Utc>,

    pub started: bool,

    pub terminated: bool,

    /// Active configuration, top regions' states at the root
    pub active: SnapshotTree,

    /// Saved configuration per history-owning region id; each tree has
    /// exactly one root
    pub history: BTreeMap<String, SnapshotTree>,

    /// Application context encoded as JSON, if attached
    pub context: Option<String>,
}

impl Snapshot {
    pub fn new(machine_id: impl Into<String>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            id: Uuid::new_v4(),
            machine_id: machine_id.into(),
            taken_at: Utc::now(),
            started: false,
            terminated: false,
            active: SnapshotTree::new(),
            history: BTreeMap::new(),
            context: None,
        }
    }

    /// Attach the application context.
    pub fn with_context<T: Serialize>(mut self, context: &T) -> Result<Self, CheckpointError> {
        let encoded = serde_json::to_string(context)
            .map_err(|e| CheckpointError::SerializationFailed(e.to_string()))?;
        self.context = Some(encoded);
        Ok(self)
    }

    /// Decode the attached context, if any.
    pub fn context<T: DeserializeOwned>(&self) -> Result<Option<T>, CheckpointError> {
        self.context
            .as_deref()
            .map(|encoded| {
                serde_json::from_str(encoded)
                    .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))
            })
            .transpose()
    }

    /// Active state ids, parents before children.
    pub fn active_ids(&self) -> Vec<String> {
        fn walk(tree: &SnapshotTree, out: &mut Vec<String>) {
            for (id, node) in tree {
                out.push(id.clone());
                walk(&node.children, out);
            }
        }
        let mut ids = Vec::new();
        walk(&self.active, &mut ids);
        ids
    }

    /// Same active configuration and history, ignoring ids and timestamps.
    pub fn same_configuration(&self, other: &Snapshot) -> bool {
        fn shape(tree: &SnapshotTree) -> Vec<(String, Vec<String>)> {
            tree.iter()
                .map(|(id, node)| (id.clone(), node.children.keys().cloned().collect()))
                .chain(tree.values().flat_map(|node| shape(&node.children)))
                .collect()
        }
        self.machine_id == other.machine_id
            && self.started == other.started
            && self.terminated == other.terminated
            && shape(&self.active) == shape(&other.active)
            && self.history.len() == other.history.len()
            && self
                .history
                .iter()
                .zip(&other.history)
                .all(|((a, ta), (b, tb))| a == b && shape(ta) == shape(tb))
    }

    /// Check the version and that the snapshot was taken from `machine_id`.
    pub fn validate(&self, machine_id: &str) -> Result<(), CheckpointError> {
        self.check_version()?;
        if self.machine_id != machine_id {
            return Err(CheckpointError::MachineMismatch {
                found: self.machine_id.clone(),
                expected: machine_id.to_string(),
            });
        }
        if self.terminated && !self.started {
            return Err(CheckpointError::ValidationFailed(
                "terminated but never started".to_string(),
            ));
        }
        if let Some((region, tree)) = self.history.iter().find(|(_, tree)| tree.len() != 1) {
            return Err(CheckpointError::ValidationFailed(format!(
                "history of region '{region}' has {} roots",
                tree.len()
            )));
        }
        Ok(())
    }

    fn check_version(&self) -> Result<(), CheckpointError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        let snapshot: Snapshot = serde_json::from_str(json)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    pub fn to_binary(&self) -> Result<Vec<u8>, CheckpointError> {
        bincode::serialize(self).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn from_binary(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let snapshot: Snapshot = bincode::deserialize(bytes)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        snapshot.check_version()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        let mut snapshot = Snapshot::new("door");
        snapshot.started = true;
        snapshot.active.insert(
            "open".to_string(),
            SnapshotNode {
                activated_at: Some(Utc::now()),
                children: [("ajar".to_string(), SnapshotNode::default())]
                    .into_iter()
                    .collect(),
            },
        );
        snapshot.history.insert(
            "main".to_string(),
            [("closed".to_string(), SnapshotNode::default())]
                .into_iter()
                .collect(),
        );
        snapshot
    }

    #[test]
    fn json_and_binary_preserve_everything() {
        let snapshot = sample().with_context(&vec![1, 2, 3]).unwrap();

        let json = Snapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        let binary = Snapshot::from_binary(&snapshot.to_binary().unwrap()).unwrap();

        assert_eq!(json, snapshot);
        assert_eq!(binary, snapshot);
        assert_eq!(binary.context::<Vec<i32>>().unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut snapshot = sample();
        snapshot.version = 99;
        let json = serde_json::to_string(&snapshot).unwrap();

        let error = Snapshot::from_json(&json).unwrap_err();
        assert!(matches!(
            error,
            CheckpointError::UnsupportedVersion { found: 99, .. }
        ));
    }

    #[test]
    fn validate_checks_machine_id() {
        let snapshot = sample();
        assert!(snapshot.validate("door").is_ok());
        assert!(matches!(
            snapshot.validate("window"),
            Err(CheckpointError::MachineMismatch { .. })
        ));
    }

    #[test]
    fn configuration_ignores_timestamps() {
        let a = sample();
        let mut b = sample();
        b.taken_at = Utc::now() + chrono::Duration::hours(1);
        assert!(a.same_configuration(&b));
        assert_eq!(a.active_ids(), vec!["open", "ajar"]);

        b.active.clear();
        assert!(!a.same_configuration(&b));
    }
}
