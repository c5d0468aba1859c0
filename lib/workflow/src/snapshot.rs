//! The run snapshot.
//!
//! A snapshot is the complete observable state of one run. It is created
//! once per run with every node `idle`, and replaced wholesale on each
//! mutation by the state manager; readers hold an `Arc` to an immutable
//! version and never see a half-applied change.

use crate::node::NodeId;
use crate::status::{NodeStatus, WorkflowStatus};
use canvasflow_core::WorkflowRunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Observable state of a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// The run this snapshot belongs to.
    pub run_id: WorkflowRunId,
    /// Incremented on every mutation.
    pub revision: u64,
    pub workflow_status: WorkflowStatus,
    /// One entry per node, always.
    pub node_status: BTreeMap<NodeId, NodeStatus>,
    /// Last output per node; absent until the node's handler writes one.
    pub node_outputs: BTreeMap<NodeId, JsonValue>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Free-form run metadata.
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
}

impl Snapshot {
    /// Creates a pending snapshot with every node `idle`.
    #[must_use]
    pub fn new(run_id: WorkflowRunId, node_ids: impl IntoIterator<Item = NodeId>) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            revision: 0,
            workflow_status: WorkflowStatus::Pending,
            node_status: node_ids
                .into_iter()
                .map(|id| (id, NodeStatus::Idle))
                .collect(),
            node_outputs: BTreeMap::new(),
            started_at: now,
            updated_at: now,
            metadata: Map::new(),
        }
    }

    /// Current status of a node.
    #[must_use]
    pub fn status_of(&self, node_id: &str) -> Option<NodeStatus> {
        self.node_status.get(node_id).copied()
    }

    /// Last output written by a node.
    #[must_use]
    pub fn output_of(&self, node_id: &str) -> Option<&JsonValue> {
        self.node_outputs.get(node_id)
    }

    /// Returns true once every node is in a terminal status.
    #[must_use]
    pub fn all_nodes_terminal(&self) -> bool {
        self.node_status.values().all(|status| status.is_terminal())
    }

    /// Applies a partial update.
    pub(crate) fn apply(&mut self, patch: SnapshotPatch) {
        self.metadata.extend(patch.metadata);
    }

    /// Records a mutation.
    pub(crate) fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Utc::now();
    }
}

/// Partial snapshot update for [`checkpoint`](crate::state::ExecutionStateManager::checkpoint).
///
/// Only metadata is open to checkpoints; statuses and outputs have their own
/// validated paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotPatch {
    pub metadata: Map<String, JsonValue>,
}

impl SnapshotPatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces one metadata key.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }
}
