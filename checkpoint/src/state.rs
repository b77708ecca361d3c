//! Checkpoint and workflow-snapshot data structures.
//!
//! A [`CheckpointState`] is a frozen capture of one execution's node
//! states, node outputs, and variables at a single instant. It is opaque
//! once persisted: the scheduler only ever reads a checkpoint back in to
//! seed a fresh run (see `flowmesh_core::scheduler::Scheduler::execute_from_checkpoint`).
//!
//! A [`WorkflowSnapshot`] is a separate, lighter capture — just the nodes
//! and edges of a workflow at the moment an execution started — used
//! exclusively by the replay planner to detect drift between the workflow
//! that produced a checkpoint and the workflow as it exists now.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-node state captured in a checkpoint. Mirrors the subset of
/// `NodeState` that is meaningful to persist — timestamps are not
/// replayed, only status and error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointNodeState {
    pub status: CheckpointNodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Status enum mirrored from the scheduler's `NodeStatus` so this crate
/// does not need to depend on `flowmesh-core` (the dependency runs the
/// other way: core depends on checkpoint).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointNodeStatus {
    Pending,
    Running,
    Complete,
    Error,
    Skipped,
    Waiting,
}

impl CheckpointNodeStatus {
    /// A node whose checkpointed status is one of these may have its
    /// output reused by a downstream replay without re-execution.
    pub fn is_reusable(self) -> bool {
        matches!(self, Self::Complete | Self::Skipped)
    }
}

/// A frozen snapshot of one execution's full state, suitable for
/// persistence and later replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointState {
    pub timestamp: DateTime<Utc>,
    pub node_states: HashMap<String, CheckpointNodeState>,
    pub node_outputs: HashMap<String, Value>,
    pub variables: HashMap<String, Value>,
}

impl CheckpointState {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            node_states: HashMap::new(),
            node_outputs: HashMap::new(),
            variables: HashMap::new(),
        }
    }

    /// Remove variable keys that belong to a node being re-executed on
    /// replay (`node.{id}.*` and `agent.session.{id}.*`), per the
    /// scheduler's replay-seeding contract.
    pub fn strip_variables_for_replay_nodes<'a>(&mut self, replay_node_ids: impl Iterator<Item = &'a str>) {
        let ids: Vec<&str> = replay_node_ids.collect();
        self.variables.retain(|key, _| {
            !ids.iter().any(|id| {
                key == &format!("node.{id}") || key.starts_with(&format!("node.{id}."))
                    || key == &format!("agent.session.{id}") || key.starts_with(&format!("agent.session.{id}."))
            })
        });
    }
}

impl Default for CheckpointState {
    fn default() -> Self {
        Self::new()
    }
}

/// A structural snapshot of a workflow's nodes and edges, captured at
/// execution start and diffed against the live workflow by the replay
/// planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub workflow_id: String,
    pub timestamp: DateTime<Utc>,
    pub nodes: Vec<SnapshotNode>,
    pub edges: Vec<SnapshotEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotNode {
    pub id: String,
    pub node_type: String,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SnapshotEdge {
    pub source: String,
    pub source_handle: Option<String>,
    pub target: String,
    pub target_handle: Option<String>,
    pub edge_type: Option<String>,
}
