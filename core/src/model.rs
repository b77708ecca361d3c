//! Core data model: workflows, nodes, edges, and per-execution node state.
//!
//! The workflow graph itself is immutable for the lifetime of one
//! execution — mutation happens only through external storage between
//! runs (out of scope here, per §1). Everything in this module is plain
//! data; graph *queries* (predecessors, ancestors, ...) live in
//! [`crate::graph`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque workflow identifier.
pub type WorkflowId = String;
/// Opaque node identifier, unique within a workflow.
pub type NodeId = String;
/// Opaque edge identifier.
pub type EdgeId = String;

/// An immutable workflow definition: identity, node list, and edge list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub working_directory: Option<String>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// One step in a workflow. `kind` dispatches to an [`crate::executor::Executor`]
/// in the registry; `position` is an opaque layout payload the engine
/// never reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub position: Option<Value>,
    pub data: NodeData,
}

/// Per-node configuration. `name` is the human-facing, workflow-unique
/// handle used in `{{Name.path}}` references; `config` carries
/// type-specific settings as a raw JSON value so unknown node types
/// still round-trip through the journal and checkpoint losslessly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    pub name: String,
    #[serde(default)]
    pub config: Value,
}

/// A directed connection between two nodes. `source_handle` carries the
/// branch label for nodes that fan out (`condition` produces
/// `"true"`/`"false"`, `approval` produces `"approval"`/`"rejection"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub target_handle: Option<String>,
    #[serde(default)]
    pub edge_type: Option<String>,
}

/// The fixed node-type tags the engine understands for branch-skip
/// purposes. Unknown types are still dispatched through the registry —
/// this enum exists only so built-in executors can be referred to by a
/// stable name instead of a string literal scattered through the code.
pub mod node_kind {
    pub const INPUT: &str = "input";
    pub const OUTPUT: &str = "output";
    pub const CONDITION: &str = "condition";
    pub const MERGE: &str = "merge";
    pub const SCRIPT: &str = "script";
    pub const SHELL: &str = "shell";
    pub const APPROVAL: &str = "approval";
    pub const REFLECTION: &str = "reflection";
}

/// Lifecycle status of one node within one execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum NodeStatus {
    Pending,
    Running,
    Complete,
    Error,
    Skipped,
    Waiting,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Skipped)
    }
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Per-execution state of one node: status plus whatever it produced.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeState {
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Execution-level status, distinct from per-node [`NodeStatus`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStatus {
    Running,
    Complete,
    Error,
    Interrupted,
}

/// Metadata recorded when an execution is itself a replay of another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayMetadata {
    pub source_execution_id: String,
    pub from_node_id: NodeId,
}

/// A single node's contribution to the rolled-up [`ExecutionSummary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSummary {
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The incrementally-folded view of "what happened" in one execution,
/// rebuilt by replaying [`crate::events::ExecutionEvent`]s (see
/// [`crate::journal::EventJournal::summary`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub execution_id: String,
    pub workflow_id: WorkflowId,
    pub input: Value,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay: Option<ReplayMetadata>,
    pub nodes: HashMap<NodeId, NodeSummary>,
}
