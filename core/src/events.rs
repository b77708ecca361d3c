//! External event sum types (§6): the execution-event stream the
//! journal emits and persists, the control-event stream a boundary
//! collaborator feeds in, plus the smaller types they carry
//! (`AgentEvent`, `ApprovalRequest`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationIssue;
use crate::model::NodeId;

/// A streamed sub-event from an agent/script/shell executor, forwarded
/// upward as a `node-output` event and also folded by the shared agent
/// runner into the node's final transcript (§4.8, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AgentEvent {
    TextDelta { text: String },
    Thinking { text: String },
    ToolCall { name: String, input: Value },
    ToolResult { name: String, output: Value },
    TodoList { items: Vec<String> },
    RunStart { attempt: u32 },
    Complete { result: Value },
    Error { message: String },
}

/// Payload of a `node-waiting` event for an approval-type node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub execution_id: String,
    pub node_id: NodeId,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// An external caller's response to an [`ApprovalRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub responded_at: DateTime<Utc>,
}

/// One entry in a self-reflect evolution history (§4.9); summarized at
/// contract level only — the applier's concrete logic lives outside the
/// core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionRecord {
    pub node_id: NodeId,
    pub description: String,
    pub applied_at: DateTime<Utc>,
    pub workflow_diff: Value,
}

/// The execution-event sum type the scheduler emits through the journal
/// (§6). Tagged for JSONL/WebSocket transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExecutionEvent {
    ExecutionStart { execution_id: String, workflow_id: String },
    NodeStart { node_id: NodeId, node_name: String },
    NodeOutput { node_id: NodeId, event: AgentEvent },
    NodeComplete { node_id: NodeId, result: Value },
    NodeError { node_id: NodeId, error: String },
    NodeSkipped { node_id: NodeId, node_name: String },
    NodeWaiting { node_id: NodeId, node_name: String, approval: ApprovalRequest },
    NodeEvolution { node_id: NodeId, record: EvolutionRecord },
    ExecutionComplete { result: Value },
    ExecutionError { error: String },
    ValidationError { errors: Vec<ValidationIssue> },
}

/// The control-event sum type a boundary collaborator feeds inward
/// (§6). The core only defines the shape; routing inbound events to the
/// right scheduler instance is a boundary concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlEvent {
    StartExecution { workflow_id: String, input: Value },
    SubscribeExecution { execution_id: String, after_timestamp: Option<DateTime<Utc>> },
    Interrupt { execution_id: String },
    ReplayExecution {
        workflow_id: String,
        source_execution_id: String,
        from_node_id: NodeId,
        #[serde(default)]
        use_original_input: bool,
        #[serde(default)]
        input: Option<Value>,
    },
    SubmitApproval { execution_id: String, node_id: NodeId, response: ApprovalResponse },
}
