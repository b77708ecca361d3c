//! Error types for graph construction, reference resolution, and
//! execution — see spec §7 for the policy these enums encode:
//! validation errors abort the run before it starts, per-node runtime
//! errors are recovered locally (siblings keep running), and fatal
//! errors abort the run without recovery.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural errors raised while building a [`crate::graph::GraphIndex`]
/// from a [`crate::model::Workflow`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(String),

    #[error("duplicate node name '{0}'")]
    DuplicateNodeName(String),

    #[error("edge '{0}' references unknown node '{1}'")]
    UnknownEdgeEndpoint(String, String),

    #[error("workflow must contain at least one '{0}' node")]
    MissingRequiredNode(String),
}

/// Errors raised by the reference resolver (C2) while parsing or
/// evaluating a `{{Name.path}}` expression. Missing leaves are *not*
/// represented here — per §4.2 they resolve to `undefined`, not an
/// error; only malformed input reaches this type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    #[error("invalid reference syntax: {0}")]
    InvalidSyntax(String),

    #[error("invalid regular expression: {0}")]
    BadPattern(String),
}

/// A single item in a `validation-error` event (§6): a stable code, a
/// human-readable message, and the offending node when known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl ValidationIssue {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into(), node_id: None }
    }

    pub fn on_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }
}

/// A per-node runtime failure, as reported by an [`crate::executor::Executor`].
/// Recoverable: the scheduler records it on the node and propagates it to
/// pending descendants, but does not abort sibling branches.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("{0}")]
    Message(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("missing required input: {0}")]
    MissingInput(String),

    #[error("reference resolution failed: {0}")]
    Reference(#[from] ResolverError),

    #[error("approval cancelled")]
    ApprovalCancelled,

    #[error("propagated from upstream failure: {0}")]
    Propagated(String),
}

impl NodeError {
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

/// Top-level scheduler error. Validation and fatal variants abort the
/// run (`execution-error`); [`SchedulerError::NodeFailed`] exists only
/// as a conversion target for contexts that must surface a single node
/// failure as a hard stop (e.g. `onMaxRetries: fail`) — the normal path
/// for a node error is local recovery, recorded on the node, not this
/// variant.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("validation failed: {0:?}")]
    Validation(Vec<ValidationIssue>),

    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    #[error("executor for node type '{0}' registered twice")]
    DuplicateExecutorRegistration(String),

    #[error("no executor registered for node type '{0}'")]
    MissingExecutor(String),

    #[error("cycle or unsatisfied dependencies: nodes {0:?} never became ready")]
    CycleOrUnsatisfiedDependencies(Vec<String>),

    #[error("execution interrupted")]
    Interrupted,

    #[error("node '{node}' failed: {source}")]
    NodeFailed { node: String, source: NodeError },

    #[error("invalid node configuration for '{node}': {message}")]
    InvalidConfig { node: String, message: String },
}

/// Crate-wide result alias, defaulting to [`SchedulerError`] since most
/// public entry points are scheduler operations.
pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;
