//! Execution Context (C4) — per-run identity, working directory,
//! node-output map, variable map, and cooperative cancellation.
//!
//! Owned by exactly one [`crate::scheduler::Scheduler`] instance and
//! mutated only from its single logical control loop (§5); executors
//! see it only through [`crate::executor::ExecutorView`], a read-plus-
//! narrow-write façade.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::model::{NodeId, WorkflowId};

/// Per-execution mutable state. Reads happen from many concurrent node
/// tasks; writes happen exclusively from the scheduler's control loop
/// between task completions (§5's single-writer discipline).
pub struct ExecutionContext {
    pub workflow_id: WorkflowId,
    pub execution_id: String,
    pub working_directory: PathBuf,
    pub node_outputs: HashMap<NodeId, Value>,
    pub variables: HashMap<String, Value>,
    /// Flipped once by [`ExecutionContext::interrupt`]; checked at every
    /// ready-set loop iteration boundary and by every per-node token.
    abort: CancellationToken,
    /// Per-node cancellation tokens, children of `abort`, so a single
    /// node can also be cancelled independently (approval rejection,
    /// per-node timeout) without tearing down the whole run.
    node_tokens: HashMap<NodeId, CancellationToken>,
}

impl ExecutionContext {
    pub fn new(workflow_id: WorkflowId, working_directory: impl Into<PathBuf>) -> Self {
        Self::with_abort(workflow_id, working_directory, CancellationToken::new())
    }

    /// Build a context whose abort token is shared with an external
    /// signal (e.g. a [`crate::scheduler::ExecutionHandle`]'s token), so
    /// cancelling that external handle also cancels every per-node child
    /// token this context mints.
    pub fn with_abort(workflow_id: WorkflowId, working_directory: impl Into<PathBuf>, abort: CancellationToken) -> Self {
        Self {
            workflow_id,
            execution_id: Uuid::new_v4().to_string(),
            working_directory: working_directory.into(),
            node_outputs: HashMap::new(),
            variables: HashMap::new(),
            abort,
            node_tokens: HashMap::new(),
        }
    }

    /// Reuse an existing execution id — used when seeding a replay run,
    /// which is a *new* execution but one the caller wants to reference
    /// by a pre-minted id (e.g. one already written into a persisted
    /// summary record by the boundary collaborator).
    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = execution_id.into();
        self
    }

    /// Resolve a node-level working-directory override against the
    /// execution's base directory (§4.3's "working-directory resolution"
    /// contract for the executor context).
    pub fn resolve_working_directory(&self, override_dir: Option<&str>) -> PathBuf {
        match override_dir {
            Some(dir) if Path::new(dir).is_absolute() => PathBuf::from(dir),
            Some(dir) => self.working_directory.join(dir),
            None => self.working_directory.clone(),
        }
    }

    /// Register (or fetch) the per-node cancellation token for `node_id`,
    /// a child of the execution-wide abort token so a global interrupt
    /// reaches every in-flight node.
    pub fn node_token(&mut self, node_id: &str) -> CancellationToken {
        self.node_tokens
            .entry(node_id.to_string())
            .or_insert_with(|| self.abort.child_token())
            .clone()
    }

    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// One-shot global cancellation: flips the shared flag and cancels
    /// every registered per-node token (§5 "Cancellation").
    pub fn interrupt(&self) {
        self.abort.cancel();
    }

    pub fn get_variable(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: Value) {
        self.variables.insert(key.into(), value);
    }
}

/// A cheaply-clonable handle executors receive; it exposes the shared
/// cancellation signal without granting direct access to the output/
/// variable maps the control loop owns exclusively.
#[derive(Clone)]
pub struct AbortHandle(pub Arc<CancellationToken>);

impl AbortHandle {
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.0.cancelled().await
    }
}
