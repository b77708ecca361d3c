//! Executor Registry & Contract (C3).
//!
//! `Executor` is the trait every node type implements; `ExecutorRegistry`
//! maps `node.kind` strings to a boxed trait object, write-once at
//! startup (§9 "the registry is the only process-wide state"). A node
//! type that implements [`Executor::get_output_handle`] participates in
//! the scheduler's branch-skip/loop-reset logic — that hook is the sole
//! mechanism by which branching is expressed to the scheduler.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::approval::ApprovalCoordinator;
use crate::context::AbortHandle;
use crate::error::{NodeError, SchedulerError, ValidationIssue};
use crate::events::AgentEvent;
use crate::graph::GraphIndex;
use crate::model::Node;
use crate::resolve::{ResolveScope, Resolver};

/// What an executor hands back on success. `structured_output`, when
/// present, is merged into `output`'s top-level object by the agent
/// runner (§4.8 step 6); kept separate here so callers that only want
/// the plain value don't have to unmerge it.
#[derive(Debug, Clone, Default)]
pub struct ExecutorOutput {
    pub output: Value,
    pub metadata: Option<Value>,
    pub structured_output: Option<Value>,
}

impl ExecutorOutput {
    pub fn value(output: Value) -> Self {
        Self { output, metadata: None, structured_output: None }
    }
}

/// Read-only façade over the execution context an executor is allowed
/// to see, plus a narrow, queued write path for variables (§5: context
/// mutation happens only from the scheduler's control loop — an
/// executor's variable writes are buffered here and applied by the
/// scheduler once the task returns, not in place).
pub struct ExecutorView<'a> {
    graph: &'a GraphIndex<'a>,
    node_outputs: &'a HashMap<String, Value>,
    variables: &'a HashMap<String, Value>,
    workflow_input: &'a Value,
    working_directory: PathBuf,
    abort: AbortHandle,
    emit_tx: UnboundedSender<AgentEvent>,
    queued_writes: Mutex<Vec<(String, Value)>>,
    execution_id: String,
    approvals: Arc<ApprovalCoordinator>,
}

impl<'a> ExecutorView<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: &'a GraphIndex<'a>,
        node_outputs: &'a HashMap<String, Value>,
        variables: &'a HashMap<String, Value>,
        workflow_input: &'a Value,
        working_directory: PathBuf,
        abort: AbortHandle,
        emit_tx: UnboundedSender<AgentEvent>,
        execution_id: impl Into<String>,
        approvals: Arc<ApprovalCoordinator>,
    ) -> Self {
        Self {
            graph,
            node_outputs,
            variables,
            workflow_input,
            working_directory,
            abort,
            emit_tx,
            queued_writes: Mutex::new(Vec::new()),
            execution_id: execution_id.into(),
            approvals,
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn approvals(&self) -> &Arc<ApprovalCoordinator> {
        &self.approvals
    }

    pub fn graph(&self) -> &'a GraphIndex<'a> {
        self.graph
    }

    pub fn workflow_input(&self) -> &Value {
        self.workflow_input
    }

    pub fn working_directory(&self) -> &std::path::Path {
        &self.working_directory
    }

    pub fn abort(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn emit(&self, event: AgentEvent) {
        let _ = self.emit_tx.send(event);
    }

    pub fn get_variable(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// Queue a variable write; applied by the scheduler after this
    /// node's task completes.
    pub fn set_variable(&self, key: impl Into<String>, value: Value) {
        self.queued_writes.lock().unwrap().push((key.into(), value));
    }

    pub fn take_variable_writes(&self) -> Vec<(String, Value)> {
        std::mem::take(&mut self.queued_writes.lock().unwrap())
    }

    fn resolve_scope(&self) -> ResolveScope<'_> {
        ResolveScope { graph: self.graph, node_outputs: self.node_outputs, variables: self.variables }
    }

    pub fn interpolate(&self, text: &str) -> String {
        Resolver::interpolate(&self.resolve_scope(), text)
    }

    pub fn resolve_reference(&self, raw_ref: &str) -> Result<Option<Value>, NodeError> {
        Resolver::resolve(&self.resolve_scope(), raw_ref).map_err(NodeError::from)
    }

    /// Outputs of every predecessor of `node_id`, keyed by predecessor
    /// *name* (merge/script executors build their `inputs` map this way).
    pub fn predecessor_outputs(&self, node_id: &str) -> HashMap<String, Value> {
        self.graph
            .predecessors(node_id)
            .iter()
            .filter_map(|pred_id| {
                let name = self.graph.node(pred_id)?.data.name.clone();
                let output = self.node_outputs.get(*pred_id)?.clone();
                Some((name, output))
            })
            .collect()
    }

    /// Outputs of every ancestor of `node_id`, keyed by name — used by
    /// script executors whose `inputs` selection defaults to "all
    /// ancestors" (§4.7).
    pub fn ancestor_outputs(&self, node_id: &str) -> HashMap<String, Value> {
        self.graph
            .ancestors(node_id)
            .into_iter()
            .filter_map(|anc_id| {
                let name = self.graph.node(&anc_id)?.data.name.clone();
                let output = self.node_outputs.get(&anc_id)?.clone();
                Some((name, output))
            })
            .collect()
    }

    /// True if any direct successor of `node_id` is a `condition` or
    /// `merge` node — agent executors switch to JSON output mode in
    /// that case (§4.3).
    pub fn successor_requires_json(&self, node_id: &str) -> bool {
        self.graph.successors(node_id).iter().any(|succ_id| {
            self.graph
                .node(succ_id)
                .map(|n| n.kind == crate::model::node_kind::CONDITION || n.kind == crate::model::node_kind::MERGE)
                .unwrap_or(false)
        })
    }
}

/// The node-type handler contract (§4.3).
#[async_trait]
pub trait Executor: Send + Sync {
    /// Optional pre-execution validation; `None` means the node config
    /// is acceptable.
    fn validate(&self, _node: &Node) -> Option<ValidationIssue> {
        None
    }

    async fn execute(&self, node: &Node, view: &ExecutorView<'_>) -> Result<ExecutorOutput, NodeError>;

    /// For branching node types: which outgoing `sourceHandle` is
    /// "active" given this result. Returning `Some(handle)` opts the
    /// node type into the scheduler's skip/loop-reset logic (§4.4).
    fn get_output_handle(&self, _node: &Node, _result: &ExecutorOutput) -> Option<String> {
        None
    }
}

/// Process-wide `type -> executor` map, write-once at startup.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registering the same type twice is an error (§4.3).
    pub fn register(&mut self, node_type: impl Into<String>, executor: Arc<dyn Executor>) -> Result<(), SchedulerError> {
        let node_type = node_type.into();
        if self.executors.contains_key(&node_type) {
            return Err(SchedulerError::DuplicateExecutorRegistration(node_type));
        }
        self.executors.insert(node_type, executor);
        Ok(())
    }

    /// Unknown type is a non-recoverable execution error (§4.3).
    pub fn get(&self, node_type: &str) -> Result<Arc<dyn Executor>, SchedulerError> {
        self.executors
            .get(node_type)
            .cloned()
            .ok_or_else(|| SchedulerError::MissingExecutor(node_type.to_string()))
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.executors.contains_key(node_type)
    }
}
