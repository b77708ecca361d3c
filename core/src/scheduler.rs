//! Scheduler (C5) — the heart of the core: ready-set computation,
//! parallel dispatch, branch skip/reset, loop reset, error propagation,
//! cancellation, and the replay entry point.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc::unbounded_channel;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use flowmesh_checkpoint::state::{CheckpointNodeStatus, CheckpointState};

use crate::approval::ApprovalCoordinator;
use crate::config::{JournalConfig, SchedulerConfig};
use crate::context::{AbortHandle, ExecutionContext};
use crate::error::{GraphError, NodeError, SchedulerError, ValidationIssue};
use crate::events::{AgentEvent, ApprovalRequest, ExecutionEvent};
use crate::executor::{ExecutorOutput, ExecutorRegistry, ExecutorView};
use crate::graph::GraphIndex;
use crate::journal::{EventJournal, SharedJournal};
use crate::model::{node_kind, Edge, Node, NodeId, NodeState, NodeStatus, Workflow, WorkflowId};
use crate::subscribe::SubscriptionHub;

/// Handle a caller keeps to observe and control one in-flight execution —
/// minted synchronously by [`Scheduler::begin_execution`] so a caller can
/// subscribe or interrupt before the execution future has ever been
/// polled.
pub struct ExecutionHandle {
    pub execution_id: String,
    pub workflow_id: WorkflowId,
    pub journal: SharedJournal,
    pub hub: Arc<SubscriptionHub>,
    abort: CancellationToken,
}

impl ExecutionHandle {
    pub fn interrupt(&self) {
        self.abort.cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Shares the same underlying token — cancelling either side cancels
    /// both. Used to seed the run's [`ExecutionContext`] so a `Scheduler::interrupt`
    /// call reaches every in-flight node's per-node child token.
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }
}

/// Inputs unique to a replay run (§4.4 "Replay entry point"); the plan
/// itself (which ids go in each set) is computed by
/// [`crate::replay::ReplayPlanner`], not here.
pub struct ReplaySeed {
    pub checkpoint: CheckpointState,
    pub replay_node_ids: HashSet<NodeId>,
    pub inactive_node_ids: HashSet<NodeId>,
}

pub struct Scheduler {
    registry: Arc<ExecutorRegistry>,
    approvals: Arc<ApprovalCoordinator>,
    config: SchedulerConfig,
    executions: Mutex<HashMap<String, Arc<ExecutionHandle>>>,
}

impl Scheduler {
    pub fn new(registry: Arc<ExecutorRegistry>, approvals: Arc<ApprovalCoordinator>, config: SchedulerConfig) -> Self {
        Self { registry, approvals, config, executions: Mutex::new(HashMap::new()) }
    }

    /// Mint and register an [`ExecutionHandle`] without starting the run.
    /// Call this first, keep the handle, then call [`Scheduler::run_registered`]
    /// (or just [`Scheduler::execute`], which does both).
    pub fn begin_execution(&self, workflow_id: WorkflowId, input: &Value, journal_config: &JournalConfig) -> Arc<ExecutionHandle> {
        let execution_id = Uuid::new_v4().to_string();
        let journal: SharedJournal = Arc::new(match &journal_config.root_dir {
            Some(root) => EventJournal::with_file_root(root.clone(), execution_id.clone(), workflow_id.clone(), input.clone()),
            None => EventJournal::in_memory(execution_id.clone(), workflow_id.clone(), input.clone()),
        });
        let hub = Arc::new(SubscriptionHub::new(journal.clone()));
        let handle = Arc::new(ExecutionHandle {
            execution_id: execution_id.clone(),
            workflow_id,
            journal,
            hub,
            abort: CancellationToken::new(),
        });
        self.executions.lock().unwrap().insert(execution_id, handle.clone());
        handle
    }

    pub fn handle(&self, execution_id: &str) -> Option<Arc<ExecutionHandle>> {
        self.executions.lock().unwrap().get(execution_id).cloned()
    }

    /// `interrupt{executionId}` control event (§6): cancels the execution's
    /// abort token and every pending approval registered for it.
    pub fn interrupt(&self, execution_id: &str) -> bool {
        self.approvals.cancel_execution(execution_id);
        match self.executions.lock().unwrap().get(execution_id) {
            Some(handle) => {
                handle.interrupt();
                true
            }
            None => false,
        }
    }

    pub async fn execute(
        &self,
        workflow: Arc<Workflow>,
        working_directory: impl Into<PathBuf>,
        input: Value,
        journal_config: &JournalConfig,
    ) -> Result<Value, SchedulerError> {
        let handle = self.begin_execution(workflow.id.clone(), &input, journal_config);
        let result = self.run_registered(workflow, working_directory.into(), input, handle.clone(), None).await;
        self.executions.lock().unwrap().remove(&handle.execution_id);
        result
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn execute_from_checkpoint(
        &self,
        workflow: Arc<Workflow>,
        working_directory: impl Into<PathBuf>,
        input: Value,
        checkpoint: CheckpointState,
        replay_node_ids: HashSet<NodeId>,
        inactive_node_ids: HashSet<NodeId>,
        journal_config: &JournalConfig,
    ) -> Result<Value, SchedulerError> {
        let handle = self.begin_execution(workflow.id.clone(), &input, journal_config);
        let seed = ReplaySeed { checkpoint, replay_node_ids, inactive_node_ids };
        let result = self.run_registered(workflow, working_directory.into(), input, handle.clone(), Some(seed)).await;
        self.executions.lock().unwrap().remove(&handle.execution_id);
        result
    }

    /// Run against an already-registered handle — split out from
    /// [`Scheduler::execute`] so callers that minted the handle themselves
    /// (to subscribe before the run starts) can drive the same path.
    #[instrument(skip_all, fields(execution_id = %handle.execution_id, workflow_id = %workflow.id))]
    pub async fn run_registered(
        &self,
        workflow: Arc<Workflow>,
        working_directory: PathBuf,
        input: Value,
        handle: Arc<ExecutionHandle>,
        replay: Option<ReplaySeed>,
    ) -> Result<Value, SchedulerError> {
        let graph = GraphIndex::build(&workflow)?;
        validate_required_nodes(&graph)?;

        if let Some(issues) = self.validate_nodes(&graph) {
            let record = handle.journal.append(ExecutionEvent::ValidationError { errors: issues.clone() }).await;
            handle.hub.publish(record).await;
            return Err(SchedulerError::Validation(issues));
        }

        let back_edges = compute_back_edges(&graph);
        let mut node_states: HashMap<NodeId, NodeState> =
            workflow.nodes.iter().map(|n| (n.id.clone(), NodeState::default())).collect();
        let mut context = ExecutionContext::with_abort(workflow.id.clone(), working_directory, handle.abort_token())
            .with_execution_id(handle.execution_id.clone());

        let start = handle.journal.append(ExecutionEvent::ExecutionStart {
            execution_id: handle.execution_id.clone(),
            workflow_id: handle.workflow_id.clone(),
        }).await;
        handle.hub.publish(start).await;

        let mut preseed: Vec<(NodeId, String, Value)> = Vec::new();
        let mut synthetic: Vec<(NodeId, String, Value)> = Vec::new();

        match &replay {
            None => {
                for node in &workflow.nodes {
                    if node.kind == node_kind::INPUT {
                        let state = node_states.get_mut(&node.id).unwrap();
                        state.status = NodeStatus::Complete;
                        state.output = Some(input.clone());
                        state.started_at = Some(Utc::now());
                        state.completed_at = Some(Utc::now());
                        context.node_outputs.insert(node.id.clone(), input.clone());
                        preseed.push((node.id.clone(), node.data.name.clone(), input.clone()));
                    }
                }
            }
            Some(seed) => {
                synthetic = seed_replay(&graph, &mut node_states, &mut context, seed);
                for node in &workflow.nodes {
                    if seed.replay_node_ids.contains(&node.id) && node.kind == node_kind::INPUT {
                        let state = node_states.get_mut(&node.id).unwrap();
                        state.status = NodeStatus::Complete;
                        state.output = Some(input.clone());
                        state.started_at = Some(Utc::now());
                        state.completed_at = Some(Utc::now());
                        context.node_outputs.insert(node.id.clone(), input.clone());
                        preseed.push((node.id.clone(), node.data.name.clone(), input.clone()));
                    }
                }
            }
        }

        for (id, name, output) in preseed.into_iter().chain(synthetic.into_iter()) {
            let s = handle.journal.append(ExecutionEvent::NodeStart { node_id: id.clone(), node_name: name }).await;
            handle.hub.publish(s).await;
            let c = handle.journal.append(ExecutionEvent::NodeComplete { node_id: id, result: output }).await;
            handle.hub.publish(c).await;
        }

        let result = self
            .drive_loop(&graph, &back_edges, &mut node_states, &mut context, &input, &handle)
            .await;

        match &result {
            Ok(value) => {
                let record = handle.journal.append(ExecutionEvent::ExecutionComplete { result: value.clone() }).await;
                handle.hub.publish(record).await;
            }
            Err(err) => {
                let record = handle.journal.append(ExecutionEvent::ExecutionError { error: err.to_string() }).await;
                handle.hub.publish(record).await;
            }
        }

        result
    }

    fn validate_nodes(&self, graph: &GraphIndex<'_>) -> Option<Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        for node in &graph.workflow().nodes {
            match self.registry.get(&node.kind) {
                Ok(executor) => {
                    if let Some(issue) = executor.validate(node) {
                        issues.push(issue);
                    }
                }
                Err(_) => issues.push(ValidationIssue::new("unknown-node-type", format!("no executor registered for type '{}'", node.kind)).on_node(node.id.clone())),
            }
        }
        if issues.is_empty() {
            None
        } else {
            Some(issues)
        }
    }

    async fn drive_loop(
        &self,
        graph: &GraphIndex<'_>,
        back_edges: &HashSet<String>,
        node_states: &mut HashMap<NodeId, NodeState>,
        context: &mut ExecutionContext,
        input: &Value,
        handle: &Arc<ExecutionHandle>,
    ) -> Result<Value, SchedulerError> {
        // Nodes in flight as independent tasks, across however many loop
        // ticks it takes for each to settle — a slow/waiting node
        // dispatched alongside a fast one must never hold the fast one's
        // completion (and its downstream readiness) hostage (§5).
        let mut in_flight: FuturesUnordered<_> = FuturesUnordered::new();

        loop {
            if handle.is_interrupted() {
                return Err(SchedulerError::Interrupted);
            }

            let ready = compute_ready_set(graph, back_edges, node_states);
            if ready.is_empty() && in_flight.is_empty() {
                if node_states.values().all(|s| s.status.is_terminal()) {
                    break;
                }
                let stuck: Vec<String> = node_states
                    .iter()
                    .filter(|(_, s)| s.status == NodeStatus::Pending)
                    .map(|(id, _)| id.clone())
                    .collect();
                return Err(SchedulerError::CycleOrUnsatisfiedDependencies(stuck));
            }

            if !ready.is_empty() {
                debug!(ready = ?ready, "dispatching ready set");

                let mut abort_handles = HashMap::new();
                for id in &ready {
                    let state = node_states.get_mut(id).unwrap();
                    state.status = NodeStatus::Running;
                    state.started_at = Some(Utc::now());
                    abort_handles.insert(id.clone(), AbortHandle(Arc::new(context.node_token(id))));
                }
                for id in &ready {
                    let node = graph.node(id).unwrap();
                    let record = handle.journal.append(ExecutionEvent::NodeStart { node_id: id.clone(), node_name: node.data.name.clone() }).await;
                    handle.hub.publish(record).await;

                    if node.kind == node_kind::APPROVAL {
                        let state = node_states.get_mut(id).unwrap();
                        state.status = NodeStatus::Waiting;
                        let prompt = node.data.config.get("prompt").and_then(Value::as_str).unwrap_or_default().to_string();
                        let approval = ApprovalRequest { execution_id: handle.execution_id.clone(), node_id: id.clone(), prompt, context: None };
                        let record = handle.journal.append(ExecutionEvent::NodeWaiting { node_id: id.clone(), node_name: node.data.name.clone(), approval }).await;
                        handle.hub.publish(record).await;
                    }
                }

                for id in &ready {
                    let node = graph.node(id).unwrap();
                    let executor = self.registry.get(&node.kind).expect("validated at execution start");
                    let working_directory = context.resolve_working_directory(node.data.config.get("workingDirectory").and_then(Value::as_str));
                    let abort = abort_handles.get(id).cloned().unwrap();
                    in_flight.push(run_node(
                        node,
                        graph,
                        executor,
                        context.node_outputs.clone(),
                        context.variables.clone(),
                        input,
                        working_directory,
                        abort,
                        &handle.journal,
                        &handle.hub,
                        handle.execution_id.clone(),
                        self.approvals.clone(),
                    ));
                }
            }

            // Wait for the next node to settle rather than the whole
            // dispatched batch, so a branch with nothing waiting on an
            // approval keeps advancing. `idle_poll_interval` bounds how
            // long we wait before re-checking interruption and
            // readiness when nothing settles in time.
            let outcome = match tokio::time::timeout(self.config.idle_poll_interval, in_flight.next()).await {
                Ok(Some(outcome)) => outcome,
                Ok(None) | Err(_) => continue,
            };

            for (key, value) in outcome.variable_writes {
                context.variables.insert(key, value);
            }
            match outcome.result {
                Ok(output) => {
                    context.node_outputs.insert(outcome.node_id.clone(), output.output.clone());
                    let state = node_states.get_mut(&outcome.node_id).unwrap();
                    state.status = NodeStatus::Complete;
                    state.output = Some(output.output.clone());
                    state.completed_at = Some(Utc::now());

                    let record = handle.journal.append(ExecutionEvent::NodeComplete { node_id: outcome.node_id.clone(), result: output.output.clone() }).await;
                    handle.hub.publish(record).await;

                    let node = graph.node(&outcome.node_id).unwrap();
                    let executor = self.registry.get(&node.kind).expect("validated at execution start");
                    if let Some(active_handle) = executor.get_output_handle(node, &output) {
                        let skipped = apply_branch_result(graph, &outcome.node_id, &active_handle, node_states);
                        for id in skipped {
                            let node_name = graph.node(&id).unwrap().data.name.clone();
                            let record = handle.journal.append(ExecutionEvent::NodeSkipped { node_id: id, node_name }).await;
                            handle.hub.publish(record).await;
                        }
                    }
                }
                Err(err) => {
                    let message = err.to_string();
                    let state = node_states.get_mut(&outcome.node_id).unwrap();
                    state.status = NodeStatus::Error;
                    state.error = Some(message.clone());
                    state.completed_at = Some(Utc::now());

                    let record = handle.journal.append(ExecutionEvent::NodeError { node_id: outcome.node_id.clone(), error: message.clone() }).await;
                    handle.hub.publish(record).await;

                    let propagated = propagate_error(graph, node_states, &outcome.node_id, &message);
                    for id in propagated {
                        let wrapped = node_states.get(&id).unwrap().error.clone().unwrap_or_default();
                        let record = handle.journal.append(ExecutionEvent::NodeError { node_id: id, error: wrapped }).await;
                        handle.hub.publish(record).await;
                    }
                }
            }
        }

        Ok(collect_output(graph, node_states, context))
    }
}

struct NodeOutcome {
    node_id: NodeId,
    result: Result<ExecutorOutput, NodeError>,
    variable_writes: Vec<(String, Value)>,
}

/// Runs one node to completion as an independent task. `node_outputs`
/// and `variables` are owned snapshots taken at dispatch time, not
/// borrows of the driving loop's live maps — this future is held in a
/// [`futures::stream::FuturesUnordered`] alongside sibling node tasks
/// across multiple `drive_loop` ticks, so it cannot hold a borrow that
/// the loop needs to mutate while a sibling is still in flight.
#[allow(clippy::too_many_arguments)]
async fn run_node(
    node: &Node,
    graph: &GraphIndex<'_>,
    executor: Arc<dyn crate::executor::Executor>,
    node_outputs: HashMap<String, Value>,
    variables: HashMap<String, Value>,
    input: &Value,
    working_directory: PathBuf,
    abort: AbortHandle,
    journal: &EventJournal,
    hub: &SubscriptionHub,
    execution_id: String,
    approvals: Arc<ApprovalCoordinator>,
) -> NodeOutcome {
    let (tx, mut rx) = unbounded_channel::<AgentEvent>();
    let view = ExecutorView::new(graph, &node_outputs, &variables, input, working_directory, abort, tx, execution_id.clone(), approvals);

    let exec_future = executor.execute(node, &view);
    tokio::pin!(exec_future);

    let result = loop {
        tokio::select! {
            biased;
            maybe_event = rx.recv() => {
                if let Some(event) = maybe_event {
                    let record = journal.append(ExecutionEvent::NodeOutput { node_id: node.id.clone(), event }).await;
                    hub.publish(record).await;
                }
            }
            res = &mut exec_future => break res,
        }
    };
    while let Ok(event) = rx.try_recv() {
        let record = journal.append(ExecutionEvent::NodeOutput { node_id: node.id.clone(), event }).await;
        hub.publish(record).await;
    }

    NodeOutcome { node_id: node.id.clone(), result, variable_writes: view.take_variable_writes() }
}

fn validate_required_nodes(graph: &GraphIndex<'_>) -> Result<(), GraphError> {
    let has_input = graph.workflow().nodes.iter().any(|n| n.kind == node_kind::INPUT);
    let has_output = graph.workflow().nodes.iter().any(|n| n.kind == node_kind::OUTPUT);
    if !has_input {
        return Err(GraphError::MissingRequiredNode(node_kind::INPUT.to_string()));
    }
    if !has_output {
        return Err(GraphError::MissingRequiredNode(node_kind::OUTPUT.to_string()));
    }
    Ok(())
}

/// Edge ids that close a cycle: `target` is reachable from `source` via
/// some other path, so this edge is the one that loops back.
fn compute_back_edges(graph: &GraphIndex<'_>) -> HashSet<String> {
    let mut back = HashSet::new();
    for node in &graph.workflow().nodes {
        for edge in graph.outgoing_edges(&node.id) {
            if graph.is_ancestor(&edge.target, &edge.source) {
                back.insert(edge.id.clone());
            }
        }
    }
    back
}

fn compute_ready_set(graph: &GraphIndex<'_>, back_edges: &HashSet<String>, states: &HashMap<NodeId, NodeState>) -> Vec<NodeId> {
    graph
        .workflow()
        .nodes
        .iter()
        .filter(|node| is_ready(graph, back_edges, node, states))
        .map(|node| node.id.clone())
        .collect()
}

fn is_ready(graph: &GraphIndex<'_>, back_edges: &HashSet<String>, node: &Node, states: &HashMap<NodeId, NodeState>) -> bool {
    if states.get(&node.id).map(|s| s.status) != Some(NodeStatus::Pending) {
        return false;
    }
    if node.kind == node_kind::INPUT {
        return false;
    }
    let preds = graph.predecessors(&node.id);
    if preds.is_empty() {
        return false;
    }

    let mut any_complete = false;
    for &pred in preds {
        let pred_state = match states.get(pred) {
            Some(s) => s,
            None => return false,
        };
        match pred_state.status {
            NodeStatus::Complete => any_complete = true,
            NodeStatus::Skipped => {}
            NodeStatus::Pending => {
                let is_back_edge = graph
                    .outgoing_edges(pred)
                    .iter()
                    .any(|e| e.target == node.id && back_edges.contains(&e.id));
                if !is_back_edge {
                    return false;
                }
            }
            NodeStatus::Running | NodeStatus::Waiting | NodeStatus::Error => return false,
        }
    }
    any_complete
}

/// Mark every currently-`pending` descendant of `source_node` as `error`,
/// transitively, with a message wrapping the original failure (§4.4,
/// §7 "per-node runtime"). Returns the ids that changed, in the order
/// they were marked, so callers can journal one `node-error` each.
fn propagate_error(graph: &GraphIndex<'_>, states: &mut HashMap<NodeId, NodeState>, source_node: &str, message: &str) -> Vec<NodeId> {
    let mut changed = Vec::new();
    let mut queue: VecDeque<String> = graph.successors(source_node).iter().map(|s| s.to_string()).collect();
    let mut visited: HashSet<String> = HashSet::new();

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let state = states.get_mut(&id).unwrap();
        if state.status == NodeStatus::Pending {
            state.status = NodeStatus::Error;
            state.error = Some(format!("propagated from upstream failure '{source_node}': {message}"));
            state.completed_at = Some(Utc::now());
            changed.push(id.clone());
            for succ in graph.successors(&id) {
                queue.push_back(succ.to_string());
            }
        }
    }
    changed
}

/// Skip-then-reset for a branching node's result (§4.4 "Branch skipping").
/// Order matters: inactive branches are skipped first, then the active
/// branch's loop/active-branch resets run — reversing the order would
/// let the skip cascade demote a loop target the reset is about to
/// reactivate. Returns the ids that were newly marked `skipped`, in the
/// order they were marked, so the caller can journal one `node-skipped`
/// each — §6 summaries must carry skipped nodes too.
fn apply_branch_result(graph: &GraphIndex<'_>, branch_node: &str, active_handle: &str, states: &mut HashMap<NodeId, NodeState>) -> Vec<NodeId> {
    let outgoing: Vec<&Edge> = graph.outgoing_edges(branch_node).to_vec();
    let inactive_targets: Vec<String> = outgoing
        .iter()
        .filter(|e| e.source_handle.as_deref() != Some(active_handle))
        .map(|e| e.target.clone())
        .collect();
    let active_targets: Vec<String> = outgoing
        .iter()
        .filter(|e| e.source_handle.as_deref() == Some(active_handle))
        .map(|e| e.target.clone())
        .collect();

    let skipped = skip_inactive(graph, branch_node, inactive_targets, states);
    reset_active(graph, active_targets, states);
    skipped
}

fn skip_inactive(graph: &GraphIndex<'_>, branch_node: &str, inactive_targets: Vec<NodeId>, states: &mut HashMap<NodeId, NodeState>) -> Vec<NodeId> {
    let mut queued: HashSet<NodeId> = inactive_targets.iter().cloned().collect();
    let mut frontier: VecDeque<NodeId> = inactive_targets.into_iter().collect();
    let mut skipped = Vec::new();

    while let Some(target) = frontier.pop_front() {
        queued.remove(&target);
        if states.get(&target).map(|s| s.status) != Some(NodeStatus::Pending) {
            continue;
        }
        let all_preds_inactive = graph.predecessors(&target).iter().all(|&pred| {
            pred == branch_node || matches!(states.get(pred).map(|s| s.status), Some(NodeStatus::Skipped) | Some(NodeStatus::Error))
        });
        if all_preds_inactive {
            states.get_mut(&target).unwrap().status = NodeStatus::Skipped;
            skipped.push(target.clone());
            for succ in graph.successors(&target) {
                if queued.insert(succ.to_string()) {
                    frontier.push_back(succ.to_string());
                }
            }
        }
    }
    skipped
}

fn reset_active(graph: &GraphIndex<'_>, active_targets: Vec<NodeId>, states: &mut HashMap<NodeId, NodeState>) {
    for target in active_targets {
        match states.get(&target).map(|s| s.status) {
            Some(NodeStatus::Complete) | Some(NodeStatus::Skipped) => reset_chain(graph, &target, states),
            _ => {}
        }
    }
}

/// Reset `start` and every downstream `complete`/`skipped` successor back
/// to `pending` (loop reset / active-branch reset, §4.4 step 2). The
/// `visited` set alone is what keeps this terminating on the cycle `start`
/// sits on — no special-casing of the branching node is needed, and the
/// branching node itself is a legitimate reset target when the loop body
/// routes back through it.
fn reset_chain(graph: &GraphIndex<'_>, start: &str, states: &mut HashMap<NodeId, NodeState>) {
    let mut queue: VecDeque<NodeId> = VecDeque::from([start.to_string()]);
    let mut visited: HashSet<NodeId> = HashSet::new();

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let status = states.get(&id).map(|s| s.status);
        if matches!(status, Some(NodeStatus::Complete) | Some(NodeStatus::Skipped)) {
            let state = states.get_mut(&id).unwrap();
            *state = NodeState::default();
            for succ in graph.successors(&id) {
                queue.push_back(succ.to_string());
            }
        }
    }
}

/// Seed the context/state maps from a checkpoint per §4.4's replay
/// algorithm; returns the `(id, name, output)` triples for nodes whose
/// cached completion should be announced synthetically.
fn seed_replay(
    graph: &GraphIndex<'_>,
    states: &mut HashMap<NodeId, NodeState>,
    context: &mut ExecutionContext,
    seed: &ReplaySeed,
) -> Vec<(NodeId, String, Value)> {
    let mut synthetic = Vec::new();

    for node in &graph.workflow().nodes {
        if seed.replay_node_ids.contains(&node.id) {
            states.insert(node.id.clone(), NodeState::default());
            continue;
        }
        if seed.inactive_node_ids.contains(&node.id) {
            let mut state = NodeState::default();
            state.status = NodeStatus::Skipped;
            states.insert(node.id.clone(), state);
            continue;
        }
        if let Some(cp_state) = seed.checkpoint.node_states.get(&node.id) {
            let status = match cp_state.status {
                CheckpointNodeStatus::Complete => NodeStatus::Complete,
                CheckpointNodeStatus::Skipped => NodeStatus::Skipped,
                CheckpointNodeStatus::Error => NodeStatus::Error,
                CheckpointNodeStatus::Waiting => NodeStatus::Waiting,
                CheckpointNodeStatus::Pending | CheckpointNodeStatus::Running => NodeStatus::Pending,
            };
            let output = seed.checkpoint.node_outputs.get(&node.id).cloned();
            let mut state = NodeState { status, error: cp_state.error.clone(), output: output.clone(), ..Default::default() };
            if status == NodeStatus::Complete {
                if let Some(output) = output.clone() {
                    context.node_outputs.insert(node.id.clone(), output.clone());
                    synthetic.push((node.id.clone(), node.data.name.clone(), output));
                } else {
                    warn!(node_id = %node.id, "checkpoint marks node complete but has no cached output; demoting to pending for replay");
                    state.status = NodeStatus::Pending;
                    state.output = None;
                }
            }
            states.insert(node.id.clone(), state);
        }
    }

    context.variables = seed.checkpoint.variables.clone();
    let ids: Vec<&str> = seed.replay_node_ids.iter().map(|s| s.as_str()).collect();
    context.variables.retain(|key, _| {
        !ids.iter().any(|id| {
            key == &format!("node.{id}") || key.starts_with(&format!("node.{id}."))
                || key == &format!("agent.session.{id}") || key.starts_with(&format!("agent.session.{id}."))
        })
    });

    synthetic
}

/// Final execution result: the `output`-type node's value, or — if there
/// are several, or none — a consolidated object keyed by node name
/// (mirrors §4.7's "consolidated object for multiple" rule).
fn collect_output(graph: &GraphIndex<'_>, states: &HashMap<NodeId, NodeState>, context: &ExecutionContext) -> Value {
    let outputs: Vec<&Node> = graph.workflow().nodes.iter().filter(|n| n.kind == node_kind::OUTPUT).collect();
    if outputs.len() == 1 {
        return states.get(&outputs[0].id).and_then(|s| s.output.clone()).unwrap_or(Value::Null);
    }
    let mut map = serde_json::Map::new();
    for node in outputs {
        if let Some(output) = context.node_outputs.get(&node.id) {
            map.insert(node.data.name.clone(), output.clone());
        }
    }
    Value::Object(map)
}
