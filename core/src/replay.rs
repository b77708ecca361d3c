//! Replay Planner (C8) — turns `(workflow, checkpoint, fromNodeId)` into
//! the `replayNodeIds`/`inactiveNodeIds` sets [`crate::scheduler::Scheduler::execute_from_checkpoint`]
//! needs, plus a human-facing eligibility verdict and per-node replay
//! info for the UI.
//!
//! This module never touches a scheduler or executes anything; it reads
//! a [`CheckpointState`] and an optional prior [`WorkflowSnapshot`] and
//! answers "can we replay from here, and what would it skip?".

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use flowmesh_checkpoint::state::{CheckpointNodeStatus, CheckpointState, WorkflowSnapshot};

use crate::executor::ExecutorRegistry;
use crate::graph::GraphIndex;
use crate::model::{NodeId, Workflow};

/// Non-blocking observations about drift between the snapshot taken at
/// the source execution's start and the workflow as it exists now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayWarning {
    NodeChanged(NodeId),
    EdgeSetChanged,
    SnapshotMissing,
}

impl ReplayWarning {
    pub fn message(&self) -> String {
        match self {
            Self::NodeChanged(id) => format!("node '{id}' changed since the checkpointed run"),
            Self::EdgeSetChanged => "the edge set changed since the checkpointed run".to_string(),
            Self::SnapshotMissing => "no workflow snapshot was recorded for the source execution".to_string(),
        }
    }
}

/// Blocking reasons a replay may not proceed. Structural removals/
/// additions block (§4.11) even though they are detected by the same
/// diff pass that produces warnings for lesser changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockingReason {
    NodeRemoved(NodeId),
    NodeAdded(NodeId),
    InvalidNode(NodeId),
    InactiveBranch(NodeId),
    DependencyMissing { ancestor: NodeId, reason: String },
    MissingCheckpoint,
}

impl BlockingReason {
    pub fn message(&self) -> String {
        match self {
            Self::NodeRemoved(id) => format!("node '{id}' was removed from the workflow"),
            Self::NodeAdded(id) => format!("node '{id}' was added to the workflow after the checkpoint"),
            Self::InvalidNode(id) => format!("replay target node '{id}' does not exist in the current workflow"),
            Self::InactiveBranch(id) => format!("replay target node '{id}' is on a branch the checkpoint marks inactive"),
            Self::DependencyMissing { ancestor, reason } => format!("ancestor '{ancestor}' has no reusable state: {reason}"),
            Self::MissingCheckpoint => "no checkpoint is available for the source execution".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeReplayInfo {
    pub node_id: NodeId,
    pub status: Option<CheckpointNodeStatus>,
    pub replayable: bool,
    pub reason: Option<String>,
}

/// Full verdict for one `(workflow, checkpoint, fromNodeId)` request.
#[derive(Debug, Clone)]
pub struct ReplayPlan {
    pub replay_node_ids: HashSet<NodeId>,
    pub inactive_node_ids: HashSet<NodeId>,
    pub blocking: Vec<BlockingReason>,
    pub warnings: Vec<ReplayWarning>,
    pub per_node: Vec<NodeReplayInfo>,
}

impl ReplayPlan {
    pub fn is_blocked(&self) -> bool {
        !self.blocking.is_empty()
    }
}

/// Stateless computation over a workflow + checkpoint pair. Takes the
/// executor registry because `inactiveNodeIds` requires asking a
/// checkpoint-complete branching node's executor which handle it took
/// (§4.11's "asking its executor for the active handle").
pub struct ReplayPlanner {
    registry: Arc<ExecutorRegistry>,
}

impl ReplayPlanner {
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        Self { registry }
    }

    /// Diff a prior [`WorkflowSnapshot`] against the current workflow
    /// (§4.11 "Snapshot diff"). `None` snapshot produces a single
    /// `SnapshotMissing` warning and no structural blocking reasons —
    /// there is nothing to diff against.
    pub fn diff_snapshot(&self, workflow: &Workflow, snapshot: Option<&WorkflowSnapshot>) -> (Vec<BlockingReason>, Vec<ReplayWarning>) {
        let mut blocking = Vec::new();
        let mut warnings = Vec::new();

        let Some(snapshot) = snapshot else {
            warnings.push(ReplayWarning::SnapshotMissing);
            return (blocking, warnings);
        };

        let current_ids: HashSet<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();
        let snapshot_ids: HashSet<&str> = snapshot.nodes.iter().map(|n| n.id.as_str()).collect();

        for removed in snapshot_ids.difference(&current_ids) {
            blocking.push(BlockingReason::NodeRemoved(removed.to_string()));
        }
        for added in current_ids.difference(&snapshot_ids) {
            blocking.push(BlockingReason::NodeAdded(added.to_string()));
        }

        let snapshot_by_id: HashMap<&str, &flowmesh_checkpoint::state::SnapshotNode> =
            snapshot.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        for node in &workflow.nodes {
            if let Some(prior) = snapshot_by_id.get(node.id.as_str()) {
                if prior.node_type != node.kind || prior.data != node.data.config {
                    warnings.push(ReplayWarning::NodeChanged(node.id.clone()));
                }
            }
        }

        let current_edges: HashSet<flowmesh_checkpoint::state::SnapshotEdge> = workflow
            .edges
            .iter()
            .map(|e| flowmesh_checkpoint::state::SnapshotEdge {
                source: e.source.clone(),
                source_handle: e.source_handle.clone(),
                target: e.target.clone(),
                target_handle: e.target_handle.clone(),
                edge_type: e.edge_type.clone(),
            })
            .collect();
        let snapshot_edges: HashSet<flowmesh_checkpoint::state::SnapshotEdge> = snapshot.edges.iter().cloned().collect();
        if current_edges != snapshot_edges {
            warnings.push(ReplayWarning::EdgeSetChanged);
        }

        (blocking, warnings)
    }

    /// Compute the full plan for replaying `workflow` from `from_node_id`
    /// against `checkpoint`, per §4.11 "Plan computation".
    pub fn plan(
        &self,
        workflow: &Workflow,
        checkpoint: Option<&CheckpointState>,
        snapshot: Option<&WorkflowSnapshot>,
        from_node_id: &str,
    ) -> ReplayPlan {
        let Ok(graph) = GraphIndex::build(workflow) else {
            return ReplayPlan {
                replay_node_ids: HashSet::new(),
                inactive_node_ids: HashSet::new(),
                blocking: vec![BlockingReason::InvalidNode(from_node_id.to_string())],
                warnings: Vec::new(),
                per_node: Vec::new(),
            };
        };

        let (mut blocking, warnings) = self.diff_snapshot(workflow, snapshot);

        let Some(checkpoint) = checkpoint else {
            blocking.push(BlockingReason::MissingCheckpoint);
            return ReplayPlan { replay_node_ids: HashSet::new(), inactive_node_ids: HashSet::new(), blocking, warnings, per_node: Vec::new() };
        };

        if graph.node(from_node_id).is_none() {
            blocking.push(BlockingReason::InvalidNode(from_node_id.to_string()));
            return ReplayPlan { replay_node_ids: HashSet::new(), inactive_node_ids: HashSet::new(), blocking, warnings, per_node: Vec::new() };
        }

        let mut replay_node_ids = graph.descendants(from_node_id);
        replay_node_ids.insert(from_node_id.to_string());

        for ancestor in graph.ancestors(from_node_id) {
            match checkpoint.node_states.get(&ancestor) {
                None => blocking.push(BlockingReason::DependencyMissing { ancestor: ancestor.clone(), reason: "no checkpointed state".to_string() }),
                Some(state) if !state.status.is_reusable() => {
                    blocking.push(BlockingReason::DependencyMissing { ancestor: ancestor.clone(), reason: format!("status is {:?}, not complete or skipped", state.status) })
                }
                Some(state) if state.status == CheckpointNodeStatus::Complete && !checkpoint.node_outputs.contains_key(&ancestor) => {
                    blocking.push(BlockingReason::DependencyMissing { ancestor: ancestor.clone(), reason: "complete but has no cached output".to_string() })
                }
                _ => {}
            }
        }

        let raw_inactive = self.compute_raw_inactive(&graph, checkpoint);
        if raw_inactive.contains(from_node_id) {
            blocking.push(BlockingReason::InactiveBranch(from_node_id.to_string()));
        }
        // Nodes about to be replayed are re-executed regardless of what
        // the checkpoint's branch decisions say about them, so they're
        // excluded from the set the scheduler is told to force-skip.
        let inactive_node_ids: HashSet<NodeId> = raw_inactive.difference(&replay_node_ids).cloned().collect();

        let per_node = workflow
            .nodes
            .iter()
            .map(|node| self.node_replay_info(&graph, checkpoint, &replay_node_ids, &inactive_node_ids, &node.id))
            .collect();

        ReplayPlan { replay_node_ids, inactive_node_ids, blocking, warnings, per_node }
    }

    /// Walk every checkpoint-`complete` branching node, ask its executor
    /// which handle it took, and cascade "inactive" through every
    /// successor whose *every* predecessor is itself inactive or
    /// checkpoint-`skipped`/`error` (§4.11, mirrors the scheduler's own
    /// skip-cascade safety rule in §8 so a merge fed by one active and
    /// one inactive branch is never wrongly marked inactive).
    ///
    /// This is computed over the *whole* checkpoint, independent of
    /// which node the caller wants to replay from — that independence is
    /// what lets [`Self::plan`] detect "the requested replay target is
    /// itself on an inactive branch" by simple membership.
    fn compute_raw_inactive(&self, graph: &GraphIndex<'_>, checkpoint: &CheckpointState) -> HashSet<NodeId> {
        let mut inactive = HashSet::new();
        let mut frontier: std::collections::VecDeque<NodeId> = std::collections::VecDeque::new();

        for node in &graph.workflow().nodes {
            let Some(cp_state) = checkpoint.node_states.get(&node.id) else { continue };
            if cp_state.status != CheckpointNodeStatus::Complete {
                continue;
            }
            let Ok(executor) = self.registry.get(&node.kind) else { continue };
            let Some(output) = checkpoint.node_outputs.get(&node.id) else { continue };
            let Some(active_handle) = executor.get_output_handle(node, &crate::executor::ExecutorOutput::value(output.clone())) else { continue };

            for edge in graph.outgoing_edges(&node.id) {
                if edge.source_handle.as_deref() != Some(active_handle.as_str()) && inactive.insert(edge.target.clone()) {
                    frontier.push_back(edge.target.clone());
                }
            }
        }

        while let Some(id) = frontier.pop_front() {
            for &succ in graph.successors(&id) {
                if inactive.contains(succ) {
                    continue;
                }
                let all_preds_dead = graph.predecessors(succ).iter().all(|&pred| {
                    inactive.contains(pred) || matches!(checkpoint.node_states.get(pred).map(|s| s.status), Some(CheckpointNodeStatus::Skipped) | Some(CheckpointNodeStatus::Error))
                });
                if all_preds_dead {
                    inactive.insert(succ.to_string());
                    frontier.push_back(succ.to_string());
                }
            }
        }

        inactive
    }

    fn node_replay_info(
        &self,
        graph: &GraphIndex<'_>,
        checkpoint: &CheckpointState,
        replay_node_ids: &HashSet<NodeId>,
        inactive_node_ids: &HashSet<NodeId>,
        node_id: &str,
    ) -> NodeReplayInfo {
        let status = checkpoint.node_states.get(node_id).map(|s| s.status);

        if inactive_node_ids.contains(node_id) {
            return NodeReplayInfo { node_id: node_id.to_string(), status, replayable: false, reason: Some("on a branch the checkpoint marks inactive".to_string()) };
        }
        if replay_node_ids.contains(node_id) {
            return NodeReplayInfo { node_id: node_id.to_string(), status, replayable: true, reason: None };
        }

        let non_reusable_ancestor = graph.ancestors(node_id).into_iter().find(|ancestor| match checkpoint.node_states.get(ancestor) {
            Some(s) => !s.status.is_reusable(),
            None => true,
        });

        match non_reusable_ancestor {
            Some(ancestor) => NodeReplayInfo {
                node_id: node_id.to_string(),
                status,
                replayable: false,
                reason: Some(format!("ancestor '{ancestor}' has no reusable checkpointed state")),
            },
            None => NodeReplayInfo { node_id: node_id.to_string(), status, replayable: true, reason: None },
        }
    }
}
