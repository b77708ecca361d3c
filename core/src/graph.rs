//! Graph Model (C1) — predecessor/successor/ancestor/descendant queries
//! over an immutable [`Workflow`], plus name↔id resolution.
//!
//! `GraphIndex` is built once per execution from the workflow and never
//! mutated; it is the read-only shared state every other component
//! (resolver, scheduler, replay planner) queries against.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::warn;

use crate::error::{GraphError, Result};
use crate::model::{EdgeId, Node, NodeId, Workflow};

/// Read-only adjacency index derived from a [`Workflow`].
pub struct GraphIndex<'w> {
    workflow: &'w Workflow,
    node_by_id: HashMap<&'w str, &'w Node>,
    name_to_id: HashMap<&'w str, &'w str>,
    successors: HashMap<&'w str, Vec<&'w str>>,
    predecessors: HashMap<&'w str, Vec<&'w str>>,
    /// Edges grouped by source, kept alongside plain successor ids so
    /// branch-aware callers (scheduler, condition/merge executors) can
    /// still see `source_handle`/`target` without re-scanning all edges.
    outgoing_edges: HashMap<&'w str, Vec<&'w crate::model::Edge>>,
    incoming_edges: HashMap<&'w str, Vec<&'w crate::model::Edge>>,
}

impl<'w> GraphIndex<'w> {
    /// Build the index. Fails if node ids or names collide, or if an
    /// edge references a node that doesn't exist — the migration-time
    /// invariants from §3 are enforced here, once, at construction.
    pub fn build(workflow: &'w Workflow) -> Result<Self, GraphError> {
        let mut node_by_id = HashMap::new();
        let mut name_to_id = HashMap::new();
        for node in &workflow.nodes {
            if node_by_id.insert(node.id.as_str(), node).is_some() {
                return Err(GraphError::DuplicateNodeId(node.id.clone()));
            }
            if name_to_id.insert(node.data.name.as_str(), node.id.as_str()).is_some() {
                return Err(GraphError::DuplicateNodeName(node.data.name.clone()));
            }
        }

        let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut predecessors: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut outgoing_edges: HashMap<&str, Vec<&crate::model::Edge>> = HashMap::new();
        let mut incoming_edges: HashMap<&str, Vec<&crate::model::Edge>> = HashMap::new();
        for node in &workflow.nodes {
            successors.entry(node.id.as_str()).or_default();
            predecessors.entry(node.id.as_str()).or_default();
            outgoing_edges.entry(node.id.as_str()).or_default();
            incoming_edges.entry(node.id.as_str()).or_default();
        }
        for edge in &workflow.edges {
            if !node_by_id.contains_key(edge.source.as_str()) {
                return Err(GraphError::UnknownEdgeEndpoint(edge.id.clone(), edge.source.clone()));
            }
            if !node_by_id.contains_key(edge.target.as_str()) {
                return Err(GraphError::UnknownEdgeEndpoint(edge.id.clone(), edge.target.clone()));
            }
            successors.get_mut(edge.source.as_str()).unwrap().push(edge.target.as_str());
            predecessors.get_mut(edge.target.as_str()).unwrap().push(edge.source.as_str());
            outgoing_edges.get_mut(edge.source.as_str()).unwrap().push(edge);
            incoming_edges.get_mut(edge.target.as_str()).unwrap().push(edge);
        }

        Ok(Self {
            workflow,
            node_by_id,
            name_to_id,
            successors,
            predecessors,
            outgoing_edges,
            incoming_edges,
        })
    }

    pub fn workflow(&self) -> &'w Workflow {
        self.workflow
    }

    pub fn node(&self, id: &str) -> Option<&'w Node> {
        self.node_by_id.get(id).copied()
    }

    pub fn id_for_name(&self, name: &str) -> Option<&'w str> {
        self.name_to_id.get(name).copied()
    }

    pub fn predecessors(&self, id: &str) -> &[&'w str] {
        self.predecessors.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn successors(&self, id: &str) -> &[&'w str] {
        self.successors.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn outgoing_edges(&self, id: &str) -> &[&'w crate::model::Edge] {
        self.outgoing_edges.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn incoming_edges(&self, id: &str) -> &[&'w crate::model::Edge] {
        self.incoming_edges.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// All nodes reachable forward from `id`, including `id` itself.
    pub fn reachable_from(&self, id: &str) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(id.to_string());
        seen.insert(id.to_string());
        while let Some(cur) = queue.pop_front() {
            for succ in self.successors(&cur) {
                if seen.insert(succ.to_string()) {
                    queue.push_back(succ.to_string());
                }
            }
        }
        seen
    }

    /// Transitive descendants of `id`, excluding `id` itself.
    pub fn descendants(&self, id: &str) -> HashSet<NodeId> {
        let mut set = self.reachable_from(id);
        set.remove(id);
        set
    }

    /// Transitive ancestors of `id`, excluding `id` itself, ordered
    /// furthest-first (a topological order over the reverse graph). Must
    /// terminate on cyclic graphs: back-edges make a naive reverse walk
    /// loop forever, so iteration is capped at `|partial ancestors|^2`
    /// and a warning is logged if the bound is hit, returning a
    /// best-effort partial order rather than looping.
    pub fn ancestors(&self, id: &str) -> Vec<NodeId> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut order: Vec<NodeId> = Vec::new();
        let mut frontier: VecDeque<&str> = self.predecessors(id).iter().copied().collect();
        visited.insert(id);

        let mut iterations: u64 = 0;
        loop {
            let bound = (order.len() as u64 + 1).pow(2).max(64);
            let Some(cur) = frontier.pop_front() else { break };
            iterations += 1;
            if iterations > bound {
                warn!(
                    node = id,
                    iterations,
                    bound,
                    "ancestor walk hit bounded-iteration cap on a cyclic graph; returning partial order"
                );
                break;
            }
            if !visited.insert(cur) {
                continue;
            }
            order.push(cur.to_string());
            for pred in self.predecessors(cur) {
                if !visited.contains(pred) {
                    frontier.push_back(pred);
                }
            }
        }

        order.reverse();
        order
    }

    /// True if `maybe_ancestor` is on a path into `id` (used by callers
    /// that want to classify an edge as a loop-carrying back-edge by
    /// static reachability, as a complement to the scheduler's dynamic
    /// "target already complete" check described in §9).
    pub fn is_ancestor(&self, maybe_ancestor: &str, id: &str) -> bool {
        self.ancestors(id).iter().any(|a| a == maybe_ancestor)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&'w crate::model::Edge> {
        self.workflow.edges.iter().find(|e| &e.id == id)
    }
}
