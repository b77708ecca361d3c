//! Exercises the built-in node executors through a real [`Scheduler`]
//! run, instead of only through each node module's own unit tests — the
//! registry wiring and the ready-set loop are part of the contract too.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use flowmesh_core::approval::ApprovalCoordinator;
use flowmesh_core::config::{JournalConfig, SchedulerConfig};
use flowmesh_core::error::NodeError;
use flowmesh_core::executor::ExecutorRegistry;
use flowmesh_core::model::{Edge, Node, NodeData, Workflow};
use flowmesh_core::nodes::{self, AgentBackend, AgentRun};
use flowmesh_core::scheduler::Scheduler;

struct NoopAgentBackend;

#[async_trait]
impl AgentBackend for NoopAgentBackend {
    async fn run(&self, _agent_type: &str, _prompt: &str, _session_id: Option<&str>) -> Result<AgentRun, NodeError> {
        Ok(AgentRun { events: vec![], session_id: None, structured_output: None })
    }
}

fn node(id: &str, kind: &str, name: &str, config: serde_json::Value) -> Node {
    Node { id: id.into(), kind: kind.into(), position: None, data: NodeData { name: name.into(), config } }
}

fn edge(source: &str, target: &str, source_handle: Option<&str>) -> Edge {
    Edge { id: format!("{source}->{target}"), source: source.into(), target: target.into(), source_handle: source_handle.map(str::to_string), target_handle: None, edge_type: None }
}

fn scheduler() -> Scheduler {
    let mut registry = ExecutorRegistry::new();
    nodes::register_builtins(&mut registry, Arc::new(NoopAgentBackend)).unwrap();
    Scheduler::new(Arc::new(registry), Arc::new(ApprovalCoordinator::new()), SchedulerConfig::default())
}

#[tokio::test]
async fn conditional_branch_through_real_executors() {
    let workflow = Arc::new(Workflow {
        id: "wf".into(),
        name: "wf".into(),
        description: None,
        working_directory: None,
        nodes: vec![
            node("in", "input", "Input", json!({})),
            node(
                "c",
                "condition",
                "C",
                json!({ "rules": [{ "inputReference": "Input.result", "operator": "contains", "compareValue": "success" }] }),
            ),
            node("t", "output", "T", json!({})),
            node("f", "output", "F", json!({})),
        ],
        edges: vec![
            edge("in", "c", None),
            edge("c", "t", Some("true")),
            edge("c", "f", Some("false")),
        ],
    });

    let scheduler = scheduler();
    let result = scheduler
        .execute(workflow, PathBuf::from("/tmp"), json!("big success"), &JournalConfig::in_memory())
        .await
        .unwrap();

    // Two output nodes -> consolidated object keyed by output node name;
    // only the active branch's output node ever completed, echoing the
    // condition node's own boolean result (its sole predecessor).
    assert_eq!(result, json!({ "T": true }));
}

#[tokio::test]
async fn merge_joins_two_branches_by_predecessor_name() {
    let workflow = Arc::new(Workflow {
        id: "wf".into(),
        name: "wf".into(),
        description: None,
        working_directory: None,
        nodes: vec![
            node("in", "input", "Input", json!({})),
            node("a", "script", "A", json!({ "code": "{{Input}}" })),
            node("b", "script", "B", json!({ "code": "{{Input}}" })),
            node("m", "merge", "Merge", json!({})),
            node("out", "output", "Out", json!({})),
        ],
        edges: vec![edge("in", "a", None), edge("in", "b", None), edge("a", "m", None), edge("b", "m", None), edge("m", "out", None)],
    });

    let scheduler = scheduler();
    let result = scheduler
        .execute(workflow, PathBuf::from("/tmp"), json!(7), &JournalConfig::in_memory())
        .await
        .unwrap();

    assert_eq!(result, json!({ "A": 7, "B": 7 }));
}
