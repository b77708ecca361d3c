//! `script` executor (§4.7): evaluates a small reference-interpolation
//! program against selected ancestor outputs.
//!
//! There is no embedded general-purpose language here — the "restricted
//! evaluation environment" the contract calls for is implemented as a
//! whitelisted operation over [`crate::resolve::Resolver`]: a script can
//! only read resolved `{{Name.path}}` values and stream `console.log`
//! lines as events, with no path to the filesystem, a subprocess, or the
//! network. This keeps the sandbox honest by construction rather than by
//! policing an interpreter.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::NodeError;
use crate::executor::{Executor, ExecutorOutput, ExecutorView};
use crate::events::AgentEvent;
use crate::model::Node;
use crate::resolve::Resolver;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

fn timeout_from_config(node: &Node) -> Duration {
    node.data
        .config
        .get("timeoutMs")
        .and_then(Value::as_u64)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_TIMEOUT)
}

/// Which ancestor outputs a script may see: an explicit `inputs` name
/// list from config, or — by default — every ancestor (§4.7).
fn selected_inputs(node: &Node, view: &ExecutorView<'_>) -> serde_json::Map<String, Value> {
    let all = view.ancestor_outputs(&node.id);
    match node.data.config.get("inputs").and_then(Value::as_array) {
        Some(names) => names
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|name| all.get(name).map(|v| (name.to_string(), v.clone())))
            .collect(),
        None => all.into_iter().collect(),
    }
}

async fn run_script(node: &Node, view: &ExecutorView<'_>) -> Result<ExecutorOutput, NodeError> {
    let _inputs = selected_inputs(node, view);
    let code = node.data.config.get("code").and_then(Value::as_str).unwrap_or_default();

    let mut last_expr: Option<&str> = None;
    for raw_line in code.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(inner) = line.strip_prefix("console.log(").and_then(|s| s.strip_suffix(')')) {
            let rendered = view.interpolate(inner.trim().trim_matches('"'));
            view.emit(AgentEvent::TextDelta { text: rendered });
            continue;
        }
        last_expr = Some(line);
    }

    let output = match last_expr {
        Some(expr) if Resolver::is_direct_reference(expr) => view.resolve_reference(expr)?.unwrap_or(Value::Null),
        Some(expr) => Value::String(view.interpolate(expr)),
        None => Value::Null,
    };
    Ok(ExecutorOutput::value(output))
}

pub struct ScriptExecutor;

#[async_trait]
impl Executor for ScriptExecutor {
    async fn execute(&self, node: &Node, view: &ExecutorView<'_>) -> Result<ExecutorOutput, NodeError> {
        let timeout = timeout_from_config(node);
        let abort = view.abort();

        tokio::select! {
            biased;
            _ = abort.cancelled() => Err(NodeError::message("script aborted")),
            result = tokio::time::timeout(timeout, run_script(node, view)) => {
                result.map_err(|_| NodeError::Timeout(timeout))?
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::approval::ApprovalCoordinator;
    use crate::context::AbortHandle;
    use crate::graph::GraphIndex;
    use crate::model::{Edge, NodeData, Workflow};

    fn workflow_with_script(config: Value) -> Workflow {
        Workflow {
            id: "wf".into(),
            name: "wf".into(),
            description: None,
            working_directory: None,
            nodes: vec![
                Node { id: "a".into(), kind: "input".into(), position: None, data: NodeData { name: "A".into(), config: json!({}) } },
                Node { id: "s".into(), kind: "script".into(), position: None, data: NodeData { name: "S".into(), config } },
            ],
            edges: vec![Edge { id: "e".into(), source: "a".into(), target: "s".into(), source_handle: None, target_handle: None, edge_type: None }],
        }
    }

    #[tokio::test]
    async fn direct_reference_script_resolves_type_preserving() {
        let wf = workflow_with_script(json!({ "code": "{{A.count}}" }));
        let graph = GraphIndex::build(&wf).unwrap();
        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), json!({ "count": 5 }));
        let variables = HashMap::new();
        let input = json!(null);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let view = ExecutorView::new(
            &graph,
            &outputs,
            &variables,
            &input,
            PathBuf::from("/tmp"),
            AbortHandle(Arc::new(CancellationToken::new())),
            tx,
            "exec-1",
            Arc::new(ApprovalCoordinator::new()),
        );

        let result = ScriptExecutor.execute(&wf.nodes[1], &view).await.unwrap();
        assert_eq!(result.output, json!(5));
    }

    #[tokio::test]
    async fn console_log_lines_stream_as_events() {
        let wf = workflow_with_script(json!({ "code": "console.log(\"n={{A.count}}\")\n{{A.count}}" }));
        let graph = GraphIndex::build(&wf).unwrap();
        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), json!({ "count": 2 }));
        let variables = HashMap::new();
        let input = json!(null);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let view = ExecutorView::new(
            &graph,
            &outputs,
            &variables,
            &input,
            PathBuf::from("/tmp"),
            AbortHandle(Arc::new(CancellationToken::new())),
            tx,
            "exec-1",
            Arc::new(ApprovalCoordinator::new()),
        );

        let result = ScriptExecutor.execute(&wf.nodes[1], &view).await.unwrap();
        assert_eq!(result.output, json!(2));
        match rx.try_recv().unwrap() {
            AgentEvent::TextDelta { text } => assert_eq!(text, "n=2"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn abort_stops_the_script_promptly() {
        let wf = workflow_with_script(json!({ "code": "{{A.count}}" }));
        let graph = GraphIndex::build(&wf).unwrap();
        let outputs = HashMap::new();
        let variables = HashMap::new();
        let input = json!(null);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let token = CancellationToken::new();
        token.cancel();
        let view = ExecutorView::new(
            &graph,
            &outputs,
            &variables,
            &input,
            PathBuf::from("/tmp"),
            AbortHandle(Arc::new(token)),
            tx,
            "exec-1",
            Arc::new(ApprovalCoordinator::new()),
        );

        let result = ScriptExecutor.execute(&wf.nodes[1], &view).await;
        assert!(matches!(result, Err(NodeError::Message(_))));
    }
}
