//! `approval` executor (§4.9): the node-side half of the human-in-the-
//! loop wait. The scheduler transitions the node to `waiting` and emits
//! `node-waiting` *before* dispatching this executor (§4.4's "main
//! loop"); this executor's only job is to register the wait, suspend
//! until it resolves, and route on the response.

use async_trait::async_trait;
use serde_json::Value;

use crate::approval::ApprovalOutcome;
use crate::error::NodeError;
use crate::executor::{Executor, ExecutorOutput, ExecutorView};
use crate::model::Node;

pub struct ApprovalExecutor;

#[async_trait]
impl Executor for ApprovalExecutor {
    async fn execute(&self, node: &Node, view: &ExecutorView<'_>) -> Result<ExecutorOutput, NodeError> {
        let rx = view.approvals().register(view.execution_id(), &node.id);
        let abort = view.abort();

        let outcome = tokio::select! {
            biased;
            _ = abort.cancelled() => {
                view.approvals().cancel(view.execution_id(), &node.id);
                ApprovalOutcome::Cancelled
            }
            outcome = rx => outcome.unwrap_or(ApprovalOutcome::Cancelled),
        };

        match outcome {
            ApprovalOutcome::Resolved(response) => {
                let output = serde_json::to_value(&response).map_err(|e| NodeError::message(format!("failed to serialize approval response: {e}")))?;
                Ok(ExecutorOutput::value(output))
            }
            ApprovalOutcome::Cancelled => Err(NodeError::ApprovalCancelled),
        }
    }

    /// `approved ? "approval" : "rejection"` (§4.9).
    fn get_output_handle(&self, _node: &Node, result: &ExecutorOutput) -> Option<String> {
        let approved = result.output.get("approved").and_then(Value::as_bool).unwrap_or(false);
        Some(if approved { "approval".to_string() } else { "rejection".to_string() })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::future::Future;
    use std::path::PathBuf;
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::approval::ApprovalCoordinator;
    use crate::context::AbortHandle;
    use crate::events::ApprovalResponse;
    use crate::graph::GraphIndex;
    use crate::model::{NodeData, Workflow};

    fn workflow() -> Workflow {
        Workflow {
            id: "wf".into(),
            name: "wf".into(),
            description: None,
            working_directory: None,
            nodes: vec![Node { id: "ap".into(), kind: "approval".into(), position: None, data: NodeData { name: "Ap".into(), config: json!({ "prompt": "ok?" }) } }],
            edges: vec![],
        }
    }

    #[tokio::test]
    async fn resolved_approval_routes_to_approval_handle() {
        let wf = workflow();
        let graph = GraphIndex::build(&wf).unwrap();
        let outputs = HashMap::new();
        let variables = HashMap::new();
        let input = json!(null);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let coordinator = Arc::new(ApprovalCoordinator::new());
        let view = ExecutorView::new(
            &graph,
            &outputs,
            &variables,
            &input,
            PathBuf::from("/tmp"),
            AbortHandle(Arc::new(CancellationToken::new())),
            tx,
            "exec-1",
            coordinator.clone(),
        );

        let submitted = coordinator.submit("exec-1", "ap", ApprovalResponse { approved: true, feedback: None, responded_at: Utc::now() });
        assert!(submitted);

        let result = ApprovalExecutor.execute(&wf.nodes[0], &view).await.unwrap();
        assert_eq!(ApprovalExecutor.get_output_handle(&wf.nodes[0], &result), Some("approval".to_string()));
    }

    #[tokio::test]
    async fn cancelled_approval_errors_with_approval_cancelled() {
        let wf = workflow();
        let graph = GraphIndex::build(&wf).unwrap();
        let outputs = HashMap::new();
        let variables = HashMap::new();
        let input = json!(null);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let coordinator = Arc::new(ApprovalCoordinator::new());
        let view = ExecutorView::new(
            &graph,
            &outputs,
            &variables,
            &input,
            PathBuf::from("/tmp"),
            AbortHandle(Arc::new(CancellationToken::new())),
            tx,
            "exec-1",
            coordinator.clone(),
        );

        let execute_fut = ApprovalExecutor.execute(&wf.nodes[0], &view);
        tokio::pin!(execute_fut);

        // Poll once so `register` runs and inserts the pending wait,
        // then cancel it from outside before polling to completion.
        std::future::poll_fn(|cx| {
            let _ = execute_fut.as_mut().poll(cx);
            std::task::Poll::Ready(())
        })
        .await;
        assert_eq!(coordinator.pending_count("exec-1"), 1);
        coordinator.cancel("exec-1", "ap");

        let result = execute_fut.await;
        assert!(matches!(result, Err(NodeError::ApprovalCancelled)));
    }
}
