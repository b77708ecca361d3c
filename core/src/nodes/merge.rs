//! `merge` executor (§4.7): joins several predecessor branches into one
//! object, keyed by predecessor name, with no other transformation.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::NodeError;
use crate::executor::{Executor, ExecutorOutput, ExecutorView};
use crate::model::Node;

pub struct MergeExecutor;

#[async_trait]
impl Executor for MergeExecutor {
    async fn execute(&self, node: &Node, view: &ExecutorView<'_>) -> Result<ExecutorOutput, NodeError> {
        let map: serde_json::Map<String, Value> = view.predecessor_outputs(&node.id).into_iter().collect();
        Ok(ExecutorOutput::value(Value::Object(map)))
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

    #[tokio::test]
    async fn merge_keys_outputs_by_predecessor_name() {
        let wf = Workflow {
            id: "wf".into(),
            name: "wf".into(),
            description: None,
            working_directory: None,
            nodes: vec![
                Node { id: "a".into(), kind: "input".into(), position: None, data: NodeData { name: "A".into(), config: json!({}) } },
                Node { id: "b".into(), kind: "input".into(), position: None, data: NodeData { name: "B".into(), config: json!({}) } },
                Node { id: "m".into(), kind: "merge".into(), position: None, data: NodeData { name: "Merge".into(), config: json!({}) } },
            ],
            edges: vec![
                Edge { id: "e1".into(), source: "a".into(), target: "m".into(), source_handle: None, target_handle: None, edge_type: None },
                Edge { id: "e2".into(), source: "b".into(), target: "m".into(), source_handle: None, target_handle: None, edge_type: None },
            ],
        };
        let graph = GraphIndex::build(&wf).unwrap();
        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), json!("x"));
        outputs.insert("b".to_string(), json!(42));
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

        let result = MergeExecutor.execute(&wf.nodes[2], &view).await.unwrap();
        assert_eq!(result.output, json!({ "A": "x", "B": 42 }));
    }
}
