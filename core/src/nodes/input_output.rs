//! `input` and `output` executors (§4.7): the two node types that exist
//! purely to mark where workflow input enters and where one branch's
//! result gets surfaced, with no transformation of their own.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::NodeError;
use crate::executor::{Executor, ExecutorOutput, ExecutorView};
use crate::model::Node;

/// Echoes the workflow's input verbatim. Usually the sole root of the
/// graph, but nothing here depends on that — it ignores predecessors
/// entirely.
pub struct InputExecutor;

#[async_trait]
impl Executor for InputExecutor {
    async fn execute(&self, _node: &Node, view: &ExecutorView<'_>) -> Result<ExecutorOutput, NodeError> {
        Ok(ExecutorOutput::value(view.workflow_input().clone()))
    }
}

/// Surfaces an upstream result as a named output. A single predecessor's
/// output passes through verbatim; more than one is consolidated into an
/// object keyed by predecessor name, the same keying
/// [`ExecutorView::predecessor_outputs`] uses elsewhere.
pub struct OutputExecutor;

#[async_trait]
impl Executor for OutputExecutor {
    async fn execute(&self, node: &Node, view: &ExecutorView<'_>) -> Result<ExecutorOutput, NodeError> {
        let mut predecessors = view.predecessor_outputs(&node.id);
        match predecessors.len() {
            0 => Ok(ExecutorOutput::value(Value::Null)),
            1 => Ok(ExecutorOutput::value(predecessors.drain().next().unwrap().1)),
            _ => {
                let map: serde_json::Map<String, Value> = predecessors.into_iter().collect();
                Ok(ExecutorOutput::value(Value::Object(map)))
            }
        }
    }
}
