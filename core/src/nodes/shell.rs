//! `shell` executor (§4.7): spawns a subprocess under the execution's
//! working directory, streams its stdout/stderr as events, and honors a
//! configurable timeout plus cooperative cancellation.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::NodeError;
use crate::events::AgentEvent;
use crate::executor::{Executor, ExecutorOutput, ExecutorView};
use crate::model::Node;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

fn timeout_from_config(node: &Node) -> Duration {
    node.data
        .config
        .get("timeoutMs")
        .and_then(Value::as_u64)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_TIMEOUT)
}

async fn run_shell(node: &Node, view: &ExecutorView<'_>) -> Result<ExecutorOutput, NodeError> {
    let command = node.data.config.get("command").and_then(Value::as_str).unwrap_or_default();
    let command = view.interpolate(command);
    if command.trim().is_empty() {
        return Err(NodeError::MissingInput("command".to_string()));
    }

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(&command)
        .current_dir(view.working_directory())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| NodeError::message(format!("failed to spawn shell command: {e}")))?;

    let mut stdout_lines = BufReader::new(child.stdout.take().expect("piped stdout")).lines();
    let mut stderr_lines = BufReader::new(child.stderr.take().expect("piped stderr")).lines();

    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut stdout_done = false;
    let mut stderr_done = false;

    let exit_status = loop {
        tokio::select! {
            line = stdout_lines.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        view.emit(AgentEvent::TextDelta { text: line.clone() });
                        stdout.push_str(&line);
                        stdout.push('\n');
                    }
                    _ => stdout_done = true,
                }
            }
            line = stderr_lines.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        view.emit(AgentEvent::ToolResult { name: "stderr".to_string(), output: json!(line) });
                        stderr.push_str(&line);
                        stderr.push('\n');
                    }
                    _ => stderr_done = true,
                }
            }
            status = child.wait(), if stdout_done && stderr_done => {
                break status.map_err(|e| NodeError::message(format!("shell command wait failed: {e}")))?;
            }
        }
    };

    let exit_code = exit_status.code().unwrap_or(-1);
    let result = stdout.trim().to_string();
    Ok(ExecutorOutput::value(json!({
        "stdout": stdout,
        "stderr": stderr,
        "exitCode": exit_code,
        "result": result,
    })))
}

pub struct ShellExecutor;

#[async_trait]
impl Executor for ShellExecutor {
    async fn execute(&self, node: &Node, view: &ExecutorView<'_>) -> Result<ExecutorOutput, NodeError> {
        let timeout = timeout_from_config(node);
        let abort = view.abort();

        tokio::select! {
            biased;
            _ = abort.cancelled() => Err(NodeError::message("shell command aborted")),
            result = tokio::time::timeout(timeout, run_shell(node, view)) => {
                result.map_err(|_| NodeError::Timeout(timeout))?
            }
        }
    }
}
