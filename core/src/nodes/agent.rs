//! Shared agent runner (§4.8): the one place session continuation, retry
//! bookkeeping, prompt assembly, and transcript accumulation live, reused
//! by every agent-shaped node type (`agent-A`, `agent-B`, and —
//! partially, via [`ReflectionExecutor`] — `reflection`).
//!
//! [`AgentBackend`] is the process boundary: a real implementation talks
//! to a remote streaming agent process; tests drive a deterministic
//! fake so the scheduler's loop/retry logic can be exercised without a
//! network.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::approval::ApprovalOutcome;
use crate::error::NodeError;
use crate::events::{AgentEvent, ApprovalResponse};
use crate::executor::{Executor, ExecutorOutput, ExecutorView};
use crate::model::Node;

/// One completed call to an agent process: its full event stream plus
/// whatever session/structured-output metadata it surfaced.
pub struct AgentRun {
    pub events: Vec<AgentEvent>,
    pub session_id: Option<String>,
    pub structured_output: Option<Value>,
}

/// The remote-streaming-process abstraction §4.8 describes: `execute`
/// plus `getSessionId`/`getStructuredOutput`, collapsed here into one
/// call that returns the whole run since the shared runner only needs
/// the result, not incremental control.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    async fn run(&self, agent_type: &str, prompt: &str, session_id: Option<&str>) -> Result<AgentRun, NodeError>;
}

fn session_key(node_id: &str) -> String {
    format!("agent.session.{node_id}.sessionId")
}
fn run_count_key(node_id: &str) -> String {
    format!("node.{node_id}.runCount")
}
fn retry_count_key(node_id: &str) -> String {
    format!("node.{node_id}.retryCount")
}
fn transcript_key(node_id: &str) -> String {
    format!("agent.session.{node_id}.transcript")
}

/// Whether a predecessor of `node_id` is an approval node whose latest
/// response was a rejection — the "rejection-retry" leg of step 1.
/// Returns the rejection comment (possibly empty) when so.
fn rejection_feedback(node_id: &str, view: &ExecutorView<'_>) -> Option<String> {
    let approval_names: Vec<String> = view
        .graph()
        .predecessors(node_id)
        .iter()
        .filter_map(|pred_id| view.graph().node(pred_id))
        .filter(|n| n.kind == crate::model::node_kind::APPROVAL)
        .map(|n| n.data.name.clone())
        .collect();

    let predecessor_outputs = view.predecessor_outputs(node_id);
    approval_names.iter().find_map(|name| {
        let output = predecessor_outputs.get(name)?;
        let approved = output.get("approved")?.as_bool()?;
        if approved {
            return None;
        }
        Some(output.get("feedback").and_then(Value::as_str).unwrap_or_default().to_string())
    })
}

/// Section a run's events into the sectioned transcript format (§4.8
/// step 5): run header, prompt, then one line per event kind.
fn append_transcript(buf: &mut String, attempt: u32, prompt: &str, events: &[AgentEvent]) {
    buf.push_str(&format!("=== run {attempt} ===\n"));
    buf.push_str("[prompt]\n");
    buf.push_str(prompt);
    buf.push('\n');
    for event in events {
        match event {
            AgentEvent::TextDelta { text } => buf.push_str(&format!("[assistant]\n{text}\n")),
            AgentEvent::Thinking { text } => buf.push_str(&format!("[thinking]\n{text}\n")),
            AgentEvent::ToolCall { name, input } => buf.push_str(&format!("[tool-use]\n{name}({input})\n")),
            AgentEvent::ToolResult { name, output } => buf.push_str(&format!("[tool-result]\n{name} -> {output}\n")),
            AgentEvent::TodoList { items } => buf.push_str(&format!("[todo]\n{}\n", items.join(", "))),
            AgentEvent::RunStart { .. } | AgentEvent::Complete { .. } => {}
            AgentEvent::Error { message } => buf.push_str(&format!("[error]\n{message}\n")),
        }
    }
}

/// Pulls the final textual result out of a run's events: the `Complete`
/// event's payload if the backend emitted one, else the concatenation of
/// every `TextDelta`.
fn extract_result(events: &[AgentEvent]) -> Value {
    if let Some(AgentEvent::Complete { result }) = events.iter().rev().find(|e| matches!(e, AgentEvent::Complete { .. })) {
        return result.clone();
    }
    let text: String = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::TextDelta { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("");
    Value::String(text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MaxRetriesPolicy {
    Fail,
    Skip,
    ApproveAnyway,
}

impl MaxRetriesPolicy {
    fn from_config(node: &Node) -> Self {
        match node.data.config.get("onMaxRetries").and_then(Value::as_str) {
            Some("skip") => Self::Skip,
            Some("approve-anyway") => Self::ApproveAnyway,
            _ => Self::Fail,
        }
    }
}

pub struct AgentExecutor {
    agent_type: &'static str,
    backend: std::sync::Arc<dyn AgentBackend>,
}

impl AgentExecutor {
    pub fn new(agent_type: &'static str, backend: std::sync::Arc<dyn AgentBackend>) -> Self {
        Self { agent_type, backend }
    }
}

#[async_trait]
impl Executor for AgentExecutor {
    async fn execute(&self, node: &Node, view: &ExecutorView<'_>) -> Result<ExecutorOutput, NodeError> {
        // Step 1: does this run continue a previous session?
        let continue_session = node.data.config.get("continueSession").and_then(Value::as_bool).unwrap_or(false);
        let persists = node.data.config.get("conversationMode").and_then(Value::as_str) == Some("persist");
        let feedback = if continue_session { rejection_feedback(&node.id, view) } else { None };
        let existing_session = view.get_variable(&session_key(&node.id)).and_then(Value::as_str).map(str::to_string);
        let rejection_retry = feedback.is_some();
        let is_continuation = rejection_retry || (persists && existing_session.is_some());

        // Step 2: retry/run bookkeeping, enforce maxRetries.
        let run_count = view.get_variable(&run_count_key(&node.id)).and_then(Value::as_u64).unwrap_or(0);
        let retry_count = view.get_variable(&retry_count_key(&node.id)).and_then(Value::as_u64).unwrap_or(0);
        let max_retries = node.data.config.get("maxRetries").and_then(Value::as_u64).unwrap_or(u64::MAX);
        let next_retry_count = if rejection_retry { retry_count + 1 } else { retry_count };

        if rejection_retry && next_retry_count > max_retries {
            let existing_transcript = view.get_variable(&transcript_key(&node.id)).cloned().unwrap_or(Value::String(String::new()));
            return match MaxRetriesPolicy::from_config(node) {
                MaxRetriesPolicy::Fail => Err(NodeError::message("max retries exceeded")),
                MaxRetriesPolicy::Skip => Ok(ExecutorOutput::value(json!({
                    "result": Value::Null,
                    "runCount": run_count,
                    "transcript": existing_transcript,
                    "skipped": true,
                }))),
                MaxRetriesPolicy::ApproveAnyway => Ok(ExecutorOutput::value(json!({
                    "result": Value::Null,
                    "runCount": run_count,
                    "transcript": existing_transcript,
                    "approvedAnyway": true,
                }))),
            };
        }

        // Step 3: build the prompt.
        let user_query = node.data.config.get("userQuery").and_then(Value::as_str).unwrap_or_default();
        let base_prompt = view.interpolate(user_query);
        let prompt = match &feedback {
            Some(comment) => {
                let template = node.data.config.get("rejectionFeedbackTemplate").and_then(Value::as_str).unwrap_or("Previous attempt was rejected: {{feedback}}");
                let prefix = template.replace("{{feedback}}", comment);
                format!("{prefix}\n{base_prompt}")
            }
            None => base_prompt,
        };

        // Step 4: working directory must exist.
        if !view.working_directory().is_dir() {
            return Err(NodeError::message(format!("working directory '{}' does not exist", view.working_directory().display())));
        }

        let session_for_call = if is_continuation { existing_session.as_deref() } else { None };
        let run = self.backend.run(self.agent_type, &prompt, session_for_call).await?;
        let attempt = run_count + 1;

        // Step 5: stream events upward and accumulate the transcript.
        for event in &run.events {
            view.emit(event.clone());
        }
        let mut transcript = view.get_variable(&transcript_key(&node.id)).and_then(Value::as_str).unwrap_or_default().to_string();
        append_transcript(&mut transcript, attempt as u32, &prompt, &run.events);

        // Step 6: assemble the output.
        let result = extract_result(&run.events);
        let mut output = Map::new();
        if let Some(Value::Object(structured)) = &run.structured_output {
            for (k, v) in structured {
                output.insert(k.clone(), v.clone());
            }
        }
        output.insert("result".to_string(), result);
        output.insert("runCount".to_string(), json!(attempt));
        output.insert("transcript".to_string(), json!(transcript.clone()));

        // Step 7: persist session state for the next run.
        view.set_variable(run_count_key(&node.id), json!(attempt));
        view.set_variable(retry_count_key(&node.id), json!(next_retry_count));
        view.set_variable(transcript_key(&node.id), json!(transcript));
        if let Some(session_id) = run.session_id.or(existing_session) {
            view.set_variable(session_key(&node.id), json!(session_id));
        }

        Ok(ExecutorOutput { output: Value::Object(output), metadata: None, structured_output: run.structured_output })
    }

    fn get_output_handle(&self, _node: &Node, _result: &ExecutorOutput) -> Option<String> {
        None
    }
}

/// `reflection` node (§4.9): runs the same shared agent loop to produce
/// a suggestion, then routes on `applyMode`. `suggest` waits for human
/// sign-off through the same coordinator an `approval` node uses;
/// `dry-run` never applies; `auto-apply` applies immediately. Actually
/// applying a suggestion against workflow storage is a boundary concern
/// this crate doesn't own — `applied` here only records the *decision*.
pub struct ReflectionExecutor {
    inner: AgentExecutor,
}

impl ReflectionExecutor {
    pub fn new(backend: std::sync::Arc<dyn AgentBackend>) -> Self {
        Self { inner: AgentExecutor::new("reflection", backend) }
    }
}

#[async_trait]
impl Executor for ReflectionExecutor {
    async fn execute(&self, node: &Node, view: &ExecutorView<'_>) -> Result<ExecutorOutput, NodeError> {
        let mut suggestion = self.inner.execute(node, view).await?;
        let apply_mode = node.data.config.get("applyMode").and_then(Value::as_str).unwrap_or("suggest");

        let applied = match apply_mode {
            "dry-run" => false,
            "auto-apply" => true,
            _ => {
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
                    ApprovalOutcome::Resolved(ApprovalResponse { approved, .. }) => approved,
                    ApprovalOutcome::Cancelled => return Err(NodeError::ApprovalCancelled),
                }
            }
        };

        if let Value::Object(map) = &mut suggestion.output {
            map.insert("applied".to_string(), json!(applied));
            map.insert("appliedAt".to_string(), json!(Utc::now()));
        }
        Ok(suggestion)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::approval::ApprovalCoordinator;
    use crate::context::AbortHandle;
    use crate::graph::GraphIndex;
    use crate::model::{NodeData, Workflow};

    struct ScriptedBackend {
        replies: Vec<&'static str>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl AgentBackend for ScriptedBackend {
        async fn run(&self, _agent_type: &str, _prompt: &str, _session_id: Option<&str>) -> Result<AgentRun, NodeError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let reply = self.replies.get(i).copied().unwrap_or("DONE");
            Ok(AgentRun { events: vec![AgentEvent::Complete { result: json!(reply) }], session_id: Some("sess-1".to_string()), structured_output: None })
        }
    }

    fn workflow() -> Workflow {
        Workflow {
            id: "wf".into(),
            name: "wf".into(),
            description: None,
            working_directory: None,
            nodes: vec![Node { id: "a".into(), kind: "agent-A".into(), position: None, data: NodeData { name: "A".into(), config: json!({ "userQuery": "go" }) } }],
            edges: vec![],
        }
    }

    fn view<'a>(graph: &'a GraphIndex<'a>, outputs: &'a HashMap<String, Value>, variables: &'a HashMap<String, Value>, input: &'a Value) -> ExecutorView<'a> {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        ExecutorView::new(
            graph,
            outputs,
            variables,
            input,
            PathBuf::from("/tmp"),
            AbortHandle(Arc::new(CancellationToken::new())),
            tx,
            "exec-1",
            Arc::new(ApprovalCoordinator::new()),
        )
    }

    #[tokio::test]
    async fn first_run_produces_run_count_one_and_a_session_id() {
        let wf = workflow();
        let graph = GraphIndex::build(&wf).unwrap();
        let outputs = HashMap::new();
        let variables = HashMap::new();
        let input = json!(null);
        let v = view(&graph, &outputs, &variables, &input);
        let backend = Arc::new(ScriptedBackend { replies: vec!["hi"], calls: AtomicU32::new(0) });
        let executor = AgentExecutor::new("agent-A", backend);

        let result = executor.execute(&wf.nodes[0], &v).await.unwrap();
        assert_eq!(result.output["runCount"], json!(1));
        assert_eq!(result.output["result"], json!("hi"));
        let writes = v.take_variable_writes();
        assert!(writes.iter().any(|(k, _)| k == "agent.session.a.sessionId"));
    }

    #[tokio::test]
    async fn missing_working_directory_is_rejected() {
        let wf = Workflow {
            id: "wf".into(),
            name: "wf".into(),
            description: None,
            working_directory: None,
            nodes: vec![Node { id: "a".into(), kind: "agent-A".into(), position: None, data: NodeData { name: "A".into(), config: json!({ "userQuery": "go", "workingDirectory": "/nope/nope" }) } }],
            edges: vec![],
        };
        let graph = GraphIndex::build(&wf).unwrap();
        let outputs = HashMap::new();
        let variables = HashMap::new();
        let input = json!(null);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let v = ExecutorView::new(
            &graph,
            &outputs,
            &variables,
            &input,
            PathBuf::from("/definitely/does/not/exist"),
            AbortHandle(Arc::new(CancellationToken::new())),
            tx,
            "exec-1",
            Arc::new(ApprovalCoordinator::new()),
        );
        let backend = Arc::new(ScriptedBackend { replies: vec!["hi"], calls: AtomicU32::new(0) });
        let executor = AgentExecutor::new("agent-A", backend);

        let result = executor.execute(&wf.nodes[0], &v).await;
        assert!(result.is_err());
    }
}
