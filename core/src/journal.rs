//! Event Journal (C6) — append-only per-execution record of
//! [`ExecutionEvent`]s, folded into an [`ExecutionSummary`], and replayed
//! to late subscribers.
//!
//! Single-writer discipline (§5): appends are serialized through a tokio
//! mutex guarding the in-memory log plus, when a root directory is
//! configured, the on-disk JSONL file. The journal — not scheduler
//! in-memory state — is the source of truth for "what did happen"; the
//! scheduler's state is the source of truth for "what is happening".

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

use crate::events::ExecutionEvent;
use crate::model::{ExecutionStatus, ExecutionSummary, NodeStatus, NodeSummary};

/// One journal entry: a monotonic timestamp plus the event it recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub event: ExecutionEvent,
}

struct JournalState {
    records: Vec<EventRecord>,
    summary: ExecutionSummary,
}

/// Per-execution append-only journal plus derived summary.
pub struct EventJournal {
    root: Option<PathBuf>,
    state: Mutex<JournalState>,
}

impl EventJournal {
    /// In-memory-only journal (no JSONL file written).
    pub fn in_memory(execution_id: String, workflow_id: String, input: serde_json::Value) -> Self {
        Self {
            root: None,
            state: Mutex::new(JournalState {
                records: Vec::new(),
                summary: ExecutionSummary {
                    execution_id,
                    workflow_id,
                    input,
                    status: ExecutionStatus::Running,
                    started_at: Utc::now(),
                    completed_at: None,
                    result: None,
                    replay: None,
                    nodes: HashMap::new(),
                },
            }),
        }
    }

    /// A journal that also appends every record to
    /// `{root}/{execution_id}/events.jsonl` and write-tmp-then-renames
    /// `summary.json` after each fold.
    pub fn with_file_root(
        root: impl Into<PathBuf>,
        execution_id: String,
        workflow_id: String,
        input: serde_json::Value,
    ) -> Self {
        Self { root: Some(root.into()), ..Self::in_memory(execution_id, workflow_id, input) }
    }

    /// Append one event, fold it into the running summary, and persist
    /// it. Returns the record so the caller can forward it to live
    /// subscribers in the same order it was written.
    #[instrument(skip(self, event))]
    pub async fn append(&self, event: ExecutionEvent) -> EventRecord {
        let record = EventRecord { timestamp: Utc::now(), event };

        let mut guard = self.state.lock().await;
        fold_into_summary(&mut guard.summary, &record.event);
        guard.records.push(record.clone());

        if let Some(root) = &self.root {
            let exec_dir = root.join(&guard.summary.execution_id);
            let _ = fs::create_dir_all(&exec_dir).await;
            if let Ok(line) = serde_json::to_string(&record) {
                if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(exec_dir.join("events.jsonl")).await {
                    let _ = file.write_all(line.as_bytes()).await;
                    let _ = file.write_all(b"\n").await;
                }
            }
            write_summary_atomic(&exec_dir, &guard.summary).await;
        }

        record
    }

    /// Full history, in append order — the prefix a fresh subscriber
    /// replays before switching to live events.
    pub async fn history(&self) -> Vec<EventRecord> {
        self.state.lock().await.records.clone()
    }

    /// History strictly after `after`, per the subscription contract's
    /// "resume-after-timestamp" semantics (§5 ordering guarantee v).
    pub async fn history_after(&self, after: DateTime<Utc>) -> Vec<EventRecord> {
        self.state
            .lock()
            .await
            .records
            .iter()
            .filter(|r| r.timestamp > after)
            .cloned()
            .collect()
    }

    pub async fn summary(&self) -> ExecutionSummary {
        self.state.lock().await.summary.clone()
    }
}

async fn write_summary_atomic(exec_dir: &std::path::Path, summary: &ExecutionSummary) {
    let Ok(bytes) = serde_json::to_vec_pretty(summary) else { return };
    let tmp = exec_dir.join(format!(".tmp-{}", Uuid::new_v4()));
    if fs::write(&tmp, &bytes).await.is_ok() {
        let _ = fs::rename(&tmp, exec_dir.join("summary.json")).await;
    }
}

/// Fold one event into the running summary: `execution-start` seeds it,
/// `node-*` events update per-node mini-summaries, `execution-*`
/// terminal events close it out. This is the sole place summary
/// derivation logic lives, so a summary rebuilt from a persisted
/// `events.jsonl` (by replaying every record through this function) is
/// always consistent with the live in-memory one.
pub fn fold_into_summary(summary: &mut ExecutionSummary, event: &ExecutionEvent) {
    match event {
        ExecutionEvent::ExecutionStart { .. } => {
            summary.status = ExecutionStatus::Running;
        }
        ExecutionEvent::NodeStart { node_id, .. } => {
            summary.nodes.insert(node_id.clone(), NodeSummary { status: NodeStatus::Running, error: None });
        }
        ExecutionEvent::NodeComplete { node_id, .. } => {
            summary.nodes.insert(node_id.clone(), NodeSummary { status: NodeStatus::Complete, error: None });
        }
        ExecutionEvent::NodeError { node_id, error } => {
            summary.nodes.insert(
                node_id.clone(),
                NodeSummary { status: NodeStatus::Error, error: Some(error.clone()) },
            );
        }
        ExecutionEvent::NodeWaiting { node_id, .. } => {
            summary.nodes.insert(node_id.clone(), NodeSummary { status: NodeStatus::Waiting, error: None });
        }
        ExecutionEvent::NodeSkipped { node_id, .. } => {
            summary.nodes.insert(node_id.clone(), NodeSummary { status: NodeStatus::Skipped, error: None });
        }
        ExecutionEvent::ExecutionComplete { result } => {
            summary.status = ExecutionStatus::Complete;
            summary.completed_at = Some(Utc::now());
            summary.result = Some(result.clone());
        }
        ExecutionEvent::ExecutionError { error } => {
            summary.status = if error == "Execution interrupted" { ExecutionStatus::Interrupted } else { ExecutionStatus::Error };
            summary.completed_at = Some(Utc::now());
            summary.result = Some(serde_json::json!({ "error": error }));
        }
        ExecutionEvent::NodeOutput { .. } | ExecutionEvent::NodeEvolution { .. } | ExecutionEvent::ValidationError { .. } => {}
    }
}

/// Thread-safe handle to a journal, cheap to clone and pass into every
/// node task and into the subscription hub.
pub type SharedJournal = Arc<EventJournal>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn append_is_ordered_and_folds_summary() {
        let journal = EventJournal::in_memory("exec-1".into(), "wf-1".into(), json!("hello"));
        journal.append(ExecutionEvent::ExecutionStart { execution_id: "exec-1".into(), workflow_id: "wf-1".into() }).await;
        journal.append(ExecutionEvent::NodeStart { node_id: "a".into(), node_name: "A".into() }).await;
        journal.append(ExecutionEvent::NodeComplete { node_id: "a".into(), result: json!("x") }).await;
        journal.append(ExecutionEvent::ExecutionComplete { result: json!({"A": "x"}) }).await;

        let history = journal.history().await;
        assert_eq!(history.len(), 4);
        assert!(matches!(history[0].event, ExecutionEvent::ExecutionStart { .. }));
        assert!(matches!(history[3].event, ExecutionEvent::ExecutionComplete { .. }));

        let summary = journal.summary().await;
        assert_eq!(summary.status, ExecutionStatus::Complete);
        assert_eq!(summary.nodes.get("a").unwrap().status, NodeStatus::Complete);
    }

    #[tokio::test]
    async fn history_after_filters_by_timestamp() {
        let journal = EventJournal::in_memory("exec-2".into(), "wf-1".into(), json!(null));
        let first = journal.append(ExecutionEvent::ExecutionStart { execution_id: "exec-2".into(), workflow_id: "wf-1".into() }).await;
        journal.append(ExecutionEvent::NodeStart { node_id: "a".into(), node_name: "A".into() }).await;

        let after = journal.history_after(first.timestamp).await;
        assert_eq!(after.len(), 1);
    }
}
