//! Approval & Reflection Coordinator (C9) — human-in-the-loop waits.
//!
//! Modeled as message-passing, per §9's design note: an approval-type
//! node registers a oneshot continuation keyed by `(execution_id,
//! node_id)` and yields; `submit_approval`/`cancel_approval` resolve it
//! from outside. This is deliberately not a poll loop over shared state.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::events::ApprovalResponse;
use crate::model::NodeId;

/// Either a human resolved the wait, or it was cancelled (interrupt, or
/// an explicit `cancel_approval`).
#[derive(Debug, Clone)]
pub enum ApprovalOutcome {
    Resolved(ApprovalResponse),
    Cancelled,
}

type Key = (String, NodeId);

/// Per-process registry of pending approval waits. One instance is
/// shared across all executions; keys are namespaced by execution id so
/// concurrent runs never collide.
#[derive(Default)]
pub struct ApprovalCoordinator {
    pending: Mutex<HashMap<Key, oneshot::Sender<ApprovalOutcome>>>,
}

impl ApprovalCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the approval executor when a node enters `waiting`.
    /// Returns a receiver the executor awaits; resolves exactly once.
    pub fn register(&self, execution_id: &str, node_id: &str) -> oneshot::Receiver<ApprovalOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .insert((execution_id.to_string(), node_id.to_string()), tx);
        rx
    }

    /// External resolution: `submit-approval` control event (§6).
    /// Returns `false` if no wait was pending (already resolved,
    /// cancelled, or never registered) — callers treat that as a no-op,
    /// not an error, since the wait may have already timed out.
    pub fn submit(&self, execution_id: &str, node_id: &str, response: ApprovalResponse) -> bool {
        let sender = self
            .pending
            .lock()
            .unwrap()
            .remove(&(execution_id.to_string(), node_id.to_string()));
        match sender {
            Some(tx) => tx.send(ApprovalOutcome::Resolved(response)).is_ok(),
            None => false,
        }
    }

    /// External cancellation: `cancel_approval`, or one leg of
    /// `interrupt()` cancelling every pending wait for an execution.
    pub fn cancel(&self, execution_id: &str, node_id: &str) -> bool {
        let sender = self
            .pending
            .lock()
            .unwrap()
            .remove(&(execution_id.to_string(), node_id.to_string()));
        match sender {
            Some(tx) => tx.send(ApprovalOutcome::Cancelled).is_ok(),
            None => false,
        }
    }

    /// Cancel every pending approval for one execution — called from
    /// the scheduler's `interrupt()` path (§4.9 "Interrupting the
    /// execution cancels all pending approvals for that execution").
    pub fn cancel_execution(&self, execution_id: &str) {
        let mut pending = self.pending.lock().unwrap();
        let keys: Vec<Key> = pending
            .keys()
            .filter(|(exec, _)| exec == execution_id)
            .cloned()
            .collect();
        for key in keys {
            if let Some(tx) = pending.remove(&key) {
                let _ = tx.send(ApprovalOutcome::Cancelled);
            }
        }
    }

    pub fn pending_count(&self, execution_id: &str) -> usize {
        self.pending
            .lock()
            .unwrap()
            .keys()
            .filter(|(exec, _)| exec == execution_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn submit_resolves_the_registered_wait() {
        let coordinator = ApprovalCoordinator::new();
        let rx = coordinator.register("exec-1", "approve-a");

        assert!(coordinator.submit(
            "exec-1",
            "approve-a",
            ApprovalResponse { approved: true, feedback: None, responded_at: Utc::now() }
        ));

        match rx.await.unwrap() {
            ApprovalOutcome::Resolved(resp) => assert!(resp.approved),
            ApprovalOutcome::Cancelled => panic!("expected resolution"),
        }
    }

    #[tokio::test]
    async fn cancel_execution_cancels_only_that_executions_waits() {
        let coordinator = ApprovalCoordinator::new();
        let rx1 = coordinator.register("exec-1", "a");
        let rx2 = coordinator.register("exec-2", "a");

        coordinator.cancel_execution("exec-1");

        assert!(matches!(rx1.await.unwrap(), ApprovalOutcome::Cancelled));
        assert_eq!(coordinator.pending_count("exec-2"), 1);
        drop(rx2);
    }

    #[tokio::test]
    async fn submit_without_registration_is_a_no_op() {
        let coordinator = ApprovalCoordinator::new();
        assert!(!coordinator.submit("exec-1", "missing", ApprovalResponse { approved: true, feedback: None, responded_at: Utc::now() }));
    }
}
