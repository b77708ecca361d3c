//! Subscription Fan-out (C10) — multiplex a running execution's event
//! stream to N live subscribers, each optionally resuming after a given
//! timestamp (§5 ordering guarantee v, §6 `subscribe-execution`).
//!
//! A subscriber's stream is: the journal's history after its requested
//! timestamp, replayed synchronously, followed by live events as they
//! are appended. Add/remove of subscriber channels is serialized with
//! fan-out publish so no live event is ever missed or duplicated between
//! the historical replay and the live tail.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::journal::{EventJournal, EventRecord};

const CHANNEL_CAPACITY: usize = 1024;

struct HubInner {
    sender: broadcast::Sender<EventRecord>,
}

/// Per-execution fan-out hub. Create one alongside the execution's
/// [`EventJournal`] and call [`SubscriptionHub::publish`] with every
/// record the journal appends.
pub struct SubscriptionHub {
    journal: Arc<EventJournal>,
    inner: Mutex<HubInner>,
}

impl SubscriptionHub {
    pub fn new(journal: Arc<EventJournal>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { journal, inner: Mutex::new(HubInner { sender }) }
    }

    /// Forward one journal record to all currently-live subscribers.
    /// Must be called with records in append order (the scheduler does
    /// this by awaiting `journal.append(...)` before calling this).
    pub async fn publish(&self, record: EventRecord) {
        let inner = self.inner.lock().await;
        // A broadcast send fails only when there are no receivers;
        // that's a normal, non-error state (nobody is subscribed yet).
        let _ = inner.sender.send(record);
    }

    /// Subscribe: returns a stream that yields the journal's history
    /// after `after_timestamp` (or the full history, if `None`) and then
    /// continues with live events. The subscriber's join and any
    /// concurrent publish are serialized through the hub's lock so the
    /// historical replay and the live tail never overlap or gap.
    pub async fn subscribe(&self, after_timestamp: Option<DateTime<Utc>>) -> impl Stream<Item = EventRecord> {
        let inner = self.inner.lock().await;
        let receiver = inner.sender.subscribe();
        let backlog = match after_timestamp {
            Some(ts) => self.journal.history_after(ts).await,
            None => self.journal.history().await,
        };
        drop(inner);

        let live = BroadcastStream::new(receiver).filter_map(|res| res.ok());
        tokio_stream::iter(backlog).chain(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ExecutionEvent;
    use serde_json::json;

    #[tokio::test]
    async fn late_subscriber_gets_prefix_then_live_events() {
        let journal = Arc::new(EventJournal::in_memory("exec-1".into(), "wf-1".into(), json!(null)));
        let hub = SubscriptionHub::new(journal.clone());

        let r1 = journal.append(ExecutionEvent::ExecutionStart { execution_id: "exec-1".into(), workflow_id: "wf-1".into() }).await;
        hub.publish(r1.clone()).await;

        let mut stream = Box::pin(hub.subscribe(None).await);

        let r2 = journal.append(ExecutionEvent::NodeStart { node_id: "a".into(), node_name: "A".into() }).await;
        hub.publish(r2.clone()).await;

        let first = stream.next().await.unwrap();
        assert!(matches!(first.event, ExecutionEvent::ExecutionStart { .. }));
        let second = stream.next().await.unwrap();
        assert!(matches!(second.event, ExecutionEvent::NodeStart { .. }));
    }

    #[tokio::test]
    async fn resume_after_timestamp_skips_earlier_history() {
        let journal = Arc::new(EventJournal::in_memory("exec-2".into(), "wf-1".into(), json!(null)));
        let hub = SubscriptionHub::new(journal.clone());

        let r1 = journal.append(ExecutionEvent::ExecutionStart { execution_id: "exec-2".into(), workflow_id: "wf-1".into() }).await;
        hub.publish(r1.clone()).await;
        let r2 = journal.append(ExecutionEvent::NodeStart { node_id: "a".into(), node_name: "A".into() }).await;
        hub.publish(r2.clone()).await;

        let mut stream = Box::pin(hub.subscribe(Some(r1.timestamp)).await);
        let only = stream.next().await.unwrap();
        assert!(matches!(only.event, ExecutionEvent::NodeStart { .. }));
    }
}
