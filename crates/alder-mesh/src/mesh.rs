//! The mesh itself: subscription registry and audit-synchronized publish.

use crate::pattern::TopicPattern;
use crate::queue::{OverflowPolicy, PushOutcome, SubscriberQueue};
use crate::MeshError;
use alder_audit::AuditLog;
use alder_types::{event_types, ComponentId, Event, Severity};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Handler invoked for each delivered event, on the subscription's worker.
pub type Handler = Arc<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// Identifier of a live subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle returned by [`TriggerMesh::subscribe`]; pass it back to
/// [`TriggerMesh::unsubscribe`] to cancel.
#[derive(Clone, Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub pattern: String,
    pub name: String,
}

/// Per-subscription tuning.
#[derive(Clone, Debug)]
pub struct SubscriptionOptions {
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            overflow: OverflowPolicy::BlockPublisher,
        }
    }
}

/// Result of one publish.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchResult {
    /// Audit sequence assigned to the event.
    pub sequence: u64,
    pub matched: usize,
    pub enqueued: usize,
    pub dropped: usize,
    pub spilled: usize,
}

/// Mesh-wide counters.
#[derive(Clone, Debug)]
pub struct MeshStats {
    pub published: u64,
    pub subscriptions: usize,
}

struct SubscriberEntry {
    id: SubscriptionId,
    name: String,
    pattern: TopicPattern,
    overflow: OverflowPolicy,
    queue: Arc<SubscriberQueue>,
    worker: JoinHandle<()>,
}

/// The in-process event bus. Cheap to clone.
#[derive(Clone)]
pub struct TriggerMesh {
    audit: AuditLog,
    subscribers: Arc<Mutex<Vec<SubscriberEntry>>>,
    next_id: Arc<AtomicU64>,
    published: Arc<AtomicU64>,
}

impl TriggerMesh {
    pub fn new(audit: AuditLog) -> Self {
        Self {
            audit,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Register a handler for every event matching `pattern`. `name` labels
    /// the subscription in overflow audit records and logs.
    pub fn subscribe(
        &self,
        name: impl Into<String>,
        pattern: &str,
        options: SubscriptionOptions,
        handler: Handler,
    ) -> Result<Subscription, MeshError> {
        let parsed = TopicPattern::parse(pattern)?;
        let name = name.into();
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let queue = Arc::new(SubscriberQueue::new(options.queue_capacity));

        let worker_queue = Arc::clone(&queue);
        let worker = tokio::spawn(async move {
            while let Some(event) = worker_queue.pop().await {
                handler(event).await;
            }
        });

        let entry = SubscriberEntry {
            id,
            name: name.clone(),
            pattern: parsed,
            overflow: options.overflow,
            queue,
            worker,
        };
        self.subscribers
            .lock()
            .expect("subscriber registry poisoned")
            .push(entry);

        tracing::debug!(subscription = %name, pattern, "mesh subscription registered");
        Ok(Subscription {
            id,
            pattern: pattern.to_string(),
            name,
        })
    }

    /// Cancel a subscription. Queued events are discarded; an in-flight
    /// handler completes.
    pub fn unsubscribe(&self, subscription: &Subscription) -> Result<(), MeshError> {
        let mut subscribers = self
            .subscribers
            .lock()
            .expect("subscriber registry poisoned");
        let position = subscribers
            .iter()
            .position(|e| e.id == subscription.id)
            .ok_or(MeshError::UnknownSubscription(subscription.id.0))?;
        let entry = subscribers.remove(position);
        drop(subscribers);

        // Closing the queue lets the worker finish its in-flight handler and
        // exit; dropping the JoinHandle detaches it.
        entry.queue.close();
        tracing::debug!(subscription = %entry.name, "mesh subscription cancelled");
        Ok(())
    }

    /// Publish an event: durably audit it, then deliver to every matching
    /// subscription under its overflow policy. Fails if and only if the
    /// audit append fails; delivery shortfalls are reported in the result.
    pub async fn publish(&self, event: Event) -> Result<DispatchResult, MeshError> {
        let sequence = self.audit.append(event.clone()).await?;
        self.published.fetch_add(1, Ordering::Relaxed);

        // Snapshot matching queues so no registry lock is held while
        // pushing (a BlockPublisher push can suspend).
        let matches: Vec<(String, OverflowPolicy, Arc<SubscriberQueue>)> = {
            let subscribers = self
                .subscribers
                .lock()
                .expect("subscriber registry poisoned");
            subscribers
                .iter()
                .filter(|e| e.pattern.matches(&event.event_type))
                .map(|e| (e.name.clone(), e.overflow, Arc::clone(&e.queue)))
                .collect()
        };

        let mut result = DispatchResult {
            sequence,
            matched: matches.len(),
            enqueued: 0,
            dropped: 0,
            spilled: 0,
        };

        for (name, policy, queue) in matches {
            match queue.push(event.clone(), policy).await {
                PushOutcome::Enqueued => result.enqueued += 1,
                PushOutcome::Dropped => {
                    result.dropped += 1;
                    tracing::warn!(subscription = %name, event = %event.event_type, "subscriber queue overflowed, event dropped");
                }
                PushOutcome::Spilled(spilled) => {
                    result.spilled += 1;
                    self.spill_to_audit(&name, &spilled).await;
                }
                PushOutcome::Closed => {}
            }
        }

        Ok(result)
    }

    async fn spill_to_audit(&self, subscription: &str, event: &Event) {
        let overflow = Event::new(
            event_types::BACKPRESSURE_OVERFLOW,
            ComponentId::new("mesh"),
        )
        .with_severity(Severity::Medium)
        .with_correlation(event.correlation_id.clone())
        .with_payload(serde_json::json!({
            "subscription": subscription,
            "event_id": event.id.0,
            "event_type": event.event_type.as_str(),
        }));
        if let Err(err) = self.audit.append(overflow).await {
            tracing::error!(%err, subscription, "failed to audit spilled event");
        }
    }

    pub fn stats(&self) -> MeshStats {
        MeshStats {
            published: self.published.load(Ordering::Relaxed),
            subscriptions: self
                .subscribers
                .lock()
                .expect("subscriber registry poisoned")
                .len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_types::EventType;
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn mesh() -> (TriggerMesh, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::open(dir.path().join("audit.log")).await.unwrap();
        (TriggerMesh::new(audit), dir)
    }

    fn event(event_type: &str, n: u32) -> Event {
        Event::new(event_type, ComponentId::new("tests"))
            .with_payload(serde_json::json!({ "n": n }))
    }

    #[tokio::test]
    async fn publish_delivers_to_matching_subscribers_in_order() {
        let (mesh, _dir) = mesh().await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        mesh.subscribe(
            "collector",
            "error.*",
            SubscriptionOptions::default(),
            handler(move |e| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(e.payload["n"].as_u64().unwrap());
                }
            }),
        )
        .unwrap();

        for n in 0..10u32 {
            mesh.publish(event("error.detected", n)).await.unwrap();
        }
        mesh.publish(event("warning.raised", 99)).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..10 {
            seen.push(rx.recv().await.unwrap());
        }
        assert_eq!(seen, (0..10).collect::<Vec<u64>>());
        assert!(
            tokio::time::timeout(Duration::from_millis(50), rx.recv())
                .await
                .is_err(),
            "non-matching event must not be delivered"
        );
    }

    #[tokio::test]
    async fn every_publish_is_audited_before_dispatch() {
        let (mesh, _dir) = mesh().await;
        let result = mesh.publish(event("boot.complete", 0)).await.unwrap();
        assert_eq!(result.sequence, 0);
        assert_eq!(result.matched, 0);

        let entries = mesh.audit().read_range(0, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].event.event_type,
            EventType::new("boot.complete")
        );
    }

    #[tokio::test]
    async fn spill_policy_records_overflow_in_audit() {
        let (mesh, _dir) = mesh().await;
        let (gate_tx, gate_rx) = mpsc::unbounded_channel::<()>();
        let gate_rx = Arc::new(tokio::sync::Mutex::new(gate_rx));

        mesh.subscribe(
            "slow",
            "error.*",
            SubscriptionOptions {
                queue_capacity: 1,
                overflow: OverflowPolicy::SpillToAuditLog,
            },
            handler(move |_| {
                let gate_rx = Arc::clone(&gate_rx);
                async move {
                    // Hold the worker until the test releases it.
                    gate_rx.lock().await.recv().await;
                }
            }),
        )
        .unwrap();

        // First fills the worker, second fills the queue, third spills.
        mesh.publish(event("error.detected", 0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        mesh.publish(event("error.detected", 1)).await.unwrap();
        let result = mesh.publish(event("error.detected", 2)).await.unwrap();
        assert_eq!(result.spilled, 1);

        drop(gate_tx);

        let entries = mesh.audit().read_recent(10).await.unwrap();
        assert!(entries.iter().any(|e| {
            e.event.event_type.as_str() == event_types::BACKPRESSURE_OVERFLOW
                && e.event.payload["subscription"] == "slow"
        }));
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let (mesh, _dir) = mesh().await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let sub = mesh
            .subscribe(
                "once",
                "*",
                SubscriptionOptions::default(),
                handler(move |e| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(e.event_type.as_str().to_string());
                    }
                }),
            )
            .unwrap();

        mesh.publish(event("a.b", 0)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "a.b");

        mesh.unsubscribe(&sub).unwrap();
        mesh.publish(event("a.c", 1)).await.unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(50), rx.recv())
                .await
                .map(|o| o.is_none())
                .unwrap_or(true)
        );
        assert_eq!(mesh.stats().subscriptions, 0);
    }

    #[tokio::test]
    async fn publish_fails_when_audit_refuses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let audit = AuditLog::open(&path).await.unwrap();
        let mesh = TriggerMesh::new(audit.clone());

        mesh.publish(event("a.b", 0)).await.unwrap();

        // Flip one hex digit of the trailing correlation id: the frame
        // still parses but no longer matches its hash.
        let mut bytes = std::fs::read(&path).unwrap();
        let pos = bytes.len() - 10;
        bytes[pos] = if bytes[pos] == b'0' { b'1' } else { b'0' };
        std::fs::write(&path, &bytes).unwrap();
        let _ = audit.verify_chain(0, 1).await.unwrap();
        assert!(audit.is_poisoned());

        assert!(mesh.publish(event("a.b", 1)).await.is_err());
    }
}
