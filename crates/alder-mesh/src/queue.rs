//! Bounded per-subscription queues with pluggable overflow behavior.

use alder_types::Event;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// What to do when a subscriber's queue is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    DropOldest,
    DropNewest,
    BlockPublisher,
    SpillToAuditLog,
}

/// Result of a push attempt, reported back in the dispatch result.
#[derive(Debug, PartialEq)]
pub enum PushOutcome {
    Enqueued,
    /// An event was discarded; for `DropOldest` it is the displaced head,
    /// for `DropNewest` the pushed event itself.
    Dropped,
    /// The event must be recorded as overflow in the audit log instead of
    /// being delivered.
    Spilled(Event),
    Closed,
}

struct Inner {
    deque: VecDeque<Event>,
    closed: bool,
    dropped: u64,
}

/// A bounded FIFO between the mesh and one subscription worker.
pub struct SubscriberQueue {
    capacity: usize,
    inner: Mutex<Inner>,
    /// Signalled when an event is pushed or the queue closes.
    readable: Notify,
    /// Signalled when space frees up, for blocked publishers.
    writable: Notify,
}

impl SubscriberQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                deque: VecDeque::new(),
                closed: false,
                dropped: 0,
            }),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    /// Push under the given policy. Only `BlockPublisher` can suspend.
    pub async fn push(&self, event: Event, policy: OverflowPolicy) -> PushOutcome {
        loop {
            {
                let mut inner = self.inner.lock().expect("queue mutex poisoned");
                if inner.closed {
                    return PushOutcome::Closed;
                }
                if inner.deque.len() < self.capacity {
                    inner.deque.push_back(event);
                    drop(inner);
                    self.readable.notify_one();
                    return PushOutcome::Enqueued;
                }
                match policy {
                    OverflowPolicy::DropOldest => {
                        inner.deque.pop_front();
                        inner.deque.push_back(event);
                        inner.dropped += 1;
                        drop(inner);
                        self.readable.notify_one();
                        return PushOutcome::Dropped;
                    }
                    OverflowPolicy::DropNewest => {
                        inner.dropped += 1;
                        return PushOutcome::Dropped;
                    }
                    OverflowPolicy::SpillToAuditLog => {
                        inner.dropped += 1;
                        return PushOutcome::Spilled(event);
                    }
                    OverflowPolicy::BlockPublisher => {}
                }
            }
            // Queue full under BlockPublisher: wait for the worker to drain.
            self.writable.notified().await;
        }
    }

    /// Pop the next event; `None` once the queue is closed.
    pub async fn pop(&self) -> Option<Event> {
        loop {
            {
                let mut inner = self.inner.lock().expect("queue mutex poisoned");
                if let Some(event) = inner.deque.pop_front() {
                    drop(inner);
                    self.writable.notify_one();
                    return Some(event);
                }
                if inner.closed {
                    return None;
                }
            }
            self.readable.notified().await;
        }
    }

    /// Cancel the subscription: queued events are discarded, the worker
    /// exits after its in-flight handler completes.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        inner.closed = true;
        inner.deque.clear();
        drop(inner);
        self.readable.notify_waiters();
        self.writable.notify_waiters();
        // Wake a possibly-parked publisher or worker that has not yet
        // registered with notify_waiters.
        self.readable.notify_one();
        self.writable.notify_one();
    }

    pub fn depth(&self) -> usize {
        self.inner.lock().expect("queue mutex poisoned").deque.len()
    }

    pub fn dropped(&self) -> u64 {
        self.inner.lock().expect("queue mutex poisoned").dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_types::ComponentId;
    use std::sync::Arc;
    use std::time::Duration;

    fn event(n: u32) -> Event {
        Event::new("test.tick", ComponentId::new("tests"))
            .with_payload(serde_json::json!({ "n": n }))
    }

    fn n_of(event: &Event) -> u64 {
        event.payload["n"].as_u64().unwrap()
    }

    #[tokio::test]
    async fn drop_oldest_keeps_the_newest() {
        let q = SubscriberQueue::new(2);
        q.push(event(0), OverflowPolicy::DropOldest).await;
        q.push(event(1), OverflowPolicy::DropOldest).await;
        let outcome = q.push(event(2), OverflowPolicy::DropOldest).await;
        assert_eq!(outcome, PushOutcome::Dropped);

        assert_eq!(n_of(&q.pop().await.unwrap()), 1);
        assert_eq!(n_of(&q.pop().await.unwrap()), 2);
        assert_eq!(q.dropped(), 1);
    }

    #[tokio::test]
    async fn drop_newest_keeps_the_oldest() {
        let q = SubscriberQueue::new(1);
        q.push(event(0), OverflowPolicy::DropNewest).await;
        let outcome = q.push(event(1), OverflowPolicy::DropNewest).await;
        assert_eq!(outcome, PushOutcome::Dropped);
        assert_eq!(n_of(&q.pop().await.unwrap()), 0);
    }

    #[tokio::test]
    async fn block_publisher_waits_for_space() {
        let q = Arc::new(SubscriberQueue::new(1));
        q.push(event(0), OverflowPolicy::BlockPublisher).await;

        let q2 = Arc::clone(&q);
        let pusher = tokio::spawn(async move {
            q2.push(event(1), OverflowPolicy::BlockPublisher).await
        });

        // The pusher cannot finish while the queue is full.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pusher.is_finished());

        assert_eq!(n_of(&q.pop().await.unwrap()), 0);
        assert_eq!(pusher.await.unwrap(), PushOutcome::Enqueued);
        assert_eq!(n_of(&q.pop().await.unwrap()), 1);
    }

    #[tokio::test]
    async fn close_discards_and_unblocks() {
        let q = Arc::new(SubscriberQueue::new(1));
        q.push(event(0), OverflowPolicy::BlockPublisher).await;

        let q2 = Arc::clone(&q);
        let pusher = tokio::spawn(async move {
            q2.push(event(1), OverflowPolicy::BlockPublisher).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        q.close();
        assert_eq!(pusher.await.unwrap(), PushOutcome::Closed);
        assert!(q.pop().await.is_none());
    }
}
