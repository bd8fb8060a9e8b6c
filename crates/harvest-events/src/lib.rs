#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Core event bus for the harvest pipeline.
//!
//! The bus provides a typed event enum, sequential identifiers, and support
//! for replaying recent events when subscribers attach late. Internally it
//! uses `tokio::broadcast` with a bounded buffer; when the channel overflows,
//! the oldest events are dropped, matching the desired backpressure
//! behaviour. Nothing in the pipeline depends on delivery succeeding.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};

/// Identifier assigned to each event emitted by the pipeline.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed pipeline events surfaced across the system.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A scan pass over the watch root has started.
    ScanStarted {
        /// Watch root being scanned.
        root: String,
    },
    /// A candidate passed the path filter and is not yet in the ledger.
    CandidateQualified {
        /// File name of the candidate.
        name: String,
        /// Size observed at qualification time.
        size_bytes: u64,
    },
    /// The lock probe found the candidate open for exclusive write elsewhere.
    LockDetected {
        /// File name of the locked candidate.
        name: String,
    },
    /// The completion waiter gave up before the candidate stabilised.
    WaitTimedOut {
        /// File name of the candidate.
        name: String,
    },
    /// The candidate disappeared while waiting for it to stabilise.
    CandidateVanished {
        /// File name of the candidate.
        name: String,
    },
    /// A copy attempt is starting.
    CopyAttempt {
        /// File name being copied.
        name: String,
        /// 1-based attempt counter.
        attempt: u32,
    },
    /// A copy completed and was verified against the dispatch-time size.
    CopyCompleted {
        /// File name that was copied.
        name: String,
        /// Verified size of the destination file.
        size_bytes: u64,
    },
    /// A copy attempt failed.
    CopyFailed {
        /// File name being copied.
        name: String,
        /// 1-based attempt counter for the failed attempt.
        attempt: u32,
        /// Failure description.
        message: String,
    },
    /// The destination already existed, so the copy was skipped.
    CopySkipped {
        /// File name whose destination already existed.
        name: String,
    },
    /// An empty directory under the watch root was removed.
    DirRemoved {
        /// Path of the removed directory.
        path: String,
    },
    /// An empty-directory removal failed (usually a race with a new entry).
    DirRemovalFailed {
        /// Path of the directory that could not be removed.
        path: String,
        /// Failure description.
        message: String,
    },
    /// The watch root was cleared at a sweep checkpoint.
    SweepCompleted {
        /// Number of top-level entries removed.
        removed: usize,
    },
    /// The sweep prompt was declined; the watch root was left untouched.
    SweepDeclined,
}

impl Event {
    /// Machine-friendly discriminator for log consumers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ScanStarted { .. } => "scan_started",
            Self::CandidateQualified { .. } => "candidate_qualified",
            Self::LockDetected { .. } => "lock_detected",
            Self::WaitTimedOut { .. } => "wait_timed_out",
            Self::CandidateVanished { .. } => "candidate_vanished",
            Self::CopyAttempt { .. } => "copy_attempt",
            Self::CopyCompleted { .. } => "copy_completed",
            Self::CopyFailed { .. } => "copy_failed",
            Self::CopySkipped { .. } => "copy_skipped",
            Self::DirRemoved { .. } => "dir_removed",
            Self::DirRemovalFailed { .. } => "dir_removal_failed",
            Self::SweepCompleted { .. } => "sweep_completed",
            Self::SweepDeclined => "sweep_declined",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier assigned at publication.
    pub id: EventId,
    /// Emission timestamp.
    pub timestamp: DateTime<Utc>,
    /// The published event.
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
    replay_capacity: usize,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("replay_capacity", &self.replay_capacity)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// The broadcast channel uses the same capacity as the in-memory replay
    /// buffer, ensuring dropped events impact both structures consistently.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(std::sync::atomic::AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event to the bus, assigning it a sequential identifier.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn publish(&self, event: Event) -> EventId {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.buffer.lock().expect("event buffer mutex poisoned");
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying any buffered events newer than `since_id`.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.buffer.lock().expect("event buffer mutex poisoned");
            for item in buffer.iter() {
                if item.id > since {
                    backlog.push_back(item.clone());
                }
            }
        }

        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Returns the last assigned identifier, if any events have been published.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self.buffer.lock().expect("event buffer mutex poisoned");
        buffer.back().map(|event| event.id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events either from the replay backlog or from
/// the live broadcast channel.
#[derive(Debug)]
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => self.receiver.recv().await.ok(),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::task;
    use tokio::time::timeout;

    const PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

    fn sample_attempt_event(id: usize) -> Event {
        Event::CopyAttempt {
            name: format!("artifact-{id}.exe"),
            attempt: u32::try_from(id).unwrap_or(u32::MAX).saturating_add(1),
        }
    }

    #[tokio::test]
    async fn sequential_ids_and_replay() {
        let bus = EventBus::with_capacity(16);

        let mut last_id = 0;
        for i in 0..5 {
            last_id = bus.publish(sample_attempt_event(i));
        }
        assert_eq!(last_id, 5);

        let mut stream = bus.subscribe(Some(2));
        let mut received = Vec::new();
        for _ in 0..3 {
            if let Some(event) = stream.next().await {
                received.push(event);
            }
        }

        assert_eq!(received.len(), 3);
        assert_eq!(received.first().unwrap().id, 3);
        assert_eq!(received.last().unwrap().id, 5);
    }

    #[tokio::test]
    async fn kind_matches_serialised_tag() {
        let event = Event::CopyFailed {
            name: "tool.whl".to_string(),
            attempt: 2,
            message: "permission denied".to_string(),
        };
        let json = serde_json::to_value(&event).expect("serialise event");
        assert_eq!(json["type"], event.kind());
    }

    #[tokio::test]
    async fn load_test_does_not_stall_publishers() {
        let bus = Arc::new(EventBus::with_capacity(512));
        let mut stream = bus.subscribe(None);

        let publisher = {
            let bus = bus.clone();
            task::spawn(async move {
                for i in 0..500 {
                    let publish_bus = bus.clone();
                    timeout(PUBLISH_TIMEOUT, async move {
                        let _ = publish_bus.publish(sample_attempt_event(i));
                    })
                    .await
                    .expect("publish timed out");
                }
            })
        };

        let consumer = task::spawn(async move {
            let mut ids = HashSet::new();
            while ids.len() < 500 {
                if let Some(event) = stream.next().await {
                    ids.insert(event.id);
                }
            }
            ids
        });

        publisher.await.expect("publisher task panicked");
        let ids = consumer.await.expect("consumer task panicked");
        assert_eq!(ids.len(), 500);
    }
}
