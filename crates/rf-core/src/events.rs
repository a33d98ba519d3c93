//! Job lifecycle event system for SSE broadcasting.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that late-joining clients can catch up.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ids::{JobId, UploadId};

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

/// Payload describing what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    UploadReceived {
        upload_id: UploadId,
        files: Vec<String>,
    },
    JobQueued {
        job_id: JobId,
    },
    JobStarted {
        job_id: JobId,
    },
    JobCancelRequested {
        job_id: JobId,
    },
    JobSucceeded {
        job_id: JobId,
        result: String,
    },
    JobFailed {
        job_id: JobId,
        error: String,
    },
}

impl EventPayload {
    /// The job this event refers to, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Self::UploadReceived { .. } => None,
            Self::JobQueued { job_id }
            | Self::JobStarted { job_id }
            | Self::JobCancelRequested { job_id }
            | Self::JobSucceeded { job_id, .. }
            | Self::JobFailed { job_id, .. } => Some(*job_id),
        }
    }
}

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers and store it in the
    /// ring buffer.
    pub fn broadcast(&self, payload: EventPayload) {
        let event = Event::new(payload);

        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // Ignore send errors (no subscribers).
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("recent", &self.recent.read().len())
            .finish_non_exhaustive()
    }
}
