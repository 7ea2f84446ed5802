//! Event types for the rangecoach event system
//!
//! Provides shared event definitions and the EventBus used by the
//! posture-analysis service to broadcast session progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Analysis pipeline events
///
/// Broadcast via [`EventBus`]; serializable for downstream transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AnalysisEvent {
    /// Session processing claimed and started
    SessionStarted {
        subject_id: String,
        session_id: String,
        model_id: String,
        timestamp: DateTime<Utc>,
    },

    /// One evidence file produced a usable per-view result
    FileProcessed {
        subject_id: String,
        session_id: String,
        /// Resolved view label (lowercase name)
        view: String,
        frames_used: usize,
        total_frames: usize,
        timestamp: DateTime<Utc>,
    },

    /// One evidence file failed; sibling files are unaffected
    FileFailed {
        subject_id: String,
        session_id: String,
        /// Declared view label of the failing file
        view: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Every expected view produced a persisted result
    SessionCompleted {
        subject_id: String,
        session_id: String,
        views: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Session ended without a full set of usable results
    SessionFailed {
        subject_id: String,
        session_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for [`AnalysisEvent`]
///
/// Subscribers receive events emitted after subscription; slow subscribers
/// lose the oldest buffered events rather than blocking emitters.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AnalysisEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, returning the subscriber count
    pub fn emit(&self, event: AnalysisEvent) -> Result<usize, Box<AnalysisEvent>> {
        self.tx.send(event).map_err(|e| Box::new(e.0))
    }

    /// Emit an event, ignoring the absence of subscribers
    pub fn emit_lossy(&self, event: AnalysisEvent) {
        let _ = self.tx.send(event);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit_lossy(AnalysisEvent::SessionStarted {
            subject_id: "7".into(),
            session_id: "s-1".into(),
            model_id: "cx".into(),
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            AnalysisEvent::SessionStarted { session_id, .. } => assert_eq!(session_id, "s-1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_without_subscribers_is_lossy_not_fatal() {
        let bus = EventBus::new(4);
        bus.emit_lossy(AnalysisEvent::SessionFailed {
            subject_id: "7".into(),
            session_id: "s-1".into(),
            error: "no files found".into(),
            timestamp: Utc::now(),
        });
    }
}
