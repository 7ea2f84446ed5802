//! Session records and the durable status state machine
//!
//! One session is one multi-view capture attempt by one subject. The durable
//! record is the sole shared mutable resource in the system; it is mutated
//! only by the orchestrator (whole-session claim) or the result merger
//! (per-view versioned read-modify-write).

use crate::models::ViewLabel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Durable session status
///
/// `pending → in_progress → {completed | failed}`; terminal except for the
/// explicit retry command, which resets to `in_progress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SessionStatus::Pending),
            "in_progress" => Some(SessionStatus::InProgress),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

/// Status transition record, for logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub subject_id: String,
    pub session_id: String,
    pub old_status: SessionStatus,
    pub new_status: SessionStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// Aggregated scoring output for one evidence file; persisted keyed by
/// `(subject, session, view)` and overwritten idempotently on retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    /// Final resolved view label (after majority vote and disambiguation)
    pub view: ViewLabel,
    /// Averaged raw measurements, keyed by metric name
    pub measurements: BTreeMap<String, f64>,
    /// Averaged sub-scores in [0, 1], keyed by metric name
    pub scores: BTreeMap<String, f64>,
    /// Averaged sub-scores as display percents, keyed by metric name
    pub raw_scores_percent: BTreeMap<String, f64>,
    /// Unweighted mean of the averaged per-metric sub-scores
    pub overall_score: f64,
    /// Frames that matched the winning view and fed the averages
    pub frames_used: usize,
    /// Frames in the evidence file before sampling
    pub total_frames: usize,
    /// Detected-view counts over every successfully scored frame
    pub view_histogram: BTreeMap<ViewLabel, usize>,
}

/// Durable session record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub subject_id: String,
    pub session_id: String,
    pub model_id: String,
    pub status: SessionStatus,
    /// Per-view results merged so far, keyed by resolved view label
    pub results: BTreeMap<ViewLabel, SessionResult>,
    /// Best-effort description of the most recent failure
    pub error: Option<String>,
    /// Monotonic write version for optimistic concurrency
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(subject_id: String, session_id: String, model_id: String) -> Self {
        let now = Utc::now();
        Self {
            subject_id,
            session_id,
            model_id,
            status: SessionStatus::Pending,
            results: BTreeMap::new(),
            error: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new status, returning the transition for logging
    pub fn transition_to(&mut self, new_status: SessionStatus) -> StatusTransition {
        let transition = StatusTransition {
            subject_id: self.subject_id.clone(),
            session_id: self.session_id.clone(),
            old_status: self.status,
            new_status,
            transitioned_at: Utc::now(),
        };
        self.status = new_status;
        self.updated_at = transition.transitioned_at;
        transition
    }

    /// True once every expected view has a merged result
    pub fn has_all_views(&self, expected: &[ViewLabel]) -> bool {
        !expected.is_empty() && expected.iter().all(|v| self.results.contains_key(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SessionRecord {
        SessionRecord::new("7".into(), "s-1".into(), "cx".into())
    }

    #[test]
    fn new_record_is_pending_with_version_zero() {
        let rec = record();
        assert_eq!(rec.status, SessionStatus::Pending);
        assert_eq!(rec.version, 0);
        assert!(rec.results.is_empty());
    }

    #[test]
    fn transition_records_old_and_new_status() {
        let mut rec = record();
        let t = rec.transition_to(SessionStatus::InProgress);
        assert_eq!(t.old_status, SessionStatus::Pending);
        assert_eq!(t.new_status, SessionStatus::InProgress);
        assert_eq!(rec.status, SessionStatus::InProgress);
        assert!(!rec.status.is_terminal());

        rec.transition_to(SessionStatus::Completed);
        assert!(rec.status.is_terminal());
    }

    #[test]
    fn status_text_round_trips() {
        for status in [
            SessionStatus::Pending,
            SessionStatus::InProgress,
            SessionStatus::Completed,
            SessionStatus::Failed,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SessionStatus::parse("cancelled"), None);
    }

    #[test]
    fn all_views_requires_every_expected_key() {
        let mut rec = record();
        let result = SessionResult {
            view: ViewLabel::Left,
            measurements: BTreeMap::new(),
            scores: BTreeMap::new(),
            raw_scores_percent: BTreeMap::new(),
            overall_score: 1.0,
            frames_used: 1,
            total_frames: 1,
            view_histogram: BTreeMap::new(),
        };
        rec.results.insert(ViewLabel::Left, result);

        assert!(rec.has_all_views(&[ViewLabel::Left]));
        assert!(!rec.has_all_views(&[ViewLabel::Left, ViewLabel::Front]));
        assert!(!rec.has_all_views(&[]));
    }
}
