//! Frame aggregation: one Session Result per evidence file
//!
//! Groups per-frame results by detected view, picks the majority view,
//! resolves the front/back ambiguity against the caller-declared view, and
//! averages metrics over the frames that match the winner.

use crate::models::{
    FrameMetrics, FrameResult, FrontMetrics, SessionResult, SideMetrics, ViewLabel,
};
use std::collections::BTreeMap;
use thiserror::Error;

/// Aggregation failures; fail the evidence file, never its siblings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    /// No frame produced a usable inference result
    #[error("no frames processed")]
    NoFramesProcessed,

    /// Frames exist but none usable under the winning view
    #[error("no valid view detected")]
    NoValidViewDetected,
}

/// Aggregate all frame results of one evidence file.
///
/// The winning label is the majority detected view; ties break to the
/// lexically smallest label name. If the caller declared `back` and the
/// winner is `front`, the final label is relabeled `back` (the classifier
/// structurally cannot tell the two apart). Only frames matching the
/// winning label feed the averages; every scored frame stays in the
/// histogram.
pub fn aggregate_frames(
    frames: &[FrameResult],
    declared_view: ViewLabel,
    total_frames: usize,
) -> Result<SessionResult, AggregationError> {
    if frames.is_empty() {
        return Err(AggregationError::NoFramesProcessed);
    }

    let mut histogram: BTreeMap<ViewLabel, usize> = BTreeMap::new();
    for frame in frames {
        *histogram.entry(frame.view).or_insert(0) += 1;
    }

    // Ascending key order plus a strict comparison makes ties resolve to
    // the lexically smallest label.
    let mut winner = ViewLabel::Back;
    let mut winner_count = 0usize;
    for (&label, &count) in &histogram {
        if count > winner_count {
            winner = label;
            winner_count = count;
        }
    }

    let final_view = if declared_view == ViewLabel::Back && winner == ViewLabel::Front {
        ViewLabel::Back
    } else {
        winner
    };

    let mut measurements = BTreeMap::new();
    let mut scores = BTreeMap::new();
    let frames_used;

    if winner.is_side() {
        let side_frames: Vec<&SideMetrics> = frames
            .iter()
            .filter(|f| f.view == winner)
            .filter_map(|f| match &f.metrics {
                FrameMetrics::Side(m) => Some(m),
                FrameMetrics::Front(_) => None,
            })
            .collect();
        if side_frames.is_empty() {
            return Err(AggregationError::NoValidViewDetected);
        }
        frames_used = side_frames.len();

        let metric_columns: [(&str, fn(&SideMetrics) -> &crate::models::MetricValue); 6] = [
            ("knee_angle", |m| &m.knee_angle),
            ("head_tilt", |m| &m.head_tilt),
            ("arm_angle", |m| &m.arm_angle),
            ("arm_bent_angle", |m| &m.arm_bent_angle),
            ("leg_spread", |m| &m.leg_spread),
            ("back_angle", |m| &m.back_angle),
        ];
        for (name, column) in metric_columns {
            if let Some(value) = finite_mean(side_frames.iter().map(|m| column(m).measurement)) {
                measurements.insert(name.to_string(), value);
            }
            if let Some(score) = finite_mean(side_frames.iter().map(|m| column(m).score)) {
                scores.insert(name.to_string(), score);
            }
        }
    } else {
        let front_frames: Vec<&FrontMetrics> = frames
            .iter()
            .filter(|f| f.view == winner)
            .filter_map(|f| match &f.metrics {
                FrameMetrics::Front(m) => Some(m),
                FrameMetrics::Side(_) => None,
            })
            .collect();
        if front_frames.is_empty() {
            return Err(AggregationError::NoValidViewDetected);
        }
        frames_used = front_frames.len();

        if let Some(left) = finite_mean(front_frames.iter().map(|m| m.offset_left.measurement)) {
            measurements.insert("foot_to_shoulder_offset_left".to_string(), left);
        }
        if let Some(right) = finite_mean(front_frames.iter().map(|m| m.offset_right.measurement))
        {
            measurements.insert("foot_to_shoulder_offset_right".to_string(), right);
        }
        if let Some(score) =
            finite_mean(front_frames.iter().map(|m| m.foot_to_shoulder_offset.score))
        {
            scores.insert("foot_to_shoulder_offset".to_string(), score);
        }
    }

    let raw_scores_percent: BTreeMap<String, f64> = scores
        .iter()
        .map(|(name, score)| (name.clone(), (score * 10_000.0).round() / 100.0))
        .collect();

    let overall_score = if scores.is_empty() {
        0.0
    } else {
        scores.values().sum::<f64>() / scores.len() as f64
    };

    Ok(SessionResult {
        view: final_view,
        measurements,
        scores,
        raw_scores_percent,
        overall_score,
        frames_used,
        total_frames,
        view_histogram: histogram,
    })
}

/// Mean over the finite entries only; `None` when nothing is finite
fn finite_mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        if v.is_finite() {
            sum += v;
            count += 1;
        }
    }
    (count > 0).then(|| sum / count as f64)
}
