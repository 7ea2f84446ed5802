//! Per-frame scoring results
//!
//! Typed records for everything crossing the inference boundary inward:
//! the aggregation core never sees untyped maps.

use crate::models::ViewLabel;
use serde::{Deserialize, Serialize};

/// One scored biomechanical metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    /// Raw measurement (degrees or centimeters)
    pub measurement: f64,
    /// Normalized sub-score in [0, 1]
    pub score: f64,
    /// Sub-score as a display percent, rounded to 2 decimals
    pub percent: f64,
}

impl MetricValue {
    pub fn new(measurement: f64, score: f64) -> Self {
        Self {
            measurement,
            score,
            percent: (score * 10_000.0).round() / 100.0,
        }
    }
}

/// Metric set for a front- or back-facing frame
///
/// One metric: the foot-to-shoulder offset, scored per side and averaged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrontMetrics {
    /// Left ankle vs. left shoulder horizontal offset (cm, positive = wider)
    pub offset_left: MetricValue,
    /// Right ankle vs. right shoulder horizontal offset (cm, positive = wider)
    pub offset_right: MetricValue,
    /// Combined metric: mean offset measurement, mean of the two sub-scores
    pub foot_to_shoulder_offset: MetricValue,
}

/// Metric set for a profile (left/right) frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SideMetrics {
    /// Knee bend in degrees (0 = straight leg)
    pub knee_angle: MetricValue,
    /// Signed head tilt in degrees (negative = looking down)
    pub head_tilt: MetricValue,
    /// Arm elevation from vertical in degrees (90 = horizontal)
    pub arm_angle: MetricValue,
    /// Elbow bend in degrees (0 = straight arm)
    pub arm_bent_angle: MetricValue,
    /// Ankle-to-ankle horizontal distance in centimeters
    pub leg_spread: MetricValue,
    /// Signed torso lean in degrees (forward vs. backward distinguishable)
    pub back_angle: MetricValue,
}

/// View-dependent metric set of one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameMetrics {
    Front(FrontMetrics),
    Side(SideMetrics),
}

/// Scoring output for one sampled frame; transient, never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    /// View label assigned by the classifier for this frame
    pub view: ViewLabel,
    pub metrics: FrameMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_rounded_score_times_hundred() {
        let v = MetricValue::new(12.0, 0.333333);
        assert_eq!(v.percent, 33.33);
        let full = MetricValue::new(0.0, 1.0);
        assert_eq!(full.percent, 100.0);
    }
}
