//! Tolerance-band scoring of geometric measurements
//!
//! Each metric carries an externally configured `(optimal, tolerance,
//! limit)` band; deviations inside the tolerance score 1.0, past the limit
//! 0.0, and decay linearly in between.

use crate::analysis::classifier::classify_view;
use crate::analysis::geometry::{self, Calibration};
use crate::models::{
    FrameMetrics, FrameResult, FrontMetrics, LandmarkSet, MetricValue, Side, SideMetrics,
    ViewLabel,
};
use serde::{Deserialize, Serialize};

/// Scoring band for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceBand {
    /// Ideal measurement value
    pub optimal: f64,
    /// Deviation that still scores 1.0; may be 0 for immediate decay
    pub tolerance: f64,
    /// Deviation at or past which the score is 0.0
    pub limit: f64,
}

impl ToleranceBand {
    pub const fn new(optimal: f64, tolerance: f64, limit: f64) -> Self {
        Self {
            optimal,
            tolerance,
            limit,
        }
    }
}

/// Map a measurement onto [0, 1] against its band.
///
/// `d = |value - optimal|`: 1.0 for `d <= tolerance`, 0.0 for `d >= limit`,
/// linear in between.
pub fn linear_score(value: f64, band: &ToleranceBand) -> f64 {
    let deviation = (value - band.optimal).abs();
    if deviation <= band.tolerance {
        1.0
    } else if deviation >= band.limit {
        0.0
    } else {
        1.0 - (deviation - band.tolerance) / (band.limit - band.tolerance)
    }
}

/// Per-metric scoring bands; collaborator-supplied configuration.
///
/// Defaults are the production calibration: angle bands in degrees, the
/// distance bands in centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricTables {
    /// Knee bend (0 = straight leg)
    pub knee_angle: ToleranceBand,
    /// Signed head tilt
    pub head_tilt: ToleranceBand,
    /// Arm elevation from vertical
    pub arm_angle: ToleranceBand,
    /// Elbow bend (0 = straight arm)
    pub arm_bent_angle: ToleranceBand,
    /// Ankle-to-ankle distance
    pub leg_spread: ToleranceBand,
    /// Signed torso lean
    pub back_angle: ToleranceBand,
    /// Per-side ankle-vs-shoulder offset
    pub foot_to_shoulder_offset: ToleranceBand,
}

impl Default for MetricTables {
    fn default() -> Self {
        Self {
            knee_angle: ToleranceBand::new(20.0, 10.0, 30.0),
            head_tilt: ToleranceBand::new(0.0, 10.0, 30.0),
            arm_angle: ToleranceBand::new(90.0, 10.0, 60.0),
            arm_bent_angle: ToleranceBand::new(25.0, 15.0, 40.0),
            leg_spread: ToleranceBand::new(46.6, 15.5, 93.2),
            back_angle: ToleranceBand::new(0.0, 30.0, 45.0),
            foot_to_shoulder_offset: ToleranceBand::new(0.0, 3.1, 15.5),
        }
    }
}

/// Classify one frame and score its view's metric set.
///
/// Front (or ambiguous) frames carry the single foot-to-shoulder metric,
/// scored per side and averaged; profile frames carry the six side metrics
/// measured on the camera-facing side.
pub fn score_frame(
    landmarks: &LandmarkSet,
    calibration: &Calibration,
    tables: &MetricTables,
) -> FrameResult {
    let view = classify_view(landmarks);

    let metrics = match view {
        ViewLabel::Front | ViewLabel::Back => {
            let (left, right) = geometry::foot_to_shoulder_offset(landmarks, calibration);
            let left_score = linear_score(left, &tables.foot_to_shoulder_offset);
            let right_score = linear_score(right, &tables.foot_to_shoulder_offset);
            FrameMetrics::Front(FrontMetrics {
                offset_left: MetricValue::new(left, left_score),
                offset_right: MetricValue::new(right, right_score),
                foot_to_shoulder_offset: MetricValue::new(
                    (left + right) / 2.0,
                    (left_score + right_score) / 2.0,
                ),
            })
        }
        ViewLabel::Left | ViewLabel::Right => {
            let facing = match view {
                ViewLabel::Left => Side::Left,
                _ => Side::Right,
            };

            let knee = geometry::knee_angle(landmarks, facing);
            let tilt = geometry::head_tilt(landmarks, facing);
            let arm = geometry::arm_angle_from_vertical(landmarks, facing);
            let arm_bent = geometry::arm_bent_angle(landmarks, facing);
            let spread = geometry::leg_spread(landmarks, calibration);
            let back = geometry::back_angle(landmarks, facing);

            FrameMetrics::Side(SideMetrics {
                knee_angle: MetricValue::new(knee, linear_score(knee, &tables.knee_angle)),
                head_tilt: MetricValue::new(tilt, linear_score(tilt, &tables.head_tilt)),
                arm_angle: MetricValue::new(arm, linear_score(arm, &tables.arm_angle)),
                arm_bent_angle: MetricValue::new(
                    arm_bent,
                    linear_score(arm_bent, &tables.arm_bent_angle),
                ),
                leg_spread: MetricValue::new(spread, linear_score(spread, &tables.leg_spread)),
                back_angle: MetricValue::new(back, linear_score(back, &tables.back_angle)),
            })
        }
    };

    FrameResult { view, metrics }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BAND: ToleranceBand = ToleranceBand::new(90.0, 10.0, 60.0);

    #[test]
    fn optimal_value_scores_one_for_any_tolerance() {
        assert_eq!(linear_score(90.0, &BAND), 1.0);
        assert_eq!(linear_score(5.0, &ToleranceBand::new(5.0, 0.0, 20.0)), 1.0);
    }

    #[test]
    fn within_tolerance_scores_one() {
        assert_eq!(linear_score(80.0, &BAND), 1.0);
        assert_eq!(linear_score(100.0, &BAND), 1.0);
    }

    #[test]
    fn at_or_past_limit_scores_zero() {
        assert_eq!(linear_score(150.0, &BAND), 0.0);
        assert_eq!(linear_score(30.0, &BAND), 0.0);
        assert_eq!(linear_score(200.0, &BAND), 0.0);
    }

    #[test]
    fn midpoint_deviation_interpolates_linearly() {
        // Deviation 35 sits halfway between tolerance 10 and limit 60
        assert!((linear_score(125.0, &BAND) - 0.5).abs() < 1e-9);
        assert!((linear_score(55.0, &BAND) - 0.5).abs() < 1e-9);
        // Quarter of the way in from the limit
        assert!((linear_score(135.0, &BAND) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn zero_tolerance_decays_immediately() {
        let band = ToleranceBand::new(10.0, 0.0, 20.0);
        assert_eq!(linear_score(10.0, &band), 1.0);
        assert!((linear_score(15.0, &band) - 0.75).abs() < 1e-9);
        assert_eq!(linear_score(30.0, &band), 0.0);
    }

    #[test]
    fn metric_tables_deserialize_with_partial_overrides() {
        let tables: MetricTables = toml::from_str(
            r#"
            knee_angle = { optimal = 18.0, tolerance = 8.0, limit = 25.0 }
            "#,
        )
        .unwrap();
        assert_eq!(tables.knee_angle.optimal, 18.0);
        // Untouched metrics keep their defaults
        assert_eq!(tables.leg_spread, MetricTables::default().leg_spread);
    }
}
