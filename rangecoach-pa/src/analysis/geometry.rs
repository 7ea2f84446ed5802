//! Geometry kernel: angles and distances over a landmark set
//!
//! Pure functions in pixel space. Distances that leave this module pass
//! through the fixed per-axis calibration ratios; angles are dimensionless
//! degrees.

use crate::models::{Keypoint, LandmarkSet, Side};
use serde::{Deserialize, Serialize};

/// Pixel-to-centimeter calibration ratios, set once from a known physical
/// reference (100 cm horizontal = 644 px, 100 cm vertical = 605 px) and
/// never re-derived at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub cm_per_px_horizontal: f64,
    pub cm_per_px_vertical: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            cm_per_px_horizontal: 100.0 / 644.0,
            cm_per_px_vertical: 100.0 / 605.0,
        }
    }
}

impl Calibration {
    /// Convert a horizontal pixel distance to centimeters
    pub fn horizontal_cm(&self, px: f64) -> f64 {
        px * self.cm_per_px_horizontal
    }

    /// Convert a vertical pixel distance to centimeters
    pub fn vertical_cm(&self, px: f64) -> f64 {
        px * self.cm_per_px_vertical
    }
}

/// Euclidean distance between two points in pixel space
pub fn vector_magnitude(p1: &Keypoint, p2: &Keypoint) -> f64 {
    let dx = p1.x - p2.x;
    let dy = p1.y - p2.y;
    (dx * dx + dy * dy).sqrt()
}

/// Angle at vertex `b` of the triangle `a-b-c`, via the law of cosines.
///
/// The cosine is clamped to [-1, 1] before the inverse cosine so that
/// floating-point drift on near-collinear triples cannot produce a domain
/// error. Returns degrees in [0, 180]; symmetric in `a` and `c`.
pub fn angle(a: &Keypoint, b: &Keypoint, c: &Keypoint) -> f64 {
    let mag_a = vector_magnitude(b, c);
    let mag_b = vector_magnitude(a, c);
    let mag_c = vector_magnitude(a, b);
    let cos_b = (mag_b * mag_b - mag_a * mag_a - mag_c * mag_c) / (-2.0 * mag_a * mag_c);
    cos_b.clamp(-1.0, 1.0).acos().to_degrees()
}

/// Point on the image top edge directly above `p`; the vertical reference
/// used for head, arm, and back angles.
fn vertical_reference(p: &Keypoint) -> Keypoint {
    Keypoint::new(p.x, 0.0, 1.0)
}

/// Knee bend of the hip-knee-ankle chain, in degrees (0 = straight leg)
pub fn knee_angle(landmarks: &LandmarkSet, side: Side) -> f64 {
    180.0
        - angle(
            landmarks.hip(side),
            landmarks.knee(side),
            landmarks.ankle(side),
        )
}

/// Signed head tilt in degrees; negative = looking down.
///
/// Measured between the ear→eye vector and a vertical reference dropped
/// from the eye.
pub fn head_tilt(landmarks: &LandmarkSet, side: Side) -> f64 {
    let eye = landmarks.eye(side);
    let ear = landmarks.ear(side);
    let reference = vertical_reference(eye);
    -(90.0 - angle(ear, eye, &reference))
}

/// Angle at the shoulder between a vertical reference and the
/// shoulder→wrist vector; 90° = arm extended horizontally.
pub fn arm_angle_from_vertical(landmarks: &LandmarkSet, side: Side) -> f64 {
    let shoulder = landmarks.shoulder(side);
    let reference = vertical_reference(shoulder);
    angle(&reference, shoulder, landmarks.wrist(side))
}

/// Elbow bend of the shoulder-elbow-wrist chain, in degrees (0 = straight)
pub fn arm_bent_angle(landmarks: &LandmarkSet, side: Side) -> f64 {
    180.0
        - angle(
            landmarks.shoulder(side),
            landmarks.elbow(side),
            landmarks.wrist(side),
        )
}

/// Torso lean in degrees, averaged over both body sides.
///
/// Per side: the angle at the hip between a vertical reference directly
/// above the hip and the hip→shoulder vector, negated when the shoulder
/// trails the hip relative to the facing direction so that forward and
/// backward lean keep opposite signs.
pub fn back_angle(landmarks: &LandmarkSet, facing: Side) -> f64 {
    let mut angles = [0.0; 2];
    for (i, side) in [Side::Left, Side::Right].into_iter().enumerate() {
        let hip = landmarks.hip(side);
        let shoulder = landmarks.shoulder(side);
        let top = Keypoint::new(hip.x, hip.y - 10.0, 1.0);
        let mut side_angle = angle(&top, hip, shoulder);

        let trailing = match facing {
            Side::Right => shoulder.x < hip.x,
            Side::Left => shoulder.x > hip.x,
        };
        if trailing {
            side_angle = -side_angle;
        }
        angles[i] = side_angle;
    }
    (angles[0] + angles[1]) / 2.0
}

/// Horizontal ankle-to-ankle distance in centimeters
pub fn leg_spread(landmarks: &LandmarkSet, calibration: &Calibration) -> f64 {
    let spread_px =
        (landmarks.ankle(Side::Right).x - landmarks.ankle(Side::Left).x).abs();
    calibration.horizontal_cm(spread_px)
}

/// Per-side horizontal offset between ankle and shoulder in centimeters;
/// positive = foot planted wider than the shoulder. Returns (left, right).
pub fn foot_to_shoulder_offset(
    landmarks: &LandmarkSet,
    calibration: &Calibration,
) -> (f64, f64) {
    let left_px = landmarks.ankle(Side::Left).x - landmarks.shoulder(Side::Left).x;
    let right_px = landmarks.shoulder(Side::Right).x - landmarks.ankle(Side::Right).x;
    (
        calibration.horizontal_cm(left_px),
        calibration.horizontal_cm(right_px),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kp(x: f64, y: f64) -> Keypoint {
        Keypoint::new(x, y, 1.0)
    }

    /// 17 keypoints at the origin, with the given indices overridden
    fn landmarks(overrides: &[(usize, (f64, f64))]) -> LandmarkSet {
        let mut points = vec![kp(0.0, 0.0); 17];
        for (idx, (x, y)) in overrides {
            points[*idx] = kp(*x, *y);
        }
        LandmarkSet::new(points).unwrap()
    }

    #[test]
    fn angle_is_symmetric_in_outer_points() {
        let triples = [
            (kp(1.0, 0.0), kp(0.0, 0.0), kp(0.0, 1.0)),
            (kp(3.0, 4.0), kp(-1.0, 2.0), kp(5.0, -2.0)),
            (kp(0.2, 7.1), kp(4.4, 4.4), kp(-3.0, 0.9)),
        ];
        for (a, b, c) in triples {
            assert!((angle(&a, &b, &c) - angle(&c, &b, &a)).abs() < 1e-9);
        }
    }

    #[test]
    fn right_angle_measures_ninety_degrees() {
        assert!((angle(&kp(1.0, 0.0), &kp(0.0, 0.0), &kp(0.0, 1.0)) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn collinear_points_stay_in_range_without_domain_error() {
        // Straight line through the vertex
        let straight = angle(&kp(0.0, 0.0), &kp(1.0, 0.0), &kp(2.0, 0.0));
        assert!((straight - 180.0).abs() < 1e-6);

        // Near-collinear: the cosine drifts past 1 without clamping
        let near = angle(&kp(0.0, 0.0), &kp(1.0, 1e-12), &kp(2.0, 0.0));
        assert!(near.is_finite());
        assert!((0.0..=180.0).contains(&near));

        // Folded back on itself
        let folded = angle(&kp(2.0, 0.0), &kp(0.0, 0.0), &kp(2.0, 1e-12));
        assert!(folded.is_finite());
        assert!(folded < 1e-3);
    }

    #[test]
    fn straight_leg_has_zero_bend() {
        let lm = landmarks(&[(11, (0.0, 0.0)), (13, (0.0, 50.0)), (15, (0.0, 100.0))]);
        assert!(knee_angle(&lm, Side::Left).abs() < 1e-6);
    }

    #[test]
    fn bent_knee_reports_bend_not_raw_angle() {
        // Right angle at the knee: bend = 180 - 90 = 90
        let lm = landmarks(&[(12, (0.0, 0.0)), (14, (0.0, 50.0)), (16, (50.0, 50.0))]);
        assert!((knee_angle(&lm, Side::Right) - 90.0).abs() < 1e-6);
    }

    #[test]
    fn level_head_has_zero_tilt() {
        // Left profile: ear behind the eye at the same height
        let lm = landmarks(&[(1, (100.0, 50.0)), (3, (120.0, 50.0))]);
        assert!(head_tilt(&lm, Side::Left).abs() < 1e-6);
    }

    #[test]
    fn looking_down_is_negative() {
        // Ear above the eye: chin dropped
        let lm = landmarks(&[(1, (100.0, 60.0)), (3, (120.0, 40.0))]);
        assert!(head_tilt(&lm, Side::Left) < 0.0);
    }

    #[test]
    fn horizontal_arm_is_ninety_degrees() {
        let lm = landmarks(&[(5, (0.0, 50.0)), (9, (40.0, 50.0))]);
        assert!((arm_angle_from_vertical(&lm, Side::Left) - 90.0).abs() < 1e-6);
    }

    #[test]
    fn straight_arm_has_zero_bend() {
        let lm = landmarks(&[(6, (0.0, 0.0)), (8, (30.0, 0.0)), (10, (60.0, 0.0))]);
        assert!(arm_bent_angle(&lm, Side::Right).abs() < 1e-6);
    }

    #[test]
    fn upright_torso_has_zero_back_angle() {
        let lm = landmarks(&[
            (5, (10.0, 20.0)),
            (6, (30.0, 20.0)),
            (11, (10.0, 80.0)),
            (12, (30.0, 80.0)),
        ]);
        assert!(back_angle(&lm, Side::Left).abs() < 1e-6);
        assert!(back_angle(&lm, Side::Right).abs() < 1e-6);
    }

    #[test]
    fn lean_direction_flips_sign_with_facing() {
        // Shoulders ahead of the hips toward +x
        let lm = landmarks(&[
            (5, (20.0, 20.0)),
            (6, (40.0, 20.0)),
            (11, (10.0, 80.0)),
            (12, (30.0, 80.0)),
        ]);
        let toward_lead = back_angle(&lm, Side::Right);
        let away_from_lead = back_angle(&lm, Side::Left);
        assert!(toward_lead > 0.0);
        assert!((toward_lead + away_from_lead).abs() < 1e-9);
    }

    #[test]
    fn leg_spread_converts_to_centimeters() {
        let lm = landmarks(&[(15, (100.0, 400.0)), (16, (422.0, 400.0))]);
        let cal = Calibration::default();
        // 322 px at 100cm/644px = 50 cm
        assert!((leg_spread(&lm, &cal) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn foot_offset_sign_tracks_stance_width() {
        // Front view: the subject's left side sits at larger image x.
        // Left foot 20 px wider than the shoulder, right foot 10 px narrower.
        let lm = landmarks(&[
            (5, (280.0, 100.0)),
            (6, (200.0, 100.0)),
            (15, (300.0, 400.0)),
            (16, (210.0, 400.0)),
        ]);
        let cal = Calibration {
            cm_per_px_horizontal: 1.0,
            cm_per_px_vertical: 1.0,
        };
        let (left, right) = foot_to_shoulder_offset(&lm, &cal);
        assert!((left - 20.0).abs() < 1e-9);
        assert!((right - -10.0).abs() < 1e-9);
    }
}
