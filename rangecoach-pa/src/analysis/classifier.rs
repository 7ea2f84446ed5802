//! View classification from landmark ordering
//!
//! Deterministic rule with no learned parameters: the relative x-ordering
//! of nose, eye, and ear on each side of the head. The rule cannot tell a
//! back-facing subject from a front-facing one (both satisfy both
//! orderings); the frame aggregator resolves that against the declared
//! view.

use crate::models::{LandmarkSet, Side, ViewLabel};

/// Infer the stance orientation for one frame.
///
/// - Left ordering `nose.x < eye.x < ear.x` and right ordering
///   `nose.x > eye.x > ear.x` both hold → `Front`.
/// - Only the left ordering holds → `Left`.
/// - Only the right ordering holds → `Right`.
/// - Neither → `Front` (ambiguous).
pub fn classify_view(landmarks: &LandmarkSet) -> ViewLabel {
    let nose_x = landmarks.nose().x;

    let left_ordering = nose_x < landmarks.eye(Side::Left).x
        && landmarks.eye(Side::Left).x < landmarks.ear(Side::Left).x;
    let right_ordering = nose_x > landmarks.eye(Side::Right).x
        && landmarks.eye(Side::Right).x > landmarks.ear(Side::Right).x;

    match (left_ordering, right_ordering) {
        (true, true) => ViewLabel::Front,
        (true, false) => ViewLabel::Left,
        (false, true) => ViewLabel::Right,
        (false, false) => ViewLabel::Front,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Keypoint;

    /// 17-point set with the given head coordinates (index, x); y fixed
    fn head(points: &[(usize, f64)]) -> LandmarkSet {
        let mut all = vec![Keypoint::new(0.0, 0.0, 1.0); 17];
        for (idx, x) in points {
            all[*idx] = Keypoint::new(*x, 50.0, 1.0);
        }
        LandmarkSet::new(all).unwrap()
    }

    #[test]
    fn both_orderings_classify_front() {
        // nose centered, left eye/ear fan out to +x, right eye/ear to -x
        let lm = head(&[(0, 100.0), (1, 110.0), (3, 120.0), (2, 90.0), (4, 80.0)]);
        assert_eq!(classify_view(&lm), ViewLabel::Front);
    }

    #[test]
    fn left_ordering_alone_classifies_left() {
        // Whole head profile toward -x: both eyes/ears trail the nose in +x
        let lm = head(&[(0, 100.0), (1, 110.0), (3, 120.0), (2, 105.0), (4, 115.0)]);
        assert_eq!(classify_view(&lm), ViewLabel::Left);
    }

    #[test]
    fn right_ordering_alone_classifies_right() {
        let lm = head(&[(0, 100.0), (1, 95.0), (3, 85.0), (2, 90.0), (4, 80.0)]);
        assert_eq!(classify_view(&lm), ViewLabel::Right);
    }

    #[test]
    fn no_ordering_defaults_to_front() {
        // Collapsed head points: neither strict ordering holds
        let lm = head(&[(0, 100.0), (1, 100.0), (3, 100.0), (2, 100.0), (4, 100.0)]);
        assert_eq!(classify_view(&lm), ViewLabel::Front);
    }
}
