//! Body landmark sets produced by the pose model
//!
//! The index layout is fixed a priori (COCO wholebody head/torso/leg
//! points); every geometric function in the analysis core addresses points
//! through the accessors here, never by raw index.

use rangecoach_common::Error;
use serde::{Deserialize, Serialize};

/// Anatomical side selector for paired landmarks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// One 2D body point in pixel space with model confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

impl Keypoint {
    pub fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self { x, y, confidence }
    }
}

// Fixed index layout
const NOSE: usize = 0;
const LEFT_EYE: usize = 1;
const RIGHT_EYE: usize = 2;
const LEFT_EAR: usize = 3;
const RIGHT_EAR: usize = 4;
const LEFT_SHOULDER: usize = 5;
const RIGHT_SHOULDER: usize = 6;
const LEFT_ELBOW: usize = 7;
const RIGHT_ELBOW: usize = 8;
const LEFT_WRIST: usize = 9;
const RIGHT_WRIST: usize = 10;
const LEFT_HIP: usize = 11;
const RIGHT_HIP: usize = 12;
const LEFT_KNEE: usize = 13;
const RIGHT_KNEE: usize = 14;
const LEFT_ANKLE: usize = 15;
const RIGHT_ANKLE: usize = 16;

/// Minimum number of points a usable landmark set carries. Extended points
/// past the ankles (hands, feet, face detail) are retained but unused.
pub const CORE_POINT_COUNT: usize = 17;

/// Fixed-length ordered landmark set for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Keypoint>,
}

impl LandmarkSet {
    /// Build from owned keypoints; fails if the core layout is incomplete
    pub fn new(points: Vec<Keypoint>) -> Result<Self, Error> {
        if points.len() < CORE_POINT_COUNT {
            return Err(Error::InvalidInput(format!(
                "landmark set has {} points, need at least {}",
                points.len(),
                CORE_POINT_COUNT
            )));
        }
        Ok(Self { points })
    }

    /// Build from the wire shape `[[x, y, confidence] × N]`.
    ///
    /// A point may omit confidence (two-element form); anything shorter is
    /// rejected before it can reach the analysis core.
    pub fn from_wire(raw: &[Vec<f64>]) -> Result<Self, Error> {
        let mut points = Vec::with_capacity(raw.len());
        for (i, p) in raw.iter().enumerate() {
            match p.as_slice() {
                [x, y] => points.push(Keypoint::new(*x, *y, 1.0)),
                [x, y, confidence, ..] => points.push(Keypoint::new(*x, *y, *confidence)),
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "keypoint {} has {} coordinates, need at least 2",
                        i,
                        p.len()
                    )))
                }
            }
        }
        Self::new(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn nose(&self) -> &Keypoint {
        &self.points[NOSE]
    }

    pub fn eye(&self, side: Side) -> &Keypoint {
        match side {
            Side::Left => &self.points[LEFT_EYE],
            Side::Right => &self.points[RIGHT_EYE],
        }
    }

    pub fn ear(&self, side: Side) -> &Keypoint {
        match side {
            Side::Left => &self.points[LEFT_EAR],
            Side::Right => &self.points[RIGHT_EAR],
        }
    }

    pub fn shoulder(&self, side: Side) -> &Keypoint {
        match side {
            Side::Left => &self.points[LEFT_SHOULDER],
            Side::Right => &self.points[RIGHT_SHOULDER],
        }
    }

    pub fn elbow(&self, side: Side) -> &Keypoint {
        match side {
            Side::Left => &self.points[LEFT_ELBOW],
            Side::Right => &self.points[RIGHT_ELBOW],
        }
    }

    pub fn wrist(&self, side: Side) -> &Keypoint {
        match side {
            Side::Left => &self.points[LEFT_WRIST],
            Side::Right => &self.points[RIGHT_WRIST],
        }
    }

    pub fn hip(&self, side: Side) -> &Keypoint {
        match side {
            Side::Left => &self.points[LEFT_HIP],
            Side::Right => &self.points[RIGHT_HIP],
        }
    }

    pub fn knee(&self, side: Side) -> &Keypoint {
        match side {
            Side::Left => &self.points[LEFT_KNEE],
            Side::Right => &self.points[RIGHT_KNEE],
        }
    }

    pub fn ankle(&self, side: Side) -> &Keypoint {
        match side {
            Side::Left => &self.points[LEFT_ANKLE],
            Side::Right => &self.points[RIGHT_ANKLE],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_points(n: usize) -> Vec<Vec<f64>> {
        (0..n).map(|i| vec![i as f64, i as f64 * 2.0, 0.9]).collect()
    }

    #[test]
    fn accepts_core_layout_and_extended_points() {
        let lm = LandmarkSet::from_wire(&wire_points(17)).unwrap();
        assert_eq!(lm.len(), 17);
        let extended = LandmarkSet::from_wire(&wire_points(133)).unwrap();
        assert_eq!(extended.len(), 133);
    }

    #[test]
    fn rejects_short_sets() {
        assert!(LandmarkSet::from_wire(&wire_points(16)).is_err());
        assert!(LandmarkSet::from_wire(&[]).is_err());
    }

    #[test]
    fn rejects_degenerate_points() {
        let mut raw = wire_points(17);
        raw[4] = vec![1.0];
        assert!(LandmarkSet::from_wire(&raw).is_err());
    }

    #[test]
    fn two_element_points_default_confidence() {
        let raw: Vec<Vec<f64>> = (0..17).map(|i| vec![i as f64, 0.0]).collect();
        let lm = LandmarkSet::from_wire(&raw).unwrap();
        assert_eq!(lm.nose().confidence, 1.0);
    }

    #[test]
    fn accessors_follow_fixed_index_layout() {
        let lm = LandmarkSet::from_wire(&wire_points(17)).unwrap();
        assert_eq!(lm.nose().x, 0.0);
        assert_eq!(lm.eye(Side::Left).x, 1.0);
        assert_eq!(lm.eye(Side::Right).x, 2.0);
        assert_eq!(lm.ear(Side::Left).x, 3.0);
        assert_eq!(lm.shoulder(Side::Right).x, 6.0);
        assert_eq!(lm.hip(Side::Left).x, 11.0);
        assert_eq!(lm.knee(Side::Right).x, 14.0);
        assert_eq!(lm.ankle(Side::Right).x, 16.0);
    }
}
