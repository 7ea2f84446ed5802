//! Stance orientation labels

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stance orientation relative to the camera
///
/// Variant order is the lexical order of the lowercase names; the derived
/// `Ord` is what the aggregator's deterministic tie-break relies on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ViewLabel {
    Back,
    Front,
    Left,
    Right,
}

impl ViewLabel {
    /// All labels a capture session may declare
    pub const ALL: [ViewLabel; 4] = [
        ViewLabel::Back,
        ViewLabel::Front,
        ViewLabel::Left,
        ViewLabel::Right,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewLabel::Back => "back",
            ViewLabel::Front => "front",
            ViewLabel::Left => "left",
            ViewLabel::Right => "right",
        }
    }

    /// True for the two profile orientations scored with the six side metrics
    pub fn is_side(&self) -> bool {
        matches!(self, ViewLabel::Left | ViewLabel::Right)
    }
}

impl fmt::Display for ViewLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "back" => Ok(ViewLabel::Back),
            "front" => Ok(ViewLabel::Front),
            "left" => Ok(ViewLabel::Left),
            "right" => Ok(ViewLabel::Right),
            other => Err(format!("unknown view label: {}", other)),
        }
    }
}
