//! Shared foundation for rangecoach services
//!
//! Error type, configuration/data-dir resolution, and the event bus used by
//! the posture-analysis service.

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
