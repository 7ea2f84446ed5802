//! Data model types for the posture-analysis service

pub mod frame;
pub mod landmarks;
pub mod session;
pub mod view;

pub use frame::{FrameMetrics, FrameResult, FrontMetrics, MetricValue, SideMetrics};
pub use landmarks::{Keypoint, LandmarkSet, Side};
pub use session::{SessionRecord, SessionResult, SessionStatus, StatusTransition};
pub use view::ViewLabel;
