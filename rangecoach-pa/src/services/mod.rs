//! Pipeline services: sampling, streaming inference, per-file processing,
//! session orchestration, and the concurrency-safe result merger

pub mod inference;
pub mod merger;
pub mod orchestrator;
pub mod processor;
pub mod sampler;

pub use inference::{FrameOutcome, InferenceClient, InferenceError, InferenceResponse};
pub use merger::{PerViewPipeline, ResultMerger, ViewTrigger};
pub use orchestrator::{SessionOrchestrator, SessionTrigger};
pub use processor::FileProcessor;
pub use sampler::{sampled_frame_count, FrameSampler, MediaKind, SampleError, SampledMedia};
