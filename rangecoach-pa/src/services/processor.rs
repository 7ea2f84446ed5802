//! Per-file processing pipeline: sample → stream → score → aggregate
//!
//! One evidence file runs to a single Session Result (or a file-level
//! error that never cascades to sibling files).

use crate::analysis::{aggregate_frames, score_frame, Calibration, MetricTables};
use crate::models::{LandmarkSet, SessionResult, ViewLabel};
use crate::services::inference::{FrameOutcome, InferenceClient};
use crate::services::sampler::{FrameSampler, SampleError};
use rangecoach_common::{Error, Result};
use std::path::Path;

/// Drives one evidence file through sampling, streaming inference, local
/// scoring, and aggregation.
pub struct FileProcessor {
    sampler: FrameSampler,
    calibration: Calibration,
    tables: MetricTables,
}

impl FileProcessor {
    pub fn new(frame_stride: usize, calibration: Calibration, tables: MetricTables) -> Self {
        Self {
            sampler: FrameSampler::new(frame_stride),
            calibration,
            tables,
        }
    }

    /// Process one evidence file against the declared view.
    ///
    /// Per-frame inference errors are logged and skipped; connection,
    /// authentication, and stall failures abort the file.
    pub async fn process_file(
        &self,
        client: &InferenceClient,
        path: &Path,
        declared_view: ViewLabel,
    ) -> Result<SessionResult> {
        let sampled = self.sampler.sample(path).await.map_err(sample_error)?;

        tracing::info!(
            file = %path.display(),
            declared_view = %declared_view,
            total_frames = sampled.total_frames,
            sampled_frames = sampled.frames.len(),
            "Starting streaming inference"
        );

        let mut stream = client
            .connect()
            .await
            .map_err(|e| Error::Inference(e.to_string()))?;

        let mut frames = Vec::with_capacity(sampled.frames.len());
        let mut skipped = 0usize;

        for (index, frame) in sampled.frames.iter().enumerate() {
            match stream.infer_frame(frame).await {
                Ok(FrameOutcome::Landmarks(response)) => {
                    match LandmarkSet::from_wire(&response.keypoints) {
                        Ok(landmarks) => {
                            let result = score_frame(&landmarks, &self.calibration, &self.tables);
                            if let Some(service_side) = response
                                .posture_score
                                .as_ref()
                                .and_then(|s| s.side.as_deref())
                            {
                                if service_side != result.view.as_str() {
                                    tracing::trace!(
                                        frame = index,
                                        service_side,
                                        local_view = %result.view,
                                        "Service view label disagrees with classifier"
                                    );
                                }
                            }
                            frames.push(result);
                        }
                        Err(e) => {
                            skipped += 1;
                            tracing::warn!(
                                file = %path.display(),
                                frame = index,
                                error = %e,
                                "Skipping frame with unusable landmarks"
                            );
                        }
                    }
                }
                Ok(FrameOutcome::Skipped(reason)) => {
                    skipped += 1;
                    tracing::warn!(
                        file = %path.display(),
                        frame = index,
                        reason = %reason,
                        "Inference service skipped frame"
                    );
                }
                Err(e) => {
                    stream.close().await;
                    return Err(Error::Inference(e.to_string()));
                }
            }
        }

        stream.close().await;

        tracing::info!(
            file = %path.display(),
            frames_scored = frames.len(),
            frames_skipped = skipped,
            "Streaming inference finished"
        );

        aggregate_frames(&frames, declared_view, sampled.total_frames)
            .map_err(|e| Error::Aggregation(e.to_string()))
    }
}

fn sample_error(e: SampleError) -> Error {
    match e {
        SampleError::UnsupportedType(path) => {
            Error::InvalidInput(format!("unsupported file type: {}", path))
        }
        other => Error::Internal(other.to_string()),
    }
}
