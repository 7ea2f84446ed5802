//! Service configuration
//!
//! Resolution order: `RANGECOACH_PA_CONFIG` env var (explicit file) →
//! platform config dir → compiled defaults. Every tuning constant the
//! pipeline uses — calibration ratios, metric bands, sampling stride,
//! merge retry policy, debounce — lives here and is never derived at
//! runtime.

use crate::analysis::{Calibration, MetricTables};
use rangecoach_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// How triggered work is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// One job per session: the orchestrator drives every file of the
    /// session and completes or fails it as a whole
    Session,
    /// One job per evidence file: each view folds its result into the
    /// shared record through the concurrency-safe merger
    PerView,
}

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP bind address
    pub bind_address: String,
    /// Data directory override (env var takes precedence)
    pub data_dir: Option<PathBuf>,
    /// Worker tasks draining the job queue
    pub worker_count: usize,
    /// Bounded job queue capacity
    pub job_queue_capacity: usize,
    pub processing_mode: ProcessingMode,
    /// Best-effort wait before listing session files, letting a multi-file
    /// upload batch land; not a completeness guarantee
    pub debounce_ms: u64,
    pub analysis: AnalysisSettings,
    pub inference: InferenceSettings,
    pub storage: StorageSettings,
    pub merge: MergeSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5741".to_string(),
            data_dir: None,
            worker_count: 4,
            job_queue_capacity: 64,
            processing_mode: ProcessingMode::Session,
            debounce_ms: 2000,
            analysis: AnalysisSettings::default(),
            inference: InferenceSettings::default(),
            storage: StorageSettings::default(),
            merge: MergeSettings::default(),
        }
    }
}

/// Pipeline tuning for sampling and scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Pixel-to-centimeter ratios from the physical reference
    pub calibration: Calibration,
    /// Per-metric tolerance bands
    pub metrics: MetricTables,
    /// Video sampling stride (every Nth frame)
    pub frame_stride: usize,
    /// Evidence files of one session processed concurrently
    pub file_parallelism: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            calibration: Calibration::default(),
            metrics: MetricTables::default(),
            frame_stride: 2,
            file_parallelism: 4,
        }
    }
}

/// Inference service endpoints and protocol timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    /// WebSocket endpoint per model id
    pub endpoints: BTreeMap<String, String>,
    /// Opaque credential sent out-of-band on connect
    pub service_token: String,
    /// Connect + authentication handshake timeout
    pub handshake_timeout_ms: u64,
    /// Single frame exchange timeout
    pub exchange_timeout_ms: u64,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        let mut endpoints = BTreeMap::new();
        endpoints.insert("cx".to_string(), "ws://127.0.0.1:8893".to_string());
        endpoints.insert("gy".to_string(), "ws://127.0.0.1:8894".to_string());
        Self {
            endpoints,
            service_token: String::new(),
            handshake_timeout_ms: 10_000,
            exchange_timeout_ms: 30_000,
        }
    }
}

impl InferenceSettings {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange_timeout_ms)
    }
}

/// Bucket names in the object store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Bucket holding uploaded evidence files
    pub evidence_bucket: String,
    /// Bucket receiving per-view result documents
    pub analysis_bucket: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            evidence_bucket: "videos".to_string(),
            analysis_bucket: "analysis-data".to_string(),
        }
    }
}

/// Retry policy for the merger's versioned read-modify-write
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSettings {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 50,
        }
    }
}

impl MergeSettings {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl ServiceConfig {
    /// Load configuration from the resolved TOML path, or defaults when no
    /// file exists
    pub fn load() -> Result<Self> {
        let path = std::env::var("RANGECOACH_PA_CONFIG")
            .ok()
            .map(PathBuf::from)
            .or_else(|| rangecoach_common::config::default_config_path("posture-analysis"));

        match path {
            Some(path) => rangecoach_common::config::load_toml_config(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_runnable() {
        let config = ServiceConfig::default();
        assert_eq!(config.processing_mode, ProcessingMode::Session);
        assert_eq!(config.analysis.frame_stride, 2);
        assert_eq!(config.merge.max_attempts, 5);
        assert!(config.inference.endpoints.contains_key("cx"));
        assert_eq!(config.debounce(), Duration::from_millis(2000));
    }

    #[test]
    fn partial_toml_overrides_merge_with_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            bind_address = "0.0.0.0:9000"
            processing_mode = "per_view"

            [analysis]
            frame_stride = 5

            [analysis.metrics.head_tilt]
            optimal = 0.0
            tolerance = 5.0
            limit = 20.0

            [inference.endpoints]
            cx = "ws://gpu-box:8893"
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_address, "0.0.0.0:9000");
        assert_eq!(config.processing_mode, ProcessingMode::PerView);
        assert_eq!(config.analysis.frame_stride, 5);
        assert_eq!(config.analysis.metrics.head_tilt.tolerance, 5.0);
        // Untouched sections keep defaults
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.analysis.metrics.knee_angle.optimal, 20.0);
        assert_eq!(
            config.inference.endpoints.get("cx").unwrap(),
            "ws://gpu-box:8893"
        );
    }
}
