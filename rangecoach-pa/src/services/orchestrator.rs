//! Session orchestrator: batch processing of one capture session
//!
//! Claims the durable session record (the duplicate-trigger guard), waits
//! out the upload debounce, then drives every evidence file of the session
//! independently through the per-file pipeline. The session completes only
//! if every file produced a usable result; otherwise it fails as a whole.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use rangecoach_common::events::{AnalysisEvent, EventBus};
use rangecoach_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::db;
use crate::models::{SessionResult, SessionStatus, ViewLabel};
use crate::services::inference::InferenceClient;
use crate::services::processor::FileProcessor;
use crate::storage::{self, ObjectStore};

/// One session-processing request, derived from storage notifications or
/// the explicit retry command
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionTrigger {
    pub subject_id: String,
    pub session_id: String,
    pub model_id: String,
    /// Explicit retry: supersede prior per-view results instead of
    /// dropping on the duplicate-trigger guard
    pub is_retry: bool,
}

/// Batch session driver
pub struct SessionOrchestrator {
    db: SqlitePool,
    store: Arc<dyn ObjectStore>,
    event_bus: EventBus,
    config: Arc<ServiceConfig>,
}

impl SessionOrchestrator {
    pub fn new(
        db: SqlitePool,
        store: Arc<dyn ObjectStore>,
        event_bus: EventBus,
        config: Arc<ServiceConfig>,
    ) -> Self {
        Self {
            db,
            store,
            event_bus,
            config,
        }
    }

    /// Process one session trigger to completion or failure.
    ///
    /// Returns `Err` only for infrastructure failures that prevented even
    /// recording the outcome; pipeline failures mark the session `failed`
    /// and return `Ok`.
    pub async fn process_session(&self, trigger: &SessionTrigger) -> Result<()> {
        let claimed = if trigger.is_retry {
            db::sessions::reset_for_retry(
                &self.db,
                &trigger.subject_id,
                &trigger.session_id,
                Some(&trigger.model_id),
            )
            .await?
        } else {
            db::sessions::try_claim(
                &self.db,
                &trigger.subject_id,
                &trigger.session_id,
                &trigger.model_id,
            )
            .await?
        };

        if !claimed {
            tracing::info!(
                subject_id = %trigger.subject_id,
                session_id = %trigger.session_id,
                is_retry = trigger.is_retry,
                "Dropping trigger: session already in progress, completed, or unknown"
            );
            return Ok(());
        }

        self.event_bus.emit_lossy(AnalysisEvent::SessionStarted {
            subject_id: trigger.subject_id.clone(),
            session_id: trigger.session_id.clone(),
            model_id: trigger.model_id.clone(),
            timestamp: Utc::now(),
        });

        match self.run_claimed(trigger).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(
                    subject_id = %trigger.subject_id,
                    session_id = %trigger.session_id,
                    error = %e,
                    "Session processing failed"
                );
                self.fail_session(trigger, &e.to_string()).await
            }
        }
    }

    async fn run_claimed(&self, trigger: &SessionTrigger) -> Result<()> {
        // Best-effort debounce so a multi-file upload batch lands before
        // the listing; late files are excluded from this run.
        tokio::time::sleep(self.config.debounce()).await;

        let endpoint = self
            .config
            .inference
            .endpoints
            .get(&trigger.model_id)
            .ok_or_else(|| {
                Error::InvalidInput(format!("model not available: {}", trigger.model_id))
            })?;
        let client = InferenceClient::new(
            endpoint.clone(),
            self.config.inference.service_token.clone(),
            self.config.inference.handshake_timeout(),
            self.config.inference.exchange_timeout(),
        );

        let prefix = format!("{}/{}/", trigger.subject_id, trigger.session_id);
        let keys = self
            .store
            .list(&self.config.storage.evidence_bucket, &prefix)
            .await?;

        // Up to one evidence file per declared view; a later upload for
        // the same view supersedes the earlier listing entry.
        let mut files: BTreeMap<ViewLabel, String> = BTreeMap::new();
        for key in keys {
            match storage::parse_evidence_key(&key) {
                Some(evidence) => {
                    files.insert(evidence.view, key);
                }
                None => {
                    tracing::warn!(key = %key, "Skipping object with malformed key");
                }
            }
        }

        if files.is_empty() {
            return Err(Error::NotFound("no files found in session".to_string()));
        }

        tracing::info!(
            subject_id = %trigger.subject_id,
            session_id = %trigger.session_id,
            model_id = %trigger.model_id,
            file_count = files.len(),
            "Processing session files"
        );

        let processor = FileProcessor::new(
            self.config.analysis.frame_stride,
            self.config.analysis.calibration,
            self.config.analysis.metrics,
        );

        // Independent per-file pipelines with bounded concurrency;
        // failures stay per-file and never cascade to siblings.
        let outcomes: Vec<(ViewLabel, Result<SessionResult>)> =
            stream::iter(files.into_iter())
                .map(|(declared_view, key)| {
                    let processor = &processor;
                    let client = &client;
                    async move {
                        let outcome = self
                            .process_one_file(processor, client, &key, declared_view)
                            .await;
                        (declared_view, outcome)
                    }
                })
                .buffer_unordered(self.config.analysis.file_parallelism.max(1))
                .collect()
                .await;

        let mut results: BTreeMap<ViewLabel, SessionResult> = BTreeMap::new();
        let mut failures: Vec<String> = Vec::new();

        for (declared_view, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    self.event_bus.emit_lossy(AnalysisEvent::FileProcessed {
                        subject_id: trigger.subject_id.clone(),
                        session_id: trigger.session_id.clone(),
                        view: result.view.to_string(),
                        frames_used: result.frames_used,
                        total_frames: result.total_frames,
                        timestamp: Utc::now(),
                    });
                    self.persist_result_document(trigger, &result).await?;
                    results.insert(result.view, result);
                }
                Err(e) => {
                    tracing::warn!(
                        subject_id = %trigger.subject_id,
                        session_id = %trigger.session_id,
                        declared_view = %declared_view,
                        error = %e,
                        "Evidence file failed"
                    );
                    self.event_bus.emit_lossy(AnalysisEvent::FileFailed {
                        subject_id: trigger.subject_id.clone(),
                        session_id: trigger.session_id.clone(),
                        view: declared_view.to_string(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    failures.push(format!("{}: {}", declared_view, e));
                }
            }
        }

        if failures.is_empty() {
            db::sessions::finalize(
                &self.db,
                &trigger.subject_id,
                &trigger.session_id,
                &results,
                SessionStatus::Completed,
                None,
            )
            .await?;

            let views: Vec<String> = results.keys().map(|v| v.to_string()).collect();
            tracing::info!(
                subject_id = %trigger.subject_id,
                session_id = %trigger.session_id,
                views = ?views,
                "Session completed"
            );
            self.event_bus.emit_lossy(AnalysisEvent::SessionCompleted {
                subject_id: trigger.subject_id.clone(),
                session_id: trigger.session_id.clone(),
                views,
                timestamp: Utc::now(),
            });
            Ok(())
        } else {
            // Partial results are kept on the record for diagnostics, but
            // the session as a whole is failed.
            let description = failures.join("; ");
            db::sessions::finalize(
                &self.db,
                &trigger.subject_id,
                &trigger.session_id,
                &results,
                SessionStatus::Failed,
                Some(&description),
            )
            .await?;
            self.event_bus.emit_lossy(AnalysisEvent::SessionFailed {
                subject_id: trigger.subject_id.clone(),
                session_id: trigger.session_id.clone(),
                error: description,
                timestamp: Utc::now(),
            });
            Ok(())
        }
    }

    async fn process_one_file(
        &self,
        processor: &FileProcessor,
        client: &InferenceClient,
        key: &str,
        declared_view: ViewLabel,
    ) -> Result<SessionResult> {
        let local_path = storage::fetch_to_temp(
            self.store.as_ref(),
            &self.config.storage.evidence_bucket,
            key,
        )
        .await?;

        let outcome = processor
            .process_file(client, &local_path, declared_view)
            .await;

        let _ = tokio::fs::remove_file(&local_path).await;
        outcome
    }

    async fn persist_result_document(
        &self,
        trigger: &SessionTrigger,
        result: &SessionResult,
    ) -> Result<()> {
        let document = serde_json::to_vec(result)
            .map_err(|e| Error::Internal(format!("Failed to serialize result: {}", e)))?;
        let key =
            storage::result_document_key(&trigger.subject_id, &trigger.session_id, result.view);
        self.store
            .put(&self.config.storage.analysis_bucket, &key, &document)
            .await
    }

    async fn fail_session(&self, trigger: &SessionTrigger, description: &str) -> Result<()> {
        db::sessions::mark_failed(
            &self.db,
            &trigger.subject_id,
            &trigger.session_id,
            description,
        )
        .await?;
        self.event_bus.emit_lossy(AnalysisEvent::SessionFailed {
            subject_id: trigger.subject_id.clone(),
            session_id: trigger.session_id.clone(),
            error: description.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}
