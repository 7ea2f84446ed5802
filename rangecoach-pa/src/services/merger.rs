//! Concurrency-safe result merger (incremental per-view mode)
//!
//! Each view of a session runs as an independent job and folds its result
//! into the shared session record without clobbering sibling views. The
//! protocol is a versioned read-modify-write: read the record and its
//! version, overwrite this job's view key, recompute completion, then
//! write guarded on the version. A conflicting sibling write restarts the
//! whole read-modify-write, bounded by a capped attempt count with short
//! backoff; exhaustion fails the job rather than retrying forever.

use chrono::Utc;
use rangecoach_common::events::{AnalysisEvent, EventBus};
use rangecoach_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::db;
use crate::models::{SessionResult, SessionStatus, ViewLabel};
use crate::services::inference::InferenceClient;
use crate::services::processor::FileProcessor;
use crate::storage::{self, ObjectStore};

/// One per-view processing request derived from a storage notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewTrigger {
    pub subject_id: String,
    pub session_id: String,
    pub model_id: String,
    pub declared_view: ViewLabel,
    /// Evidence object key for this view's file
    pub object_key: String,
}

/// Folds per-view results into the shared session record
pub struct ResultMerger {
    db: SqlitePool,
    store: Arc<dyn ObjectStore>,
    config: Arc<ServiceConfig>,
}

impl ResultMerger {
    pub fn new(db: SqlitePool, store: Arc<dyn ObjectStore>, config: Arc<ServiceConfig>) -> Self {
        Self { db, store, config }
    }

    /// Merge one view's result, returning the session status after the
    /// merge committed.
    pub async fn merge_view_result(
        &self,
        subject_id: &str,
        session_id: &str,
        model_id: &str,
        result: &SessionResult,
    ) -> Result<SessionStatus> {
        let max_attempts = self.config.merge.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            db::sessions::insert_if_absent(&self.db, subject_id, session_id, model_id).await?;
            let mut record = db::sessions::load_record(&self.db, subject_id, session_id)
                .await?
                .ok_or_else(|| {
                    Error::Internal("session row vanished during merge".to_string())
                })?;

            record.results.insert(result.view, result.clone());

            let expected: Vec<ViewLabel> = self
                .expected_views(subject_id, session_id)
                .await?
                .into_iter()
                .collect();
            let status = if record.has_all_views(&expected) {
                SessionStatus::Completed
            } else {
                SessionStatus::InProgress
            };

            let committed = db::sessions::update_versioned(
                &self.db,
                subject_id,
                session_id,
                &record.results,
                status,
                record.version,
            )
            .await?;

            if committed {
                if attempt > 1 {
                    tracing::debug!(
                        subject_id,
                        session_id,
                        view = %result.view,
                        attempt,
                        "Merge committed after retry"
                    );
                }
                return Ok(status);
            }

            tracing::warn!(
                subject_id,
                session_id,
                view = %result.view,
                attempt,
                max_attempts,
                "Concurrent write to session record, retrying merge"
            );
            tokio::time::sleep(self.config.merge.backoff()).await;
        }

        Err(Error::Internal(format!(
            "merge of view {} conflicted {} times, giving up",
            result.view, max_attempts
        )))
    }

    /// Views the session is expected to produce: the declared views of the
    /// evidence files present in the store at merge time.
    async fn expected_views(
        &self,
        subject_id: &str,
        session_id: &str,
    ) -> Result<BTreeSet<ViewLabel>> {
        let prefix = format!("{}/{}/", subject_id, session_id);
        let keys = self
            .store
            .list(&self.config.storage.evidence_bucket, &prefix)
            .await?;
        Ok(keys
            .iter()
            .filter_map(|key| storage::parse_evidence_key(key))
            .map(|evidence| evidence.view)
            .collect())
    }
}

/// Per-view job pipeline: fetch → process → merge
///
/// The incremental-mode counterpart of the batch orchestrator; one job per
/// evidence file, dispatched straight from the storage notification.
pub struct PerViewPipeline {
    db: SqlitePool,
    store: Arc<dyn ObjectStore>,
    merger: ResultMerger,
    event_bus: EventBus,
    config: Arc<ServiceConfig>,
}

impl PerViewPipeline {
    pub fn new(
        db: SqlitePool,
        store: Arc<dyn ObjectStore>,
        event_bus: EventBus,
        config: Arc<ServiceConfig>,
    ) -> Self {
        let merger = ResultMerger::new(db.clone(), store.clone(), config.clone());
        Self {
            db,
            store,
            merger,
            event_bus,
            config,
        }
    }

    /// Process one view job to completion or failure.
    ///
    /// A failure marks the session `failed` and stops; sibling view jobs
    /// already merged are preserved on the record.
    pub async fn process_view(&self, trigger: &ViewTrigger) -> Result<()> {
        match self.run_view(trigger).await {
            Ok(status) => {
                tracing::info!(
                    subject_id = %trigger.subject_id,
                    session_id = %trigger.session_id,
                    declared_view = %trigger.declared_view,
                    status = status.as_str(),
                    "View merged"
                );
                if status == SessionStatus::Completed {
                    let record = db::sessions::load_record(
                        &self.db,
                        &trigger.subject_id,
                        &trigger.session_id,
                    )
                    .await?;
                    let views = record
                        .map(|r| r.results.keys().map(|v| v.to_string()).collect())
                        .unwrap_or_default();
                    self.event_bus.emit_lossy(AnalysisEvent::SessionCompleted {
                        subject_id: trigger.subject_id.clone(),
                        session_id: trigger.session_id.clone(),
                        views,
                        timestamp: Utc::now(),
                    });
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    subject_id = %trigger.subject_id,
                    session_id = %trigger.session_id,
                    declared_view = %trigger.declared_view,
                    error = %e,
                    "View job failed"
                );
                let description = format!("{}: {}", trigger.declared_view, e);
                db::sessions::insert_if_absent(
                    &self.db,
                    &trigger.subject_id,
                    &trigger.session_id,
                    &trigger.model_id,
                )
                .await?;
                db::sessions::mark_failed(
                    &self.db,
                    &trigger.subject_id,
                    &trigger.session_id,
                    &description,
                )
                .await?;
                self.event_bus.emit_lossy(AnalysisEvent::FileFailed {
                    subject_id: trigger.subject_id.clone(),
                    session_id: trigger.session_id.clone(),
                    view: trigger.declared_view.to_string(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                Ok(())
            }
        }
    }

    async fn run_view(&self, trigger: &ViewTrigger) -> Result<SessionStatus> {
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

        let processor = FileProcessor::new(
            self.config.analysis.frame_stride,
            self.config.analysis.calibration,
            self.config.analysis.metrics,
        );

        let local_path = storage::fetch_to_temp(
            self.store.as_ref(),
            &self.config.storage.evidence_bucket,
            &trigger.object_key,
        )
        .await?;

        let outcome = processor
            .process_file(&client, &local_path, trigger.declared_view)
            .await;
        let _ = tokio::fs::remove_file(&local_path).await;
        let result = outcome?;

        // Result document first (idempotent), then the record merge
        let document = serde_json::to_vec(&result)
            .map_err(|e| Error::Internal(format!("Failed to serialize result: {}", e)))?;
        let key = storage::result_document_key(
            &trigger.subject_id,
            &trigger.session_id,
            result.view,
        );
        self.store
            .put(&self.config.storage.analysis_bucket, &key, &document)
            .await?;

        self.event_bus.emit_lossy(AnalysisEvent::FileProcessed {
            subject_id: trigger.subject_id.clone(),
            session_id: trigger.session_id.clone(),
            view: result.view.to_string(),
            frames_used: result.frames_used,
            total_frames: result.total_frames,
            timestamp: Utc::now(),
        });

        self.merger
            .merge_view_result(
                &trigger.subject_id,
                &trigger.session_id,
                &trigger.model_id,
                &result,
            )
            .await
    }
}
