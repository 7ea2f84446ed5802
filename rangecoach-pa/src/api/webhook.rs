//! Storage-change webhook: the processing trigger
//!
//! One notification carries one record per changed storage object. Object
//! keys parse as `"<subject>/<session>/<model>_<view>.<ext>"`; malformed
//! keys and foreign buckets are ignored. In batch mode the unique sessions
//! of a notification become one job each; in incremental mode every valid
//! record becomes its own view job.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;

use crate::config::ProcessingMode;
use crate::error::ApiResult;
use crate::services::{SessionTrigger, ViewTrigger};
use crate::storage::parse_evidence_key;
use crate::worker::Job;
use crate::AppState;

/// S3-style storage notification body
#[derive(Debug, Deserialize)]
pub struct StorageNotification {
    #[serde(rename = "Records", default)]
    pub records: Vec<StorageRecord>,
}

#[derive(Debug, Deserialize)]
pub struct StorageRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketInfo,
    pub object: ObjectInfo,
}

#[derive(Debug, Deserialize)]
pub struct BucketInfo {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
}

pub fn hook_routes() -> Router<AppState> {
    Router::new().route("/hooks/storage", post(storage_hook))
}

async fn storage_hook(
    State(state): State<AppState>,
    Json(notification): Json<StorageNotification>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let evidence_bucket = &state.config.storage.evidence_bucket;

    // Unique sessions per notification, so a multi-file upload batch
    // produces one session job, not one per file
    let mut sessions: BTreeSet<(String, String, String)> = BTreeSet::new();
    let mut view_jobs: Vec<ViewTrigger> = Vec::new();

    for record in &notification.records {
        if &record.s3.bucket.name != evidence_bucket {
            tracing::debug!(bucket = %record.s3.bucket.name, "Ignoring record for foreign bucket");
            continue;
        }

        let Some(evidence) = parse_evidence_key(&record.s3.object.key) else {
            tracing::warn!(key = %record.s3.object.key, "Ignoring malformed object key");
            continue;
        };

        match state.config.processing_mode {
            ProcessingMode::Session => {
                sessions.insert((
                    evidence.subject_id,
                    evidence.session_id,
                    evidence.model_id,
                ));
            }
            ProcessingMode::PerView => {
                view_jobs.push(ViewTrigger {
                    subject_id: evidence.subject_id,
                    session_id: evidence.session_id,
                    model_id: evidence.model_id,
                    declared_view: evidence.view,
                    object_key: crate::storage::decode_object_key(&record.s3.object.key),
                });
            }
        }
    }

    let queued = match state.config.processing_mode {
        ProcessingMode::Session => {
            let count = sessions.len();
            for (subject_id, session_id, model_id) in sessions {
                tracing::info!(
                    subject_id = %subject_id,
                    session_id = %session_id,
                    model_id = %model_id,
                    "Queueing session processing"
                );
                state
                    .jobs
                    .enqueue(Job::Session(SessionTrigger {
                        subject_id,
                        session_id,
                        model_id,
                        is_retry: false,
                    }))
                    .await?;
            }
            count
        }
        ProcessingMode::PerView => {
            let count = view_jobs.len();
            for trigger in view_jobs {
                tracing::info!(
                    subject_id = %trigger.subject_id,
                    session_id = %trigger.session_id,
                    view = %trigger.declared_view,
                    "Queueing view processing"
                );
                state.jobs.enqueue(Job::View(trigger)).await?;
            }
            count
        }
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "processing started",
            "jobs_queued": queued,
        })),
    ))
}
