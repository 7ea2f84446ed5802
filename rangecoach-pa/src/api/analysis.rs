//! Session record lookup and the explicit retry command

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::SessionRecord;
use crate::services::SessionTrigger;
use crate::worker::Job;
use crate::AppState;

/// Body of the retry command; the model may be swapped on retry
#[derive(Debug, Default, Deserialize)]
pub struct RetryRequest {
    #[serde(default)]
    pub model_id: Option<String>,
}

pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/analysis/:subject_id/:session_id", get(get_session))
        .route(
            "/analysis/:subject_id/:session_id/retry",
            post(retry_session),
        )
}

async fn get_session(
    State(state): State<AppState>,
    Path((subject_id, session_id)): Path<(String, String)>,
) -> ApiResult<Json<SessionRecord>> {
    let record = db::sessions::load_record(&state.db, &subject_id, &session_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("session {}/{}", subject_id, session_id))
        })?;
    Ok(Json(record))
}

/// Explicit retry: the only path that re-triggers a `failed` (or any
/// known) session. Resets status and supersedes prior per-view results
/// once a worker picks the job up.
async fn retry_session(
    State(state): State<AppState>,
    Path((subject_id, session_id)): Path<(String, String)>,
    body: Option<Json<RetryRequest>>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let record = db::sessions::load_record(&state.db, &subject_id, &session_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("session {}/{}", subject_id, session_id))
        })?;

    let model_id = body
        .and_then(|Json(request)| request.model_id)
        .unwrap_or(record.model_id);

    if !state.config.inference.endpoints.contains_key(&model_id) {
        return Err(ApiError::BadRequest(format!(
            "model not available: {}",
            model_id
        )));
    }

    tracing::info!(
        subject_id = %subject_id,
        session_id = %session_id,
        model_id = %model_id,
        "Queueing session retry"
    );

    state
        .jobs
        .enqueue(Job::Session(SessionTrigger {
            subject_id,
            session_id,
            model_id,
            is_retry: true,
        }))
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "retry queued" })),
    ))
}
