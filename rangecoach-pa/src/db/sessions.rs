//! Session record persistence
//!
//! The durable session row is the one shared mutable resource in the
//! system. Two access disciplines operate on it: the orchestrator's
//! whole-session claim (duplicate-trigger guard) and the merger's
//! version-guarded read-modify-write.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use crate::models::{SessionRecord, SessionResult, SessionStatus, ViewLabel};
use rangecoach_common::{Error, Result};

/// Load a session record; `None` when the session is unknown
pub async fn load_record(
    pool: &SqlitePool,
    subject_id: &str,
    session_id: &str,
) -> Result<Option<SessionRecord>> {
    let row = sqlx::query(
        r#"
        SELECT subject_id, session_id, model_id, status, results, error,
               version, created_at, updated_at
        FROM analysis_sessions
        WHERE subject_id = ? AND session_id = ?
        "#,
    )
    .bind(subject_id)
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    row.map(record_from_row).transpose()
}

/// Create the session row if absent, leaving an existing row untouched
pub async fn insert_if_absent(
    pool: &SqlitePool,
    subject_id: &str,
    session_id: &str,
    model_id: &str,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO analysis_sessions
            (subject_id, session_id, model_id, status, results, error, version, created_at, updated_at)
        VALUES (?, ?, ?, 'pending', '{}', NULL, 0, ?, ?)
        "#,
    )
    .bind(subject_id)
    .bind(session_id)
    .bind(model_id)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Atomically claim a session for processing.
///
/// Creates the row `in_progress` when absent; takes over a `pending` or
/// `failed` row. Returns false — the duplicate-trigger guard — when the
/// session is already `in_progress` or `completed`.
pub async fn try_claim(
    pool: &SqlitePool,
    subject_id: &str,
    session_id: &str,
    model_id: &str,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        INSERT INTO analysis_sessions
            (subject_id, session_id, model_id, status, results, error, version, created_at, updated_at)
        VALUES (?, ?, ?, 'in_progress', '{}', NULL, 0, ?, ?)
        ON CONFLICT(subject_id, session_id) DO UPDATE SET
            status = 'in_progress',
            model_id = excluded.model_id,
            error = NULL,
            version = analysis_sessions.version + 1,
            updated_at = excluded.updated_at
        WHERE analysis_sessions.status NOT IN ('in_progress', 'completed')
        "#,
    )
    .bind(subject_id)
    .bind(session_id)
    .bind(model_id)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Reset a session for an explicit retry command.
///
/// Supersedes all prior per-view results, clears the error, optionally
/// swaps the model, and puts the session back `in_progress`. Returns false
/// when the session is unknown.
pub async fn reset_for_retry(
    pool: &SqlitePool,
    subject_id: &str,
    session_id: &str,
    new_model_id: Option<&str>,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        UPDATE analysis_sessions SET
            status = 'in_progress',
            model_id = COALESCE(?, model_id),
            results = '{}',
            error = NULL,
            version = version + 1,
            updated_at = ?
        WHERE subject_id = ? AND session_id = ?
        "#,
    )
    .bind(new_model_id)
    .bind(&now)
    .bind(subject_id)
    .bind(session_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Write the final state of a claimed session (orchestrator path; the
/// claim makes this session-exclusive, so no version guard is needed)
pub async fn finalize(
    pool: &SqlitePool,
    subject_id: &str,
    session_id: &str,
    results: &BTreeMap<ViewLabel, SessionResult>,
    status: SessionStatus,
    error: Option<&str>,
) -> Result<()> {
    let results_json = serde_json::to_string(results)
        .map_err(|e| Error::Internal(format!("Failed to serialize results: {}", e)))?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        UPDATE analysis_sessions SET
            results = ?,
            status = ?,
            error = ?,
            version = version + 1,
            updated_at = ?
        WHERE subject_id = ? AND session_id = ?
        "#,
    )
    .bind(&results_json)
    .bind(status.as_str())
    .bind(error)
    .bind(&now)
    .bind(subject_id)
    .bind(session_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark a session failed with a best-effort error description
pub async fn mark_failed(
    pool: &SqlitePool,
    subject_id: &str,
    session_id: &str,
    error: &str,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        UPDATE analysis_sessions SET
            status = 'failed',
            error = ?,
            version = version + 1,
            updated_at = ?
        WHERE subject_id = ? AND session_id = ?
        "#,
    )
    .bind(error)
    .bind(&now)
    .bind(subject_id)
    .bind(session_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Version-guarded write of the merged results map (merger path).
///
/// Succeeds only if no concurrent writer advanced the row since it was
/// read at `expected_version`; returns false on conflict so the caller can
/// re-run its read-modify-write.
pub async fn update_versioned(
    pool: &SqlitePool,
    subject_id: &str,
    session_id: &str,
    results: &BTreeMap<ViewLabel, SessionResult>,
    status: SessionStatus,
    expected_version: i64,
) -> Result<bool> {
    let results_json = serde_json::to_string(results)
        .map_err(|e| Error::Internal(format!("Failed to serialize results: {}", e)))?;
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        r#"
        UPDATE analysis_sessions SET
            results = ?,
            status = ?,
            error = NULL,
            version = version + 1,
            updated_at = ?
        WHERE subject_id = ? AND session_id = ? AND version = ?
        "#,
    )
    .bind(&results_json)
    .bind(status.as_str())
    .bind(&now)
    .bind(subject_id)
    .bind(session_id)
    .bind(expected_version)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn record_from_row(row: sqlx::sqlite::SqliteRow) -> Result<SessionRecord> {
    let status_text: String = row.get("status");
    let status = SessionStatus::parse(&status_text)
        .ok_or_else(|| Error::Internal(format!("Unknown session status: {}", status_text)))?;

    let results_json: String = row.get("results");
    let results: BTreeMap<ViewLabel, SessionResult> = serde_json::from_str(&results_json)
        .map_err(|e| Error::Internal(format!("Failed to deserialize results: {}", e)))?;

    let created_at: String = row.get("created_at");
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let updated_at: String = row.get("updated_at");
    let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| Error::Internal(format!("Failed to parse updated_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    Ok(SessionRecord {
        subject_id: row.get("subject_id"),
        session_id: row.get("session_id"),
        model_id: row.get("model_id"),
        status,
        results,
        error: row.get("error"),
        version: row.get("version"),
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;

    #[tokio::test]
    async fn claim_is_granted_once_then_guarded() {
        let pool = init_memory_pool().await.unwrap();

        assert!(try_claim(&pool, "7", "s-1", "cx").await.unwrap());
        // Duplicate trigger while in progress is dropped
        assert!(!try_claim(&pool, "7", "s-1", "cx").await.unwrap());

        let rec = load_record(&pool, "7", "s-1").await.unwrap().unwrap();
        assert_eq!(rec.status, SessionStatus::InProgress);
    }

    #[tokio::test]
    async fn completed_sessions_reject_new_claims_but_allow_retry() {
        let pool = init_memory_pool().await.unwrap();
        assert!(try_claim(&pool, "7", "s-1", "cx").await.unwrap());
        finalize(&pool, "7", "s-1", &BTreeMap::new(), SessionStatus::Completed, None)
            .await
            .unwrap();

        assert!(!try_claim(&pool, "7", "s-1", "cx").await.unwrap());
        assert!(reset_for_retry(&pool, "7", "s-1", Some("gy")).await.unwrap());

        let rec = load_record(&pool, "7", "s-1").await.unwrap().unwrap();
        assert_eq!(rec.status, SessionStatus::InProgress);
        assert_eq!(rec.model_id, "gy");
        assert!(rec.results.is_empty());
    }

    #[tokio::test]
    async fn failed_sessions_can_be_reclaimed_by_new_triggers() {
        let pool = init_memory_pool().await.unwrap();
        assert!(try_claim(&pool, "7", "s-1", "cx").await.unwrap());
        mark_failed(&pool, "7", "s-1", "no frames processed").await.unwrap();

        let rec = load_record(&pool, "7", "s-1").await.unwrap().unwrap();
        assert_eq!(rec.status, SessionStatus::Failed);
        assert_eq!(rec.error.as_deref(), Some("no frames processed"));

        assert!(try_claim(&pool, "7", "s-1", "cx").await.unwrap());
    }

    #[tokio::test]
    async fn retry_of_unknown_session_reports_not_found() {
        let pool = init_memory_pool().await.unwrap();
        assert!(!reset_for_retry(&pool, "7", "absent", None).await.unwrap());
    }

    #[tokio::test]
    async fn versioned_update_detects_conflicts() {
        let pool = init_memory_pool().await.unwrap();
        insert_if_absent(&pool, "7", "s-1", "cx").await.unwrap();
        let rec = load_record(&pool, "7", "s-1").await.unwrap().unwrap();

        // First write at the observed version wins
        assert!(update_versioned(
            &pool,
            "7",
            "s-1",
            &BTreeMap::new(),
            SessionStatus::InProgress,
            rec.version
        )
        .await
        .unwrap());

        // Second write at the stale version loses
        assert!(!update_versioned(
            &pool,
            "7",
            "s-1",
            &BTreeMap::new(),
            SessionStatus::InProgress,
            rec.version
        )
        .await
        .unwrap());
    }
}
