//! rangecoach-pa library interface
//!
//! Exposes the analysis core, pipeline services, and HTTP surface for the
//! binary and for integration testing.

pub mod analysis;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod worker;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use rangecoach_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::storage::ObjectStore;
use crate::worker::JobQueue;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for session progress broadcasting
    pub event_bus: EventBus,
    /// Sending half of the worker job queue
    pub jobs: JobQueue,
    /// Resolved service configuration
    pub config: Arc<ServiceConfig>,
    /// Object store holding evidence files and result documents
    pub store: Arc<dyn ObjectStore>,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        jobs: JobQueue,
        config: Arc<ServiceConfig>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            db,
            event_bus,
            jobs,
            config,
            store,
            startup_time: Utc::now(),
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::hook_routes())
        .merge(api::analysis_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
