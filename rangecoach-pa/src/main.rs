//! rangecoach-pa - Posture Analysis Service
//!
//! Converts uploaded stance evidence (images/videos) into calibrated
//! per-view quality scores: storage notifications trigger sessions, frames
//! stream to the external pose inference service, and aggregated results
//! land on the durable session record.

use anyhow::Result;
use rangecoach_common::events::EventBus;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rangecoach_pa::config::ServiceConfig;
use rangecoach_pa::services::{PerViewPipeline, SessionOrchestrator};
use rangecoach_pa::storage::FsObjectStore;
use rangecoach_pa::worker::{spawn_workers, JobQueue, WorkerContext};
use rangecoach_pa::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting rangecoach-pa (Posture Analysis) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Step 1: Load configuration (env → TOML → defaults)
    let config = Arc::new(ServiceConfig::load()?);
    info!(
        mode = ?config.processing_mode,
        workers = config.worker_count,
        "Configuration loaded"
    );

    // Step 2: Resolve and create the data directory
    let data_dir = rangecoach_common::config::resolve_data_dir(
        "RANGECOACH_DATA_DIR",
        config.data_dir.as_deref(),
        "posture-analysis",
    );
    let initializer = rangecoach_common::config::DataDirInitializer::new(data_dir);
    initializer.ensure_directory_exists()?;

    // Step 3: Open or create the database
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = rangecoach_pa::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Object store rooted in the data directory
    let store = Arc::new(FsObjectStore::new(initializer.data_dir().to_path_buf()));

    // Event bus for progress broadcasting
    let event_bus = EventBus::new(100);

    // Worker pool with bounded job queue
    let (jobs, job_rx) = JobQueue::new(config.job_queue_capacity);
    let orchestrator = Arc::new(SessionOrchestrator::new(
        db_pool.clone(),
        store.clone(),
        event_bus.clone(),
        config.clone(),
    ));
    let per_view = Arc::new(PerViewPipeline::new(
        db_pool.clone(),
        store.clone(),
        event_bus.clone(),
        config.clone(),
    ));
    let workers = spawn_workers(
        config.worker_count,
        job_rx,
        WorkerContext {
            orchestrator,
            per_view,
        },
    );
    info!(workers = workers.len(), "Worker pool started");

    // HTTP surface
    let state = AppState::new(db_pool, event_bus, jobs, config.clone(), store);
    let app = rangecoach_pa::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
