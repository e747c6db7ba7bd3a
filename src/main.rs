//! # PSD Jobs - Entry Point
//! src/main.rs
//!
//! Arranque: `.env` → CLI/env → logging → store → artefactos → servidor.

use psd_jobs::artifacts::FileArtifactStore;
use psd_jobs::config::Config;
use psd_jobs::jobs::{JobManager, JobManagerConfig};
use psd_jobs::metrics::MetricsCollector;
use psd_jobs::render::CanvasGenerator;
use psd_jobs::server::{AppState, ConnectionLimits, Server};
use psd_jobs::store::{KeyValueStore, MemoryStore, RedisStore};
use psd_jobs::telemetry;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    let config = Config::new();

    if let Err(e) = telemetry::init_logging(config.log_format) {
        eprintln!("failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }
    if let Err(e) = dotenv {
        if !e.not_found() {
            warn!(error = %e, "Ignoring unreadable .env file");
        }
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }
    config.log_summary();

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Fatal error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let kv: Arc<dyn KeyValueStore> = match &config.redis_url {
        Some(url) => {
            let store = RedisStore::connect(url, config.redis_pool_size, REDIS_CONNECT_TIMEOUT)?;
            info!(pool_size = config.redis_pool_size, "Using Redis store");
            Arc::new(store)
        }
        None => {
            warn!("REDIS_URL not set: using in-memory store, deduplication is per process");
            Arc::new(MemoryStore::new())
        }
    };

    let artifacts = FileArtifactStore::open(&config.artifact_dir)?;
    info!(dir = %artifacts.dir().display(), "Artifact store ready");

    let metrics = MetricsCollector::new();
    let jobs = JobManager::new(
        JobManagerConfig::from_config(&config),
        kv,
        Arc::new(artifacts),
        Arc::new(CanvasGenerator::new()),
        metrics.clone(),
    );

    let server = Server::new(AppState { jobs, metrics }, ConnectionLimits::from_config(&config));
    server.run(config.address())?;
    Ok(())
}
