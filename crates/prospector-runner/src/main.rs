//! Command-line entry point for the treasure harvesting agent.
//!
//! The runner loads `prospector.yaml`, connects an HTTP client to the game
//! server and runs the pipeline until every worker exits or the process
//! receives Ctrl-C.
//!
//! ```text
//! prospector [CONFIG]
//! ```
//!
//! The configuration path is taken from `PROSPECTOR_CONFIG`, then the first
//! argument, and defaults to `prospector.yaml` in the working directory.
//! `ADDRESS`, `PORT`, `SCHEMA` and `PROSPECTOR_BASE_URL` override the
//! server location.

mod error;
mod http;
mod poller;

use std::path::PathBuf;

use prospector_core::{Pipeline, PipelineConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::RunnerError;
use crate::http::HttpGameApi;

const DEFAULT_CONFIG: &str = "prospector.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the HTTP client cannot
/// be built, or the server fails its startup health check.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("prospector starting");

    let path = config_path();
    let config = PipelineConfig::from_file(&path).map_err(RunnerError::from)?;
    info!(
        path = %path.display(),
        base_url = config.api.base_url,
        width = config.world.width,
        height = config.world.height,
        max_depth = config.world.max_depth,
        diggers = config.workers.diggers,
        max_permits = config.permits.max_concurrent,
        "configuration loaded"
    );

    let api = HttpGameApi::new(&config.api)?;
    let pipeline = Pipeline::new(api, config);
    let mut handle = pipeline.start().await.map_err(RunnerError::from)?;
    info!(tasks = handle.len(), "pipeline running");

    tokio::select! {
        () = drain(&mut handle) => info!("all workers finished"),
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("interrupted, shutting down"),
            Err(e) => warn!(error = %e, "failed to listen for ctrl-c, shutting down"),
        },
    }
    handle.shutdown().await;

    let stats = pipeline.stats().snapshot();
    info!(
        balance = pipeline.wallet().balance(),
        stats = serde_json::to_string(&stats).unwrap_or_default(),
        "prospector stopped"
    );
    Ok(())
}

async fn drain(handle: &mut prospector_core::PipelineHandle) {
    while handle.join_next().await {}
}

fn config_path() -> PathBuf {
    std::env::var_os("PROSPECTOR_CONFIG")
        .map(PathBuf::from)
        .or_else(|| std::env::args_os().nth(1).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}
