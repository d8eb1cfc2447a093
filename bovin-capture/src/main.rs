//! bovin-capture - Guided animal capture service
//!
//! Identifies an animal from one image, measures it from a second and
//! stores the resulting morphology record through the configured backend.
//! Serves the workflow over HTTP + SSE on port 5731 by default.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bovin_capture::capture::{
    CameraFeed, FeedRegistry, SnapshotFeed, SourceSelector, StillFrameFeed,
};
use bovin_capture::config::{BackendMode, CaptureConfig, MODULE_NAME};
use bovin_capture::services::{
    Collaborators, HttpCollaborator, InMemoryRecordStore, MockCollaborator,
};
use bovin_capture::workflow::WorkflowServices;
use bovin_capture::AppState;
use bovin_common::events::EventBus;

/// Test pattern size for cameras without a snapshot URL in mock mode
const TEST_PATTERN_SIZE: (u32, u32) = (640, 480);

/// Command-line arguments for bovin-capture
#[derive(Parser, Debug)]
#[command(name = "bovin-capture")]
#[command(about = "Guided identification and morphology capture service")]
#[command(version)]
struct Args {
    /// Bootstrap TOML file (overrides BOVIN_CONFIG and the platform default)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is loaded before logging is up; its own log lines are only
    // visible when RUST_LOG is set.
    let loaded = CaptureConfig::load(args.config.as_deref());
    let default_level = loaded
        .as_ref()
        .map(|(config, _)| config.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("bovin_capture={0},bovin_common={0},tower_http=info", default_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (config, source) = loaded.context("Failed to load configuration")?;

    info!("Starting {} (Capture Workflow) microservice", MODULE_NAME);
    info!(
        "Version: {} ({}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match source.path() {
        Some(path) => info!("Configuration: {}", path.display()),
        None => warn!("No configuration file found, using compiled defaults"),
    }

    let collaborators = build_collaborators(&config)?;
    info!("Backend: {}", config.backend.mode);

    let feeds = build_feeds(&config);
    info!(
        "Cameras: {} configured, {} with a live feed",
        config.cameras.len(),
        feeds.len()
    );

    let selector = SourceSelector::new(config.camera_infos(), feeds, config.capture_settings());

    // Create event bus for SSE broadcasting
    let event_bus = EventBus::new(100);

    let services = Arc::new(WorkflowServices::new(
        collaborators,
        selector,
        config.workflow_settings(),
        event_bus,
    ));
    let state = AppState::new(services, config.backend.mode);
    let app = bovin_capture::build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn build_collaborators(config: &CaptureConfig) -> Result<Collaborators> {
    match config.backend.mode {
        BackendMode::Http => {
            let base_url = config
                .backend
                .base_url
                .clone()
                .context("backend.base_url is required in http mode")?;
            info!("Backend URL: {}", base_url);
            let client = HttpCollaborator::new(base_url, config.request_timeout())
                .map_err(|e| anyhow::anyhow!("Failed to build backend client: {}", e))?;
            Ok(Collaborators::http(client))
        }
        BackendMode::Mock => {
            let mut records = InMemoryRecordStore::new();
            if let Some(operator) = &config.backend.operator {
                records = records.with_created_by(operator.clone());
            }
            Ok(Collaborators::mock(MockCollaborator::new(), records))
        }
    }
}

/// One feed per camera that can deliver frames. Cameras without a feed
/// stay listed and fall through to upload.
fn build_feeds(config: &CaptureConfig) -> FeedRegistry {
    let mut feeds = FeedRegistry::new();
    for camera in &config.cameras {
        if let Some(url) = &camera.snapshot_url {
            match SnapshotFeed::new(url.clone(), config.capture_settings().frame_ready_timeout) {
                Ok(feed) => {
                    feeds.insert(camera.id.clone(), Arc::new(CameraFeed::new(Arc::new(feed))))
                }
                Err(e) => warn!("Camera '{}' feed unavailable: {}", camera.id, e),
            }
        } else if config.backend.mode == BackendMode::Mock {
            let (width, height) = TEST_PATTERN_SIZE;
            let feed = StillFrameFeed::test_pattern(width, height);
            feeds.insert(camera.id.clone(), Arc::new(CameraFeed::new(Arc::new(feed))));
        }
    }
    feeds
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
