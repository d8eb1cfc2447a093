//! bovin-capture library interface
//!
//! Guided two-stage capture of an animal: identify it from one image,
//! measure it from a second, then store the resulting morphology record.
//! Exposes public APIs for integration testing.

pub mod api;
pub mod capture;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod stages;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use bovin_common::events::EventBus;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::BackendMode;
use crate::workflow::{WorkflowController, WorkflowServices};

/// Multipart framing allowance on top of the image size limit
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Open workflows by id
pub type WorkflowRegistry = Arc<RwLock<HashMap<Uuid, Arc<WorkflowController>>>>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Stages, submitter, camera selection and event bus
    pub services: Arc<WorkflowServices>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Workflows currently open; entries leave on submit or cancel
    pub workflows: WorkflowRegistry,
    /// Collaborator strategy chosen at startup
    pub backend_mode: BackendMode,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(services: Arc<WorkflowServices>, backend_mode: BackendMode) -> Self {
        Self {
            event_bus: services.event_bus.clone(),
            services,
            workflows: Arc::new(RwLock::new(HashMap::new())),
            backend_mode,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn workflow(&self, id: Uuid) -> Option<Arc<WorkflowController>> {
        self.workflows.read().await.get(&id).cloned()
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.services.selector.settings().max_image_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .merge(api::workflow_routes())
        .merge(api::camera_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
