//! Capture workflow API handlers
//!
//! POST /workflows, GET /workflows/{id}, capture, navigation and exits.

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, FromRequest, Multipart, Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::capture::{CaptureError, SelectedFile};
use crate::error::{ApiError, ApiResult};
use crate::models::{MorphologyRecord, StepTransition};
use crate::workflow::{
    CaptureReport, CompletionCallback, WorkflowController, WorkflowError, WorkflowOutcome,
    WorkflowSnapshot,
};
use crate::AppState;

/// Multipart field carrying the image
const IMAGE_FIELD: &str = "image";

/// POST /workflows request
#[derive(Debug, Default, Deserialize)]
pub struct OpenWorkflowRequest {
    /// Restrict the workflow to these configured cameras
    #[serde(default)]
    pub camera_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub report: CaptureReport,
    pub workflow: WorkflowSnapshot,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub transition: StepTransition,
    pub workflow: WorkflowSnapshot,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub workflow_id: Uuid,
    pub record: MorphologyRecord,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub workflow_id: Uuid,
    pub cancelled_at: chrono::DateTime<chrono::Utc>,
}

async fn find(state: &AppState, id: Uuid) -> ApiResult<Arc<WorkflowController>> {
    state
        .workflow(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Workflow {}", id)))
}

/// Remember failures that came from collaborators for /health
async fn track<T>(state: &AppState, result: Result<T, WorkflowError>) -> ApiResult<T> {
    if let Err(
        error @ (WorkflowError::Processing(_)
        | WorkflowError::Submit(_)
        | WorkflowError::Capture(_)),
    ) = &result
    {
        state.record_error(error.to_string()).await;
    }
    result.map_err(ApiError::from)
}

/// Read the `image` part of a multipart body, if present
async fn read_image(mut multipart: Multipart) -> Result<Option<SelectedFile>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let declared_mime = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;

        let mut file = SelectedFile::new(bytes);
        file.file_name = file_name;
        file.declared_mime = declared_mime;
        debug!(
            size_bytes = file.bytes.len(),
            file_name = ?file.file_name,
            declared_mime = ?file.declared_mime,
            "Image part received"
        );
        return Ok(Some(file));
    }
    Ok(None)
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Turn an unreadable multipart body into an API error.
///
/// A body over the request limit is an oversized image: it is attached to
/// the current step like any other capture failure. The request length
/// stands in for the image size, which was never read.
async fn upload_failed<T>(
    state: &AppState,
    controller: &WorkflowController,
    request_bytes: Option<usize>,
    error: MultipartError,
) -> ApiResult<T> {
    if error.status() != StatusCode::PAYLOAD_TOO_LARGE {
        return Err(ApiError::BadRequest(error.body_text()));
    }
    let max_bytes = controller.selector().settings().max_image_bytes;
    let too_large = CaptureError::TooLarge {
        size_bytes: request_bytes.unwrap_or(max_bytes + 1),
        max_bytes,
    };
    let rejected = controller.reject_capture(too_large).await;
    track(state, Err(rejected)).await
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"))
}

/// POST /workflows
///
/// Open a workflow. The body is optional; `camera_ids` restricts the
/// cameras offered to this workflow.
pub async fn open_workflow(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<WorkflowSnapshot>)> {
    let request: OpenWorkflowRequest = if body.is_empty() {
        OpenWorkflowRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?
    };

    let cameras = match request.camera_ids {
        None => None,
        Some(ids) => {
            let configured = state.services.selector.cameras();
            let mut selected = Vec::with_capacity(ids.len());
            for id in &ids {
                let camera = configured
                    .iter()
                    .find(|c| &c.id == id)
                    .ok_or_else(|| ApiError::BadRequest(format!("Unknown camera '{}'", id)))?;
                selected.push(camera.clone());
            }
            Some(selected)
        }
    };

    let workflows = state.workflows.clone();
    let on_complete: CompletionCallback = Box::new(move |workflow_id, outcome| {
        match &outcome {
            WorkflowOutcome::Submitted(record) => info!(
                workflow_id = %workflow_id,
                record_id = %record.id,
                "Workflow completed, releasing"
            ),
            WorkflowOutcome::Cancelled => {
                info!(workflow_id = %workflow_id, "Workflow cancelled, releasing")
            }
        }
        tokio::spawn(async move {
            workflows.write().await.remove(&workflow_id);
        });
    });

    let controller = Arc::new(WorkflowController::open(
        state.services.clone(),
        cameras,
        Some(on_complete),
    ));
    let snapshot = controller.snapshot().await;
    state
        .workflows
        .write()
        .await
        .insert(controller.id(), controller);

    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /workflows/{id}
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowSnapshot>> {
    let controller = find(&state, id).await?;
    Ok(Json(controller.snapshot().await))
}

/// POST /workflows/{id}/capture
///
/// Camera first when one is online for the current step; an attached
/// `image` part is used when there is none or when it fails.
pub async fn capture_auto(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    request: Request,
) -> ApiResult<Json<CaptureResponse>> {
    let controller = find(&state, id).await?;
    let upload = if is_multipart(&request) {
        let request_bytes = content_length(request.headers());
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        match read_image(multipart).await {
            Ok(file) => file,
            Err(e) => return upload_failed(&state, &controller, request_bytes, e).await,
        }
    } else {
        None
    };

    let report = track(&state, controller.capture_auto(upload).await).await?;
    Ok(Json(CaptureResponse {
        report,
        workflow: controller.snapshot().await,
    }))
}

/// POST /workflows/{id}/capture/upload
pub async fn capture_upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<Json<CaptureResponse>> {
    let controller = find(&state, id).await?;
    let file = match read_image(multipart).await {
        Ok(file) => file,
        Err(e) => {
            let request_bytes = content_length(&headers);
            return upload_failed(&state, &controller, request_bytes, e).await;
        }
    }
    .ok_or_else(|| ApiError::BadRequest(format!("Missing '{}' part", IMAGE_FIELD)))?;

    let report = track(&state, controller.capture_upload(file).await).await?;
    Ok(Json(CaptureResponse {
        report,
        workflow: controller.snapshot().await,
    }))
}

/// POST /workflows/{id}/next
pub async fn next_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TransitionResponse>> {
    let controller = find(&state, id).await?;
    let transition = track(&state, controller.next().await).await?;
    Ok(Json(TransitionResponse {
        transition,
        workflow: controller.snapshot().await,
    }))
}

/// POST /workflows/{id}/back
pub async fn previous_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TransitionResponse>> {
    let controller = find(&state, id).await?;
    let transition = track(&state, controller.back().await).await?;
    Ok(Json(TransitionResponse {
        transition,
        workflow: controller.snapshot().await,
    }))
}

/// POST /workflows/{id}/submit
pub async fn submit_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let controller = find(&state, id).await?;
    let record = track(&state, controller.submit().await).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            workflow_id: id,
            record,
        }),
    ))
}

/// POST /workflows/{id}/cancel
pub async fn cancel_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CancelResponse>> {
    let controller = find(&state, id).await?;
    controller.cancel().await?;
    Ok(Json(CancelResponse {
        workflow_id: id,
        cancelled_at: chrono::Utc::now(),
    }))
}

/// Build capture workflow routes
pub fn workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/workflows", post(open_workflow))
        .route("/workflows/events", get(super::sse::workflow_event_stream))
        .route("/workflows/:id", get(get_workflow))
        .route("/workflows/:id/capture", post(capture_auto))
        .route("/workflows/:id/capture/upload", post(capture_upload))
        .route("/workflows/:id/next", post(next_step))
        .route("/workflows/:id/back", post(previous_step))
        .route("/workflows/:id/submit", post(submit_workflow))
        .route("/workflows/:id/cancel", post(cancel_workflow))
}
