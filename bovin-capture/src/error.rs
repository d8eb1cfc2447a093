//! Error types for bovin-capture's HTTP surface

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::capture::CaptureError;
use crate::services::ProcessingError;
use crate::workflow::{SubmitError, WorkflowError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Workflow failure, status derived from the failure
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

fn workflow_status(error: &WorkflowError) -> StatusCode {
    match error {
        WorkflowError::Busy => StatusCode::CONFLICT,
        WorkflowError::GateClosed { .. } | WorkflowError::InvalidTransition(_) => {
            StatusCode::CONFLICT
        }
        WorkflowError::Closed | WorkflowError::Cancelled => StatusCode::GONE,
        WorkflowError::Capture(e) => match e {
            CaptureError::SourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CaptureError::InvalidFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            CaptureError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CaptureError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        WorkflowError::Processing(e) => match e {
            ProcessingError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProcessingError::ServerRejected { .. } | ProcessingError::LowConfidence { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ProcessingError::Unreachable(_) | ProcessingError::InvalidResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
        },
        WorkflowError::Submit(SubmitError::Validation(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        WorkflowError::Submit(SubmitError::Persistence(_)) => StatusCode::BAD_GATEWAY,
    }
}

/// Message shown to the user for a workflow failure
fn workflow_message(error: &WorkflowError) -> String {
    match error {
        WorkflowError::Capture(e) => e.user_message(),
        WorkflowError::Processing(e) => e.user_message(),
        WorkflowError::Submit(e) => e.user_message(),
        other => other.to_string(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Workflow(ref err) => {
                (workflow_status(err), err.code(), workflow_message(err))
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(workflow_status(&WorkflowError::Busy), StatusCode::CONFLICT);
        assert_eq!(
            workflow_status(&WorkflowError::Processing(ProcessingError::Timeout(
                Duration::from_secs(15)
            ))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            workflow_status(&WorkflowError::Capture(CaptureError::TooLarge {
                size_bytes: 2,
                max_bytes: 1
            })),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_response_uses_error_envelope() {
        let response = ApiError::NotFound("workflow".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
