//! HTTP collaborator client
//!
//! One client for the identification model, the measurement model and
//! the morphology record storage, all reached under a single base URL.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use super::{
    IdentificationResponse, IdentificationService, MorphologyResponse, MorphologyService,
    PersistenceError, ProcessingError, RecordStore,
};
use crate::models::{AnimalId, CaptureResult, MorphologyRecord, NewMorphologyRecord};

const USER_AGENT: &str = concat!("bovin-capture/", env!("CARGO_PKG_VERSION"));

/// Rejection bodies longer than this are cut before reaching the user
const MAX_ERROR_MESSAGE_CHARS: usize = 200;

/// A non-2xx answer or a transport failure, before it is mapped onto the
/// error type of the calling operation
#[derive(Debug)]
enum CallFailure {
    Timeout,
    Unreachable(String),
    Status(u16, String),
    Decode(String),
}

impl CallFailure {
    fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CallFailure::Timeout
        } else if e.is_decode() {
            CallFailure::Decode(e.to_string())
        } else {
            CallFailure::Unreachable(e.to_string())
        }
    }

    fn into_processing(self, timeout: Duration) -> ProcessingError {
        match self {
            CallFailure::Timeout => ProcessingError::Timeout(timeout),
            CallFailure::Unreachable(reason) => ProcessingError::Unreachable(reason),
            CallFailure::Status(status, message) => {
                ProcessingError::ServerRejected { status, message }
            }
            CallFailure::Decode(reason) => ProcessingError::InvalidResponse(reason),
        }
    }

    fn into_persistence(self, timeout: Duration) -> PersistenceError {
        match self {
            CallFailure::Timeout => PersistenceError::Timeout(timeout),
            CallFailure::Unreachable(reason) => PersistenceError::Unreachable(reason),
            CallFailure::Status(status, message) => PersistenceError::Rejected { status, message },
            CallFailure::Decode(reason) => PersistenceError::InvalidResponse(reason),
        }
    }
}

/// Pull a readable message out of an error body.
///
/// Understands `{"detail": ...}`, `{"message": ...}` and
/// `{"error": {"message": ...}}`; anything else is returned as text.
fn rejection_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("detail")
                .or_else(|| value.get("message"))
                .or_else(|| value.pointer("/error/message"))
                .map(|detail| match detail {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
        });

    let message = match from_json {
        Some(message) => message,
        None if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        None => body.trim().to_string(),
    };

    message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, CallFailure> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CallFailure::Status(
            status.as_u16(),
            rejection_message(status, &body),
        ));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| CallFailure::Decode(e.to_string()))
}

fn image_part(image: &CaptureResult) -> Result<Part, CallFailure> {
    Part::bytes(image.encoded_image.to_vec())
        .file_name(image.file_name())
        .mime_str(image.mime_type.as_str())
        .map_err(|e| CallFailure::Unreachable(e.to_string()))
}

#[derive(Serialize)]
struct CameraCaptureRequest<'a> {
    camera_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cow_id: Option<&'a str>,
}

/// reqwest-backed implementation of all three collaborator traits
pub struct HttpCollaborator {
    http_client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpCollaborator {
    /// `request_timeout` is the transport ceiling; stages enforce their
    /// own, shorter deadlines on top of it.
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ProcessingError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| ProcessingError::Unreachable(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Multipart POST carrying `image` plus any text fields
    async fn post_image<T: DeserializeOwned>(
        &self,
        path: &str,
        fields: Vec<(&'static str, String)>,
        image: &CaptureResult,
    ) -> Result<T, CallFailure> {
        let mut form = Form::new();
        for (name, value) in fields {
            form = form.text(name, value);
        }
        let form = form.part("image", image_part(image)?);

        tracing::debug!(
            url = %self.url(path),
            size_bytes = image.size_bytes,
            mime_type = %image.mime_type,
            "Posting image to collaborator"
        );
        let response = self
            .http_client
            .post(self.url(path))
            .multipart(form)
            .send()
            .await
            .map_err(CallFailure::from_transport)?;
        decode(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CallFailure> {
        tracing::debug!(url = %self.url(path), "Posting JSON to collaborator");
        let response = self
            .http_client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(CallFailure::from_transport)?;
        decode(response).await
    }
}

#[async_trait]
impl IdentificationService for HttpCollaborator {
    async fn process_identification(
        &self,
        image: &CaptureResult,
    ) -> Result<IdentificationResponse, ProcessingError> {
        self.post_image("/identification/process", Vec::new(), image)
            .await
            .map_err(|e| e.into_processing(self.request_timeout))
    }

    async fn capture_from_camera(
        &self,
        camera_id: &str,
    ) -> Result<IdentificationResponse, ProcessingError> {
        let body = CameraCaptureRequest {
            camera_id,
            cow_id: None,
        };
        self.post_json("/identification/capture", &body)
            .await
            .map_err(|e| e.into_processing(self.request_timeout))
    }
}

#[async_trait]
impl MorphologyService for HttpCollaborator {
    async fn process_morphology(
        &self,
        cow_id: &AnimalId,
        image: &CaptureResult,
    ) -> Result<MorphologyResponse, ProcessingError> {
        self.post_image(
            "/morphology/process",
            vec![("cow_id", cow_id.to_string())],
            image,
        )
        .await
        .map_err(|e| e.into_processing(self.request_timeout))
    }

    async fn capture_morphology_from_camera(
        &self,
        camera_id: &str,
        cow_id: &AnimalId,
    ) -> Result<MorphologyResponse, ProcessingError> {
        let body = CameraCaptureRequest {
            camera_id,
            cow_id: Some(cow_id.as_str()),
        };
        self.post_json("/morphology/capture", &body)
            .await
            .map_err(|e| e.into_processing(self.request_timeout))
    }
}

#[async_trait]
impl RecordStore for HttpCollaborator {
    async fn create_morphology_record(
        &self,
        record: &NewMorphologyRecord,
    ) -> Result<MorphologyRecord, PersistenceError> {
        let created: MorphologyRecord = self
            .post_json("/morphology-records", record)
            .await
            .map_err(|e| e.into_persistence(self.request_timeout))?;

        tracing::info!(
            record_id = %created.id,
            cow_id = %created.animal_id,
            "Morphology record created"
        );
        Ok(created)
    }

    async fn get_morphology_record(
        &self,
        id: Uuid,
    ) -> Result<Option<MorphologyRecord>, PersistenceError> {
        let response = self
            .http_client
            .get(self.url(&format!("/morphology-records/{}", id)))
            .send()
            .await
            .map_err(|e| CallFailure::from_transport(e).into_persistence(self.request_timeout))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response)
            .await
            .map(Some)
            .map_err(|e| e.into_persistence(self.request_timeout))
    }

    async fn delete_morphology_record(&self, id: Uuid) -> Result<bool, PersistenceError> {
        let response = self
            .http_client
            .delete(self.url(&format!("/morphology-records/{}", id)))
            .send()
            .await
            .map_err(|e| CallFailure::from_transport(e).into_persistence(self.request_timeout))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Rejected {
                status: status.as_u16(),
                message: rejection_message(status, &body),
            });
        }
        tracing::info!(record_id = %id, "Morphology record deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_message_reads_detail() {
        let msg = rejection_message(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"detail": "No cow found in image"}"#,
        );
        assert_eq!(msg, "No cow found in image");
    }

    #[test]
    fn test_rejection_message_reads_nested_error() {
        let msg = rejection_message(
            StatusCode::BAD_REQUEST,
            r#"{"error": {"code": "BAD_IMAGE", "message": "Blurry"}}"#,
        );
        assert_eq!(msg, "Blurry");
    }

    #[test]
    fn test_rejection_message_falls_back_to_reason() {
        assert_eq!(
            rejection_message(StatusCode::SERVICE_UNAVAILABLE, "  "),
            "Service Unavailable"
        );
        assert_eq!(rejection_message(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = HttpCollaborator::new("http://localhost:8000/api/", Duration::from_secs(5))
            .unwrap();
        assert_eq!(
            client.url("/morphology-records"),
            "http://localhost:8000/api/morphology-records"
        );
    }

    #[test]
    fn test_camera_request_omits_absent_cow_id() {
        let body = CameraCaptureRequest {
            camera_id: "cam-1",
            cow_id: None,
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"camera_id":"cam-1"}"#);
    }
}
