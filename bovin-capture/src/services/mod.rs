//! External collaborators
//!
//! The identification and measurement models and the record storage live
//! in other services. They are reached through three traits so that the
//! collaborator strategy (HTTP or mock) is chosen once at startup.

pub mod http_collaborator;
pub mod mock;
pub mod record_store;

pub use http_collaborator::HttpCollaborator;
pub use mock::MockCollaborator;
pub use record_store::InMemoryRecordStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AnimalId, CaptureResult, Measurements, MorphologyRecord, NewMorphologyRecord};

/// Identification / measurement call errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessingError {
    #[error("Request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Service rejected the request ({status}): {message}")]
    ServerRejected { status: u16, message: String },

    #[error("Confidence {confidence:.2} is below the required {threshold:.2}")]
    LowConfidence { confidence: f64, threshold: f64 },

    #[error("Service unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProcessingError {
    pub fn code(&self) -> &'static str {
        match self {
            ProcessingError::Timeout(_) => "TIMEOUT",
            ProcessingError::ServerRejected { .. } => "SERVER_REJECTED",
            ProcessingError::LowConfidence { .. } => "LOW_CONFIDENCE",
            ProcessingError::Unreachable(_) => "UNREACHABLE",
            ProcessingError::InvalidResponse(_) => "INVALID_RESPONSE",
        }
    }

    /// Message telling the user what to do next
    pub fn user_message(&self) -> String {
        match self {
            ProcessingError::Timeout(_) => {
                "The analysis took too long. Retry with the same image or take a new one."
                    .to_string()
            }
            ProcessingError::ServerRejected { message, .. } => format!(
                "The image was rejected ({}). Take a new picture or choose another file.",
                message
            ),
            ProcessingError::LowConfidence { confidence, .. } => format!(
                "The result is uncertain ({:.0}%). Take a clearer picture.",
                confidence * 100.0
            ),
            ProcessingError::Unreachable(_) => {
                "The analysis service cannot be reached. Retry in a moment.".to_string()
            }
            ProcessingError::InvalidResponse(_) => {
                "The analysis service returned an unexpected answer. Retry.".to_string()
            }
        }
    }
}

/// Record storage errors. Always retryable without recapturing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PersistenceError {
    #[error("Record storage timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Record storage rejected the record ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Record storage unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid record storage response: {0}")]
    InvalidResponse(String),
}

impl PersistenceError {
    pub fn code(&self) -> &'static str {
        match self {
            PersistenceError::Timeout(_) => "PERSISTENCE_TIMEOUT",
            PersistenceError::Rejected { .. } => "PERSISTENCE_REJECTED",
            PersistenceError::Unreachable(_) => "PERSISTENCE_UNREACHABLE",
            PersistenceError::InvalidResponse(_) => "PERSISTENCE_INVALID_RESPONSE",
        }
    }
}

/// `{cow_id, confidence}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentificationResponse {
    pub cow_id: String,
    pub confidence: f64,
}

/// `{hauteur_au_garrot, largeur_du_corps, longueur_du_corps, confidence}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphologyResponse {
    #[serde(flatten)]
    pub measurements: Measurements,
    pub confidence: f64,
}

#[async_trait]
pub trait IdentificationService: Send + Sync {
    /// Identify the animal in an uploaded or camera-sampled image
    async fn process_identification(
        &self,
        image: &CaptureResult,
    ) -> Result<IdentificationResponse, ProcessingError>;

    /// Let the service capture from one of its own cameras and identify
    async fn capture_from_camera(
        &self,
        camera_id: &str,
    ) -> Result<IdentificationResponse, ProcessingError>;
}

#[async_trait]
pub trait MorphologyService: Send + Sync {
    async fn process_morphology(
        &self,
        cow_id: &AnimalId,
        image: &CaptureResult,
    ) -> Result<MorphologyResponse, ProcessingError>;

    async fn capture_morphology_from_camera(
        &self,
        camera_id: &str,
        cow_id: &AnimalId,
    ) -> Result<MorphologyResponse, ProcessingError>;
}

/// Persistence collaborator for finished records
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_morphology_record(
        &self,
        record: &NewMorphologyRecord,
    ) -> Result<MorphologyRecord, PersistenceError>;

    async fn get_morphology_record(
        &self,
        id: Uuid,
    ) -> Result<Option<MorphologyRecord>, PersistenceError>;

    /// Returns false when no record had this id
    async fn delete_morphology_record(&self, id: Uuid) -> Result<bool, PersistenceError>;
}

/// The collaborator strategy selected at startup
#[derive(Clone)]
pub struct Collaborators {
    pub identification: Arc<dyn IdentificationService>,
    pub morphology: Arc<dyn MorphologyService>,
    pub records: Arc<dyn RecordStore>,
}

impl Collaborators {
    /// All three operations served by one HTTP backend
    pub fn http(client: HttpCollaborator) -> Self {
        let client = Arc::new(client);
        Self {
            identification: client.clone(),
            morphology: client.clone(),
            records: client,
        }
    }

    /// Deterministic local models with an in-memory record store
    pub fn mock(mock: MockCollaborator, records: InMemoryRecordStore) -> Self {
        let mock = Arc::new(mock);
        Self {
            identification: mock.clone(),
            morphology: mock,
            records: Arc::new(records),
        }
    }
}
