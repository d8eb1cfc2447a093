//! Record submission

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::models::{MorphologyRecord, NewMorphologyRecord, SourceDetection, WorkflowState};
use crate::services::{PersistenceError, RecordStore};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    /// The state handed over cannot produce a record. Indicates a bug.
    #[error("Record validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl SubmitError {
    pub fn code(&self) -> &'static str {
        match self {
            SubmitError::Validation(_) => "VALIDATION_FAILED",
            SubmitError::Persistence(e) => e.code(),
        }
    }

    /// Persistence failures may be submitted again as they are
    pub fn retryable(&self) -> bool {
        matches!(self, SubmitError::Persistence(_))
    }

    pub fn user_message(&self) -> String {
        match self {
            SubmitError::Validation(_) => {
                "The record could not be prepared. Restart the capture.".to_string()
            }
            SubmitError::Persistence(_) => {
                "The record could not be saved. Submit again; the images are kept.".to_string()
            }
        }
    }
}

/// Builds the final record from a finished workflow and stores it
#[derive(Clone)]
pub struct RecordSubmitter {
    store: Arc<dyn RecordStore>,
    timeout: Duration,
}

impl RecordSubmitter {
    pub fn new(store: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Payload from the identifier, the fixed `automatique` label and the
    /// three measurements; nothing else from the state is sent.
    pub fn build_payload(
        &self,
        state: &WorkflowState,
    ) -> Result<NewMorphologyRecord, SubmitError> {
        let identification = state
            .identification()
            .ok_or_else(|| SubmitError::Validation("identification result missing".to_string()))?;
        let morphology = state
            .morphology()
            .ok_or_else(|| SubmitError::Validation("measurements missing".to_string()))?;

        morphology
            .measurements
            .validate()
            .map_err(|e| SubmitError::Validation(e.to_string()))?;

        Ok(NewMorphologyRecord {
            cow_id: identification.animal_id.clone(),
            source_detection: SourceDetection::Automatique,
            measurements: morphology.measurements.clone(),
        })
    }

    /// Build the record from a finished workflow and store it
    pub async fn submit(&self, state: &WorkflowState) -> Result<MorphologyRecord, SubmitError> {
        let payload = self.build_payload(state).map_err(|e| {
            error!(error = %e, "Workflow reached submission with an incomplete state");
            e
        })?;
        self.persist(&payload).await
    }

    async fn persist(
        &self,
        payload: &NewMorphologyRecord,
    ) -> Result<MorphologyRecord, SubmitError> {
        let stored = tokio::time::timeout(
            self.timeout,
            self.store.create_morphology_record(payload),
        )
        .await
        .map_err(|_| PersistenceError::Timeout(self.timeout))?;

        let record = stored.map_err(|e| {
            warn!(
                cow_id = %payload.cow_id,
                code = e.code(),
                error = %e,
                "Record submission failed"
            );
            e
        })?;

        info!(record_id = %record.id, cow_id = %record.animal_id, "Morphology record submitted");
        Ok(record)
    }
}
