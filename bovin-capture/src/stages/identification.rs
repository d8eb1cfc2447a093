//! Identification stage

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::{with_deadline, StageSettings};
use crate::models::measurement::validate_confidence;
use crate::models::{AnimalId, CaptureResult, Identification};
use crate::services::{IdentificationResponse, IdentificationService, ProcessingError};

/// Turns a captured image into an animal identifier
#[derive(Clone)]
pub struct IdentificationStage {
    service: Arc<dyn IdentificationService>,
    settings: StageSettings,
}

impl IdentificationStage {
    pub fn new(service: Arc<dyn IdentificationService>, settings: StageSettings) -> Self {
        Self { service, settings }
    }

    pub fn settings(&self) -> &StageSettings {
        &self.settings
    }

    /// Identify the animal in `image`
    pub async fn identify(&self, image: &CaptureResult) -> Result<Identification, ProcessingError> {
        let started = Instant::now();
        info!(
            size_bytes = image.size_bytes,
            mime_type = %image.mime_type,
            "Identification started"
        );
        let response = with_deadline(
            self.settings.timeout,
            self.service.process_identification(image),
        )
        .await;
        self.finish(response, started)
    }

    fn finish(
        &self,
        response: Result<IdentificationResponse, ProcessingError>,
        started: Instant,
    ) -> Result<Identification, ProcessingError> {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let result = response.and_then(|r| self.validate(r));
        match &result {
            Ok(identification) => info!(
                cow_id = %identification.animal_id,
                confidence = identification.confidence,
                elapsed_ms,
                "Identification completed"
            ),
            Err(e) => warn!(code = e.code(), error = %e, elapsed_ms, "Identification failed"),
        }
        result
    }

    fn validate(
        &self,
        response: IdentificationResponse,
    ) -> Result<Identification, ProcessingError> {
        let animal_id = AnimalId::new(response.cow_id)
            .ok_or_else(|| ProcessingError::InvalidResponse("empty cow_id".to_string()))?;
        validate_confidence(response.confidence)
            .map_err(|e| ProcessingError::InvalidResponse(e.to_string()))?;

        if self.settings.confidence.check(response.confidence)? {
            warn!(
                cow_id = %animal_id,
                confidence = response.confidence,
                "Low identification confidence"
            );
        }

        Ok(Identification {
            animal_id,
            confidence: response.confidence,
        })
    }
}
