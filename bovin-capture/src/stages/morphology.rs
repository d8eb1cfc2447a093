//! Morphology stage

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::{with_deadline, StageSettings};
use crate::models::measurement::validate_confidence;
use crate::models::{AnimalId, CaptureResult, Morphology};
use crate::services::{MorphologyResponse, MorphologyService, ProcessingError};

/// Extracts the three body measurements of an identified animal
#[derive(Clone)]
pub struct MorphologyStage {
    service: Arc<dyn MorphologyService>,
    settings: StageSettings,
}

impl MorphologyStage {
    pub fn new(service: Arc<dyn MorphologyService>, settings: StageSettings) -> Self {
        Self { service, settings }
    }

    pub fn settings(&self) -> &StageSettings {
        &self.settings
    }

    /// Measure the animal in `image`. `animal_id` is forwarded as is.
    pub async fn measure(
        &self,
        image: &CaptureResult,
        animal_id: &AnimalId,
    ) -> Result<Morphology, ProcessingError> {
        let started = Instant::now();
        info!(
            cow_id = %animal_id,
            size_bytes = image.size_bytes,
            "Morphology measurement started"
        );
        let response = with_deadline(
            self.settings.timeout,
            self.service.process_morphology(animal_id, image),
        )
        .await;
        self.finish(animal_id, response, started)
    }

    fn finish(
        &self,
        animal_id: &AnimalId,
        response: Result<MorphologyResponse, ProcessingError>,
        started: Instant,
    ) -> Result<Morphology, ProcessingError> {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let result = response.and_then(|r| self.validate(animal_id, r));
        match &result {
            Ok(morphology) => info!(
                cow_id = %animal_id,
                hauteur_au_garrot = morphology.measurements.hauteur_au_garrot.valeur,
                largeur_du_corps = morphology.measurements.largeur_du_corps.valeur,
                longueur_du_corps = morphology.measurements.longueur_du_corps.valeur,
                confidence = morphology.confidence,
                elapsed_ms,
                "Morphology measurement completed"
            ),
            Err(e) => warn!(
                cow_id = %animal_id,
                code = e.code(),
                error = %e,
                elapsed_ms,
                "Morphology measurement failed"
            ),
        }
        result
    }

    fn validate(
        &self,
        animal_id: &AnimalId,
        response: MorphologyResponse,
    ) -> Result<Morphology, ProcessingError> {
        response
            .measurements
            .validate()
            .map_err(|e| ProcessingError::InvalidResponse(e.to_string()))?;
        validate_confidence(response.confidence)
            .map_err(|e| ProcessingError::InvalidResponse(e.to_string()))?;

        if self.settings.confidence.check(response.confidence)? {
            warn!(
                cow_id = %animal_id,
                confidence = response.confidence,
                "Low measurement confidence"
            );
        }

        Ok(Morphology {
            measurements: response.measurements,
            confidence: response.confidence,
        })
    }
}
