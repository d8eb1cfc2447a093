//! Local stand-ins for the identification and measurement models

use async_trait::async_trait;
use std::time::Duration;

use super::{
    IdentificationResponse, IdentificationService, MorphologyResponse, MorphologyService,
    ProcessingError,
};
use crate::models::{AnimalId, CaptureResult, Measurement, Measurements};

/// Deterministic collaborator for demos and tests.
///
/// The identifier is derived from the image bytes, so the same image always
/// identifies the same animal. Measurements are fixed plausible values.
#[derive(Debug, Clone)]
pub struct MockCollaborator {
    latency: Duration,
    confidence: f64,
    measurements: Measurements,
}

impl Default for MockCollaborator {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            confidence: 0.92,
            measurements: Measurements {
                hauteur_au_garrot: Measurement::cm(124.5),
                largeur_du_corps: Measurement::cm(57.2),
                longueur_du_corps: Measurement::cm(142.0),
            },
        }
    }
}

impl MockCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated processing delay per call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_measurements(mut self, measurements: Measurements) -> Self {
        self.measurements = measurements;
        self
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn morphology_response(&self) -> MorphologyResponse {
        MorphologyResponse {
            measurements: self.measurements.clone(),
            confidence: self.confidence,
        }
    }
}

/// National identifier shaped `FR` + 10 digits, stable for given input
pub fn derive_animal_id(input: &[u8]) -> String {
    // FNV-1a
    let hash = input.iter().fold(0xcbf2_9ce4_8422_2325u64, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0000_0100_0000_01b3)
    });
    format!("FR{:010}", hash % 10_000_000_000)
}

#[async_trait]
impl IdentificationService for MockCollaborator {
    async fn process_identification(
        &self,
        image: &CaptureResult,
    ) -> Result<IdentificationResponse, ProcessingError> {
        self.simulate_latency().await;
        Ok(IdentificationResponse {
            cow_id: derive_animal_id(&image.encoded_image),
            confidence: self.confidence,
        })
    }

    async fn capture_from_camera(
        &self,
        camera_id: &str,
    ) -> Result<IdentificationResponse, ProcessingError> {
        self.simulate_latency().await;
        Ok(IdentificationResponse {
            cow_id: derive_animal_id(camera_id.as_bytes()),
            confidence: self.confidence,
        })
    }
}

#[async_trait]
impl MorphologyService for MockCollaborator {
    async fn process_morphology(
        &self,
        _cow_id: &AnimalId,
        _image: &CaptureResult,
    ) -> Result<MorphologyResponse, ProcessingError> {
        self.simulate_latency().await;
        Ok(self.morphology_response())
    }

    async fn capture_morphology_from_camera(
        &self,
        _camera_id: &str,
        _cow_id: &AnimalId,
    ) -> Result<MorphologyResponse, ProcessingError> {
        self.simulate_latency().await;
        Ok(self.morphology_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageMime;
    use bytes::Bytes;

    #[test]
    fn test_derived_id_is_stable_and_shaped() {
        let id = derive_animal_id(b"same image");
        assert_eq!(id, derive_animal_id(b"same image"));
        assert_ne!(id, derive_animal_id(b"other image"));
        assert_eq!(id.len(), 12);
        assert!(id.starts_with("FR"));
        assert!(id[2..].chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_identifies_from_image_bytes() {
        let mock = MockCollaborator::new().with_confidence(0.75);
        let image = CaptureResult::new(Bytes::from_static(b"\xFF\xD8\xFFcow"), ImageMime::Jpeg);
        let response = mock.process_identification(&image).await.unwrap();
        assert_eq!(response.cow_id, derive_animal_id(b"\xFF\xD8\xFFcow"));
        assert_eq!(response.confidence, 0.75);
    }

    #[tokio::test]
    async fn test_measurements_are_valid() {
        let mock = MockCollaborator::new();
        let cow = AnimalId::new("FR000000001").unwrap();
        let response = mock
            .capture_morphology_from_camera("cam-morpho", &cow)
            .await
            .unwrap();
        assert!(response.measurements.validate().is_ok());
    }
}
