//! Morphology records (the persisted result of a workflow)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::measurement::Measurements;
use super::workflow_state::AnimalId;

/// How the measurements of a record were obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceDetection {
    /// Produced by the capture workflow's measurement service
    Automatique,
    /// Entered by hand elsewhere in the system
    Manuelle,
}

/// Payload of `createMorphologyRecord`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMorphologyRecord {
    pub cow_id: AnimalId,
    pub source_detection: SourceDetection,
    #[serde(flatten)]
    pub measurements: Measurements,
}

/// A persisted morphology record. Immutable once created, except delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphologyRecord {
    pub id: Uuid,
    #[serde(rename = "cow_id")]
    pub animal_id: AnimalId,
    pub source_detection: SourceDetection,
    #[serde(flatten)]
    pub measurements: Measurements,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<String>,
}
