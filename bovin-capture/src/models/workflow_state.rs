//! Capture workflow state
//!
//! The workflow moves through three ordered steps:
//! IDENTIFICATION → MORPHOLOGY → RESULTS
//!
//! Stage results are carried by [`Progress`], whose variants hold exactly
//! the data their step requires: `Results` cannot exist without an
//! identification and a set of measurements. Captured images are kept
//! beside the progress so they survive going back.

use bovin_common::events::{SourceKind, Step};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::capture::CaptureResult;
use super::measurement::Measurements;

/// Official animal identifier returned by the identification stage (NNI)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AnimalId(String);

impl AnimalId {
    /// Returns None for blank identifiers
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AnimalId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AnimalId::new(value).ok_or_else(|| "animal identifier is empty".to_string())
    }
}

impl From<AnimalId> for String {
    fn from(id: AnimalId) -> Self {
        id.0
    }
}

impl fmt::Display for AnimalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of the identification stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identification {
    pub animal_id: AnimalId,
    pub confidence: f64,
}

/// Result of the morphology stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Morphology {
    pub measurements: Measurements,
    pub confidence: f64,
}

/// An image committed to a step's capture slot
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    pub capture: CaptureResult,
    pub source: SourceKind,
    pub captured_at: DateTime<Utc>,
}

impl CapturedImage {
    pub fn new(capture: CaptureResult, source: SourceKind) -> Self {
        Self {
            capture,
            source,
            captured_at: Utc::now(),
        }
    }
}

/// Capture slots for the two capturing steps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedImages {
    identification: Option<CapturedImage>,
    morphology: Option<CapturedImage>,
}

impl CapturedImages {
    pub fn identification(&self) -> Option<&CapturedImage> {
        self.identification.as_ref()
    }

    pub fn morphology(&self) -> Option<&CapturedImage> {
        self.morphology.as_ref()
    }

    /// Slot for `step`; `Results` has no slot
    pub fn get(&self, step: Step) -> Option<&CapturedImage> {
        match step {
            Step::Identification => self.identification.as_ref(),
            Step::Morphology => self.morphology.as_ref(),
            Step::Results => None,
        }
    }
}

/// Accumulated stage results, shaped by the current step
#[derive(Debug, Clone, PartialEq)]
enum Progress {
    Identification,
    Morphology {
        identification: Identification,
    },
    Results {
        identification: Identification,
        morphology: Morphology,
    },
}

impl Progress {
    fn step(&self) -> Step {
        match self {
            Progress::Identification => Step::Identification,
            Progress::Morphology { .. } => Step::Morphology,
            Progress::Results { .. } => Step::Results,
        }
    }
}

/// A failure attached to the step it happened on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub step: Step,
    /// Machine-readable code, e.g. "TIMEOUT" or "TOO_LARGE"
    pub code: String,
    /// Actionable message for the user
    pub message: String,
    /// Whether retrying (same image or resubmission) may succeed
    pub retryable: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Step transition record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTransition {
    pub old_step: Step,
    pub new_step: Step,
    pub transitioned_at: DateTime<Utc>,
}

/// Attempted operation is not allowed from the current step
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} from the {from} step")]
pub struct InvalidTransition {
    pub from: Step,
    pub action: &'static str,
}

/// In-memory workflow state. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowState {
    progress: Progress,
    captured_images: CapturedImages,
    last_error: Option<StepError>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowState {
    /// Fresh state at the Identification step
    pub fn new() -> Self {
        Self {
            progress: Progress::Identification,
            captured_images: CapturedImages::default(),
            last_error: None,
        }
    }

    pub fn step(&self) -> Step {
        self.progress.step()
    }

    pub fn identification(&self) -> Option<&Identification> {
        match &self.progress {
            Progress::Identification => None,
            Progress::Morphology { identification } | Progress::Results { identification, .. } => {
                Some(identification)
            }
        }
    }

    pub fn morphology(&self) -> Option<&Morphology> {
        match &self.progress {
            Progress::Results { morphology, .. } => Some(morphology),
            _ => None,
        }
    }

    pub fn captured_images(&self) -> &CapturedImages {
        &self.captured_images
    }

    /// Image captured for the current step, if any
    pub fn current_capture(&self) -> Option<&CapturedImage> {
        self.captured_images.get(self.step())
    }

    pub fn last_error(&self) -> Option<&StepError> {
        self.last_error.as_ref()
    }

    /// Commit an image to the current step's slot, replacing any previous one
    pub fn commit_capture(&mut self, image: CapturedImage) -> Result<(), InvalidTransition> {
        match self.step() {
            Step::Identification => self.captured_images.identification = Some(image),
            Step::Morphology => self.captured_images.morphology = Some(image),
            Step::Results => {
                return Err(InvalidTransition {
                    from: Step::Results,
                    action: "capture an image",
                })
            }
        }
        self.last_error = None;
        Ok(())
    }

    /// Identification → Morphology with the stage result
    pub fn complete_identification(
        &mut self,
        identification: Identification,
    ) -> Result<StepTransition, InvalidTransition> {
        if !matches!(self.progress, Progress::Identification) {
            return Err(InvalidTransition {
                from: self.step(),
                action: "complete identification",
            });
        }
        self.progress = Progress::Morphology { identification };
        Ok(self.transition(Step::Identification))
    }

    /// Morphology → Results with the stage result
    pub fn complete_morphology(
        &mut self,
        morphology: Morphology,
    ) -> Result<StepTransition, InvalidTransition> {
        let identification = match &self.progress {
            Progress::Morphology { identification } => identification.clone(),
            _ => {
                return Err(InvalidTransition {
                    from: self.step(),
                    action: "complete morphology",
                })
            }
        };
        self.progress = Progress::Results {
            identification,
            morphology,
        };
        Ok(self.transition(Step::Morphology))
    }

    /// Move to the previous step.
    ///
    /// The result of the step being re-entered is dropped; results of
    /// earlier steps and all captured images are kept.
    pub fn step_back(&mut self) -> Result<StepTransition, InvalidTransition> {
        let old_step = self.step();
        self.progress = match std::mem::replace(&mut self.progress, Progress::Identification) {
            Progress::Identification => {
                return Err(InvalidTransition {
                    from: Step::Identification,
                    action: "go back",
                })
            }
            Progress::Morphology { .. } => Progress::Identification,
            Progress::Results { identification, .. } => Progress::Morphology { identification },
        };
        Ok(self.transition(old_step))
    }

    pub fn attach_error(&mut self, error: StepError) {
        self.last_error = Some(error);
    }

    fn transition(&mut self, old_step: Step) -> StepTransition {
        self.last_error = None;
        StepTransition {
            old_step,
            new_step: self.step(),
            transitioned_at: Utc::now(),
        }
    }
}
