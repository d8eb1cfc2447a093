//! Step gate

use bovin_common::events::Step;
use std::fmt;

use crate::models::WorkflowState;

/// Why the gate is closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateViolation {
    MissingIdentificationImage,
    MissingMorphologyImage,
    MissingMeasurements,
}

impl fmt::Display for GateViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GateViolation::MissingIdentificationImage => "no identification image captured",
            GateViolation::MissingMorphologyImage => "no morphology image captured",
            GateViolation::MissingMeasurements => "no measurements available",
        };
        f.write_str(text)
    }
}

/// Decides whether the workflow may leave its current step
pub struct StepGate;

impl StepGate {
    pub fn can_advance(state: &WorkflowState) -> bool {
        Self::check(state).is_ok()
    }

    pub fn check(state: &WorkflowState) -> Result<(), GateViolation> {
        let images = state.captured_images();
        match state.step() {
            Step::Identification if images.identification().is_none() => {
                Err(GateViolation::MissingIdentificationImage)
            }
            Step::Morphology if images.morphology().is_none() => {
                Err(GateViolation::MissingMorphologyImage)
            }
            Step::Results if state.morphology().is_none() => {
                Err(GateViolation::MissingMeasurements)
            }
            _ => Ok(()),
        }
    }
}
