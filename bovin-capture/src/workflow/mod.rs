//! Capture workflow
//!
//! Drives one animal through IDENTIFICATION → MORPHOLOGY → RESULTS and
//! then to submission or cancellation.
//!
//! - [`StepGate`]: may the workflow leave its current step?
//! - [`WorkflowController`]: the state machine, one instance per workflow
//! - [`RecordSubmitter`]: turns a finished workflow into a stored record

pub mod controller;
pub mod gate;
pub mod submitter;

pub use controller::{
    CaptureReport, CaptureSlots, CaptureSummary, CompletionCallback, WorkflowController,
    WorkflowOutcome, WorkflowServices, WorkflowSettings, WorkflowSnapshot, WorkflowStatus,
};
pub use gate::{GateViolation, StepGate};
pub use submitter::{RecordSubmitter, SubmitError};

use bovin_common::events::Step;
use thiserror::Error;

use crate::capture::CaptureError;
use crate::models::InvalidTransition;
use crate::services::ProcessingError;

/// Workflow operation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    /// Another capture, stage call or submission is in flight
    #[error("Another operation is in progress for this workflow")]
    Busy,

    #[error("Cannot leave the {step} step: {reason}")]
    GateClosed { step: Step, reason: GateViolation },

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// The workflow was already submitted or cancelled
    #[error("Workflow has already ended")]
    Closed,

    /// The workflow was cancelled while this operation was in flight
    #[error("Workflow was cancelled")]
    Cancelled,

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error(transparent)]
    Submit(#[from] SubmitError),
}

impl WorkflowError {
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Busy => "BUSY",
            WorkflowError::GateClosed { .. } => "GATE_CLOSED",
            WorkflowError::InvalidTransition(_) => "INVALID_TRANSITION",
            WorkflowError::Closed => "WORKFLOW_CLOSED",
            WorkflowError::Cancelled => "WORKFLOW_CANCELLED",
            WorkflowError::Capture(e) => e.code(),
            WorkflowError::Processing(e) => e.code(),
            WorkflowError::Submit(e) => e.code(),
        }
    }
}
