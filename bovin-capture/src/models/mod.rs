//! Data models for bovin-capture
//!
//! - Workflow state machine data (steps, stage results, captured images)
//! - Measurements and persisted morphology records
//! - Capture results and camera descriptions

pub mod camera;
pub mod capture;
pub mod measurement;
pub mod record;
pub mod workflow_state;

pub use bovin_common::events::{CameraRole, SourceKind, Step};
pub use camera::{CameraInfo, CameraStatus};
pub use capture::{CaptureResult, ImageMime, DEFAULT_MAX_IMAGE_BYTES};
pub use measurement::{Measurement, MeasurementError, Measurements};
pub use record::{MorphologyRecord, NewMorphologyRecord, SourceDetection};
pub use workflow_state::{
    AnimalId, CapturedImage, CapturedImages, Identification, InvalidTransition, Morphology,
    StepError, StepTransition, WorkflowState,
};
