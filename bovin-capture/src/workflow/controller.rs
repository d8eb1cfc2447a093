//! Workflow controller
//!
//! One controller per opened workflow. It owns the [`WorkflowState`] and is
//! the only place where stage results are applied to it.
//!
//! Concurrency rules:
//! - At most one operation (capture, identify, measure, submit, back) runs
//!   at a time; a second request while one is in flight fails with `Busy`.
//! - The state lock is never held across a network call. The call's result
//!   is applied after re-acquiring the lock, and only if the workflow is
//!   still active.
//! - `cancel()` is always accepted. It trips the workflow's cancellation
//!   token, abandoning whatever is in flight.

use bovin_common::events::{BovinEvent, EventBus, SourceKind, Step};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::gate::StepGate;
use super::submitter::RecordSubmitter;
use super::WorkflowError;
use crate::capture::{CaptureError, CaptureSource, SelectedFile, SourceSelector};
use crate::models::{
    AnimalId, CameraInfo, CaptureResult, CapturedImage, Identification, ImageMime,
    InvalidTransition, Morphology, MorphologyRecord, StepError, StepTransition, WorkflowState,
};
use crate::services::{Collaborators, ProcessingError};
use crate::stages::{ConfidencePolicy, IdentificationStage, MorphologyStage, StageSettings};

/// Stage deadlines and confidence handling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkflowSettings {
    pub identification: StageSettings,
    pub morphology: StageSettings,
    pub submit_timeout: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            identification: StageSettings::default(),
            morphology: StageSettings::default(),
            submit_timeout: Duration::from_secs(15),
        }
    }
}

/// Everything a workflow needs, built once at startup and shared
pub struct WorkflowServices {
    pub identification: IdentificationStage,
    pub morphology: MorphologyStage,
    pub submitter: RecordSubmitter,
    pub selector: SourceSelector,
    pub event_bus: EventBus,
}

impl WorkflowServices {
    pub fn new(
        collaborators: Collaborators,
        selector: SourceSelector,
        settings: WorkflowSettings,
        event_bus: EventBus,
    ) -> Self {
        Self {
            identification: IdentificationStage::new(
                collaborators.identification,
                settings.identification,
            ),
            morphology: MorphologyStage::new(collaborators.morphology, settings.morphology),
            submitter: RecordSubmitter::new(collaborators.records, settings.submit_timeout),
            selector,
            event_bus,
        }
    }
}

/// How a workflow ended, handed to the completion callback
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutcome {
    Submitted(MorphologyRecord),
    Cancelled,
}

/// Invoked exactly once when the workflow is submitted or cancelled
pub type CompletionCallback = Box<dyn FnOnce(Uuid, WorkflowOutcome) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Active,
    Submitted,
    Cancelled,
}

/// What a successful capture committed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureReport {
    pub step: Step,
    pub source: SourceKind,
    pub mime_type: ImageMime,
    pub size_bytes: usize,
    /// Set when the camera failed and the upload was used instead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// A captured image without its bytes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureSummary {
    pub source: SourceKind,
    pub mime_type: ImageMime,
    pub size_bytes: usize,
    pub captured_at: DateTime<Utc>,
}

impl From<&CapturedImage> for CaptureSummary {
    fn from(image: &CapturedImage) -> Self {
        Self {
            source: image.source,
            mime_type: image.capture.mime_type,
            size_bytes: image.capture.size_bytes,
            captured_at: image.captured_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CaptureSlots {
    pub identification: Option<CaptureSummary>,
    pub morphology: Option<CaptureSummary>,
}

/// Serializable view of a workflow for clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSnapshot {
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
    pub opened_at: DateTime<Utc>,
    /// None once the workflow has ended
    pub step: Option<Step>,
    pub identification: Option<Identification>,
    pub morphology: Option<Morphology>,
    pub captures: CaptureSlots,
    pub can_advance: bool,
    pub can_go_back: bool,
    pub can_submit: bool,
    pub busy: bool,
    /// A stage result is below the warning confidence
    pub low_confidence: bool,
    /// Source the client should offer first at the current step
    pub preferred_source: Option<SourceKind>,
    pub last_error: Option<StepError>,
    /// The stored record, once submitted
    pub record: Option<MorphologyRecord>,
}

enum Phase {
    Active(WorkflowState),
    Submitted(MorphologyRecord),
    Cancelled,
}

struct Inner {
    phase: Phase,
    on_complete: Option<CompletionCallback>,
}

impl Inner {
    fn active(&mut self) -> Result<&mut WorkflowState, WorkflowError> {
        match &mut self.phase {
            Phase::Active(state) => Ok(state),
            Phase::Submitted(_) => Err(WorkflowError::Closed),
            Phase::Cancelled => Err(WorkflowError::Cancelled),
        }
    }
}

/// Clears the busy flag when the operation ends, however it ends
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum StageRequest {
    Identify(CaptureResult),
    Measure(CaptureResult, AnimalId),
}

enum StageOutput {
    Identified(Identification),
    Measured(Morphology),
}

pub struct WorkflowController {
    id: Uuid,
    opened_at: DateTime<Utc>,
    services: Arc<WorkflowServices>,
    selector: SourceSelector,
    inner: Mutex<Inner>,
    busy: AtomicBool,
    cancel_token: CancellationToken,
}

impl WorkflowController {
    /// Open a workflow at the Identification step.
    ///
    /// `cameras` restricts the workflow to a pre-filtered camera list; None
    /// offers every configured camera.
    pub fn open(
        services: Arc<WorkflowServices>,
        cameras: Option<Vec<CameraInfo>>,
        on_complete: Option<CompletionCallback>,
    ) -> Self {
        let selector = match cameras {
            Some(cameras) => services.selector.with_cameras(cameras),
            None => services.selector.clone(),
        };
        let id = Uuid::new_v4();

        info!(
            workflow_id = %id,
            cameras = selector.cameras().len(),
            "Capture workflow opened"
        );
        services.event_bus.emit_lossy(BovinEvent::WorkflowOpened {
            workflow_id: id,
            camera_count: selector.cameras().len(),
            timestamp: Utc::now(),
        });

        Self {
            id,
            opened_at: Utc::now(),
            services,
            selector,
            inner: Mutex::new(Inner {
                phase: Phase::Active(WorkflowState::new()),
                on_complete,
            }),
            busy: AtomicBool::new(false),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn selector(&self) -> &SourceSelector {
        &self.selector
    }

    /// Copy of the current state; None once the workflow has ended
    pub async fn state(&self) -> Option<WorkflowState> {
        match &self.inner.lock().await.phase {
            Phase::Active(state) => Some(state.clone()),
            _ => None,
        }
    }

    pub async fn snapshot(&self) -> WorkflowSnapshot {
        let inner = self.inner.lock().await;
        let busy = self.is_busy();
        let mut snapshot = WorkflowSnapshot {
            workflow_id: self.id,
            status: WorkflowStatus::Active,
            opened_at: self.opened_at,
            step: None,
            identification: None,
            morphology: None,
            captures: CaptureSlots::default(),
            can_advance: false,
            can_go_back: false,
            can_submit: false,
            busy,
            low_confidence: false,
            preferred_source: None,
            last_error: None,
            record: None,
        };

        match &inner.phase {
            Phase::Active(state) => {
                let step = state.step();
                let images = state.captured_images();
                snapshot.step = Some(step);
                snapshot.identification = state.identification().cloned();
                snapshot.morphology = state.morphology().cloned();
                snapshot.captures = CaptureSlots {
                    identification: images.identification().map(CaptureSummary::from),
                    morphology: images.morphology().map(CaptureSummary::from),
                };
                snapshot.can_advance =
                    !busy && step != Step::Results && StepGate::can_advance(state);
                snapshot.can_go_back = !busy && step.predecessor().is_some();
                snapshot.can_submit = !busy && step == Step::Results;
                snapshot.low_confidence = self.has_low_confidence(state);
                snapshot.preferred_source =
                    step.camera_role().map(|_| self.selector.preferred(step));
                snapshot.last_error = state.last_error().cloned();
            }
            Phase::Submitted(record) => {
                snapshot.status = WorkflowStatus::Submitted;
                snapshot.record = Some(record.clone());
            }
            Phase::Cancelled => snapshot.status = WorkflowStatus::Cancelled,
        }
        snapshot
    }

    fn has_low_confidence(&self, state: &WorkflowState) -> bool {
        let identification_policy: ConfidencePolicy =
            self.services.identification.settings().confidence;
        let morphology_policy = self.services.morphology.settings().confidence;
        state
            .identification()
            .is_some_and(|i| identification_policy.is_low(i.confidence))
            || state
                .morphology()
                .is_some_and(|m| morphology_policy.is_low(m.confidence))
    }

    fn begin(&self) -> Result<BusyGuard<'_>, WorkflowError> {
        BusyGuard::acquire(&self.busy).ok_or_else(|| {
            debug!(workflow_id = %self.id, "Operation rejected, workflow busy");
            WorkflowError::Busy
        })
    }

    /// Run `f` against the active state under the lock
    async fn with_active<R>(
        &self,
        f: impl FnOnce(&mut WorkflowState) -> R,
    ) -> Result<R, WorkflowError> {
        let mut inner = self.inner.lock().await;
        Ok(f(inner.active()?))
    }

    /// Race `future` against cancellation of the workflow
    async fn until_cancelled<F: Future>(&self, future: F) -> Result<F::Output, WorkflowError> {
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(WorkflowError::Cancelled),
            output = future => Ok(output),
        }
    }

    /// Attach a failure to `step`, log it and publish it
    fn record_failure(
        &self,
        state: &mut WorkflowState,
        step: Step,
        code: &str,
        message: String,
        retryable: bool,
    ) {
        warn!(
            workflow_id = %self.id,
            step = %step,
            code,
            error_message = %message,
            "Workflow step failed"
        );
        self.services.event_bus.emit_lossy(BovinEvent::StageFailed {
            workflow_id: self.id,
            step,
            code: code.to_string(),
            message: message.clone(),
            timestamp: Utc::now(),
        });
        state.attach_error(StepError {
            step,
            code: code.to_string(),
            message,
            retryable,
            occurred_at: Utc::now(),
        });
    }

    fn publish_transition(&self, transition: &StepTransition) {
        info!(
            workflow_id = %self.id,
            old_step = %transition.old_step,
            new_step = %transition.new_step,
            "Workflow step changed"
        );
        self.services.event_bus.emit_lossy(BovinEvent::StepChanged {
            workflow_id: self.id,
            old_step: transition.old_step,
            new_step: transition.new_step,
            timestamp: transition.transitioned_at,
        });
    }

    // ========================================================================
    // Capture
    // ========================================================================

    /// Acquire from an explicit source and commit to the current step
    pub async fn capture_with(
        &self,
        source: &dyn CaptureSource,
    ) -> Result<CaptureReport, WorkflowError> {
        let _busy = self.begin()?;
        self.acquire_and_commit(source).await
    }

    /// Capture an uploaded file at the current step
    pub async fn capture_upload(&self, file: SelectedFile) -> Result<CaptureReport, WorkflowError> {
        let source = self.selector.upload(file);
        self.capture_with(&source).await
    }

    /// Camera when one is online for this step, otherwise `upload`.
    ///
    /// When the camera fails as unavailable and an upload was supplied, the
    /// upload is used and the report carries the fallback reason.
    pub async fn capture_auto(
        &self,
        upload: Option<SelectedFile>,
    ) -> Result<CaptureReport, WorkflowError> {
        let _busy = self.begin()?;
        let step = self.with_active(|state| state.step()).await?;
        if step == Step::Results {
            return Err(InvalidTransition {
                from: step,
                action: "capture an image",
            }
            .into());
        }

        let Some(camera) = self.selector.camera_for(step) else {
            return match upload {
                Some(file) => self.acquire_and_commit(&self.selector.upload(file)).await,
                None => Err(self
                    .reject_capture(CaptureError::SourceUnavailable(format!(
                        "No {} camera is online",
                        step
                    )))
                    .await),
            };
        };

        let result = self.acquire_and_commit(&camera).await;
        match (result, upload) {
            (Err(WorkflowError::Capture(CaptureError::SourceUnavailable(reason))), Some(file)) => {
                warn!(
                    workflow_id = %self.id,
                    step = %step,
                    camera_id = %camera.camera().id,
                    reason = %reason,
                    "Camera unavailable, falling back to upload"
                );
                self.services.event_bus.emit_lossy(BovinEvent::CaptureFallback {
                    workflow_id: self.id,
                    step,
                    reason: reason.clone(),
                    timestamp: Utc::now(),
                });
                let mut report = self.acquire_and_commit(&self.selector.upload(file)).await?;
                report.fallback_reason = Some(reason);
                Ok(report)
            }
            (result, _) => result,
        }
    }

    /// Attach a capture failure that happened before any source ran, such
    /// as an upload refused at the request boundary.
    pub async fn reject_capture(&self, error: CaptureError) -> WorkflowError {
        let mut inner = self.inner.lock().await;
        let state = match inner.active() {
            Ok(state) => state,
            Err(closed) => return closed,
        };
        let step = state.step();
        self.record_failure(
            state,
            step,
            error.code(),
            error.user_message(),
            error.retryable(),
        );
        error.into()
    }

    async fn acquire_and_commit(
        &self,
        source: &dyn CaptureSource,
    ) -> Result<CaptureReport, WorkflowError> {
        let step = self.with_active(|state| state.step()).await?;
        if step == Step::Results {
            return Err(InvalidTransition {
                from: step,
                action: "capture an image",
            }
            .into());
        }

        debug!(
            workflow_id = %self.id,
            step = %step,
            source = %source.describe(),
            "Acquiring image"
        );
        let acquired = self.until_cancelled(source.acquire()).await?;

        let mut inner = self.inner.lock().await;
        let state = inner.active()?;
        match acquired {
            Ok(capture) => {
                let report = CaptureReport {
                    step,
                    source: source.kind(),
                    mime_type: capture.mime_type,
                    size_bytes: capture.size_bytes,
                    fallback_reason: None,
                };
                state.commit_capture(CapturedImage::new(capture, source.kind()))?;

                info!(
                    workflow_id = %self.id,
                    step = %step,
                    source = %report.source,
                    size_bytes = report.size_bytes,
                    mime_type = %report.mime_type,
                    "Image captured"
                );
                self.services.event_bus.emit_lossy(BovinEvent::CaptureCommitted {
                    workflow_id: self.id,
                    step,
                    source: report.source,
                    size_bytes: report.size_bytes,
                    timestamp: Utc::now(),
                });
                Ok(report)
            }
            Err(error) => {
                self.record_failure(
                    state,
                    step,
                    error.code(),
                    error.user_message(),
                    error.retryable(),
                );
                Err(error.into())
            }
        }
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Advance to the next step, running the current step's stage.
    ///
    /// Identification → Morphology runs identification; Morphology →
    /// Results runs measurement. Results never advances on its own.
    pub async fn next(&self) -> Result<StepTransition, WorkflowError> {
        let _busy = self.begin()?;

        let request = self
            .with_active(|state| -> Result<StageRequest, WorkflowError> {
                let step = state.step();
                StepGate::check(state)
                    .map_err(|reason| WorkflowError::GateClosed { step, reason })?;
                let image = state
                    .current_capture()
                    .map(|captured| captured.capture.clone())
                    .ok_or(InvalidTransition {
                        from: step,
                        action: "advance",
                    })?;
                match state.identification() {
                    None => Ok(StageRequest::Identify(image)),
                    Some(identification) => Ok(StageRequest::Measure(
                        image,
                        identification.animal_id.clone(),
                    )),
                }
            })
            .await??;

        let output: Result<StageOutput, ProcessingError> = match &request {
            StageRequest::Identify(image) => self
                .until_cancelled(self.services.identification.identify(image))
                .await?
                .map(StageOutput::Identified),
            StageRequest::Measure(image, animal_id) => self
                .until_cancelled(self.services.morphology.measure(image, animal_id))
                .await?
                .map(StageOutput::Measured),
        };

        let mut inner = self.inner.lock().await;
        let state = inner.active()?;
        let step = state.step();
        match output {
            Ok(StageOutput::Identified(identification)) => {
                let transition = state.complete_identification(identification)?;
                self.publish_transition(&transition);
                Ok(transition)
            }
            Ok(StageOutput::Measured(morphology)) => {
                let transition = state.complete_morphology(morphology)?;
                self.publish_transition(&transition);
                Ok(transition)
            }
            Err(error) => {
                self.record_failure(state, step, error.code(), error.user_message(), true);
                Err(error.into())
            }
        }
    }

    /// Go back one step. Captured images are kept.
    pub async fn back(&self) -> Result<StepTransition, WorkflowError> {
        let _busy = self.begin()?;
        let transition = self.with_active(|state| state.step_back()).await??;
        self.publish_transition(&transition);
        Ok(transition)
    }

    // ========================================================================
    // Exits
    // ========================================================================

    /// Discard the workflow. Anything in flight is abandoned.
    pub async fn cancel(&self) -> Result<(), WorkflowError> {
        let (step, callback) = {
            let mut inner = self.inner.lock().await;
            let step = match &inner.phase {
                Phase::Active(state) => state.step(),
                _ => return Err(WorkflowError::Closed),
            };
            inner.phase = Phase::Cancelled;
            (step, inner.on_complete.take())
        };
        self.cancel_token.cancel();

        info!(workflow_id = %self.id, step = %step, "Capture workflow cancelled");
        self.services.event_bus.emit_lossy(BovinEvent::WorkflowCancelled {
            workflow_id: self.id,
            step,
            timestamp: Utc::now(),
        });
        if let Some(callback) = callback {
            callback(self.id, WorkflowOutcome::Cancelled);
        }
        Ok(())
    }

    /// Store the record built from the Results step.
    ///
    /// On failure the workflow stays at Results with the error attached and
    /// may be submitted again without recapturing.
    pub async fn submit(&self) -> Result<MorphologyRecord, WorkflowError> {
        let _busy = self.begin()?;

        let finished = self
            .with_active(|state| {
                let step = state.step();
                if step != Step::Results {
                    return Err(WorkflowError::from(InvalidTransition {
                        from: step,
                        action: "submit",
                    }));
                }
                Ok(state.clone())
            })
            .await??;

        let submitted = self
            .until_cancelled(self.services.submitter.submit(&finished))
            .await?;

        let (record, callback) = {
            let mut inner = self.inner.lock().await;
            let state = inner.active()?;
            match submitted {
                Ok(record) => {
                    inner.phase = Phase::Submitted(record.clone());
                    (record, inner.on_complete.take())
                }
                Err(error) => {
                    self.record_failure(
                        state,
                        Step::Results,
                        error.code(),
                        error.user_message(),
                        error.retryable(),
                    );
                    return Err(error.into());
                }
            }
        };

        info!(
            workflow_id = %self.id,
            record_id = %record.id,
            cow_id = %record.animal_id,
            "Capture workflow submitted"
        );
        self.services.event_bus.emit_lossy(BovinEvent::WorkflowSubmitted {
            workflow_id: self.id,
            record_id: record.id,
            cow_id: record.animal_id.to_string(),
            timestamp: Utc::now(),
        });
        self.services
            .event_bus
            .emit_lossy(BovinEvent::MorphologyRecordsChanged {
                record_id: record.id,
                timestamp: Utc::now(),
            });

        if let Some(callback) = callback {
            callback(self.id, WorkflowOutcome::Submitted(record.clone()));
        }
        Ok(record)
    }
}
