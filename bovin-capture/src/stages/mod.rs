//! Processing stages
//!
//! Each stage forwards a captured image to its collaborator under an
//! enforced deadline and validates what comes back. Stages hold no
//! workflow state; the controller decides what to do with their results.

pub mod identification;
pub mod morphology;

pub use identification::IdentificationStage;
pub use morphology::MorphologyStage;

use std::future::Future;
use std::time::Duration;

use crate::services::ProcessingError;

/// Default deadline of one stage call
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(15);

/// Below this confidence a result is flagged to the user
pub const DEFAULT_WARN_CONFIDENCE: f64 = 0.5;

/// What to do with a low-confidence result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidencePolicy {
    /// Results below this are accepted but logged and flagged
    pub warn_below: f64,
    /// Results below this fail with `LowConfidence`; unset never blocks
    pub block_below: Option<f64>,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self {
            warn_below: DEFAULT_WARN_CONFIDENCE,
            block_below: None,
        }
    }
}

impl ConfidencePolicy {
    pub fn blocking(threshold: f64) -> Self {
        Self {
            block_below: Some(threshold),
            ..Self::default()
        }
    }

    /// Err when blocked, Ok(true) when only flagged
    pub fn check(&self, confidence: f64) -> Result<bool, ProcessingError> {
        if let Some(threshold) = self.block_below {
            if confidence < threshold {
                return Err(ProcessingError::LowConfidence {
                    confidence,
                    threshold,
                });
            }
        }
        Ok(confidence < self.warn_below)
    }

    pub fn is_low(&self, confidence: f64) -> bool {
        confidence < self.warn_below
    }
}

/// Deadline and confidence handling shared by both stages
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSettings {
    pub timeout: Duration,
    pub confidence: ConfidencePolicy,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_STAGE_TIMEOUT,
            confidence: ConfidencePolicy::default(),
        }
    }
}

impl StageSettings {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_confidence(mut self, confidence: ConfidencePolicy) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Run a collaborator call, failing with `Timeout` past the deadline
pub(crate) async fn with_deadline<T, F>(timeout: Duration, call: F) -> Result<T, ProcessingError>
where
    F: Future<Output = Result<T, ProcessingError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ProcessingError::Timeout(timeout)),
    }
}
