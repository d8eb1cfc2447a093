//! Image capture sources
//!
//! One [`CaptureSource`] trait, two implementations:
//! - [`CameraSource`]: samples the current frame of a live feed and
//!   encodes it as JPEG at fixed quality
//! - [`UploadSource`]: validates a user-selected file
//!
//! Sources only produce bytes. Committing an image to the workflow is the
//! controller's decision.

pub mod camera;
pub mod feed;
pub mod selector;
pub mod upload;

pub use camera::{CameraFeed, CameraSource};
pub use feed::{FeedError, FrameFeed, SnapshotFeed, StillFrameFeed};
pub use selector::{FeedRegistry, SourceSelector};
pub use upload::{SelectedFile, UploadSource};

use async_trait::async_trait;
use bovin_common::events::SourceKind;
use std::time::Duration;
use thiserror::Error;

use crate::models::{CaptureResult, DEFAULT_MAX_IMAGE_BYTES};

/// Capture errors. None of these issue a network call to the stages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// No camera, camera offline, feed disconnected or busy
    #[error("Camera unavailable: {0}")]
    SourceUnavailable(String),

    /// File type outside the JPEG/PNG/WEBP allow-list
    #[error("Unsupported image format: {0}")]
    InvalidFormat(String),

    #[error("Image too large: {size_bytes} bytes (maximum {max_bytes} bytes)")]
    TooLarge { size_bytes: usize, max_bytes: usize },

    /// Camera frame could not be encoded
    #[error("Failed to encode camera frame: {0}")]
    Encoding(String),
}

impl CaptureError {
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
            CaptureError::InvalidFormat(_) => "INVALID_FORMAT",
            CaptureError::TooLarge { .. } => "TOO_LARGE",
            CaptureError::Encoding(_) => "ENCODING_FAILED",
        }
    }

    /// Message telling the user what to do next
    pub fn user_message(&self) -> String {
        match self {
            CaptureError::SourceUnavailable(reason) => {
                format!("{}. Select an image file instead.", reason)
            }
            CaptureError::InvalidFormat(found) => {
                format!("Unsupported file type ({}). Use a JPEG, PNG or WEBP image.", found)
            }
            CaptureError::TooLarge { max_bytes, .. } => format!(
                "The image exceeds {} MB. Choose a smaller file.",
                max_bytes / (1024 * 1024)
            ),
            CaptureError::Encoding(_) => {
                "The camera image could not be processed. Retake the picture.".to_string()
            }
        }
    }

    /// Format and size errors need a different file, not a retry
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            CaptureError::SourceUnavailable(_) | CaptureError::Encoding(_)
        )
    }
}

/// Capture limits and camera encoding parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    pub max_image_bytes: usize,
    /// JPEG quality for camera frames (90 = 0.9)
    pub jpeg_quality: u8,
    /// How long a connected feed may take to deliver its first frame
    pub frame_ready_timeout: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            jpeg_quality: 90,
            frame_ready_timeout: Duration::from_secs(3),
        }
    }
}

/// Acquires one still image
#[async_trait]
pub trait CaptureSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Short description for logs (camera id or file name)
    fn describe(&self) -> String;

    async fn acquire(&self) -> Result<CaptureResult, CaptureError>;
}
