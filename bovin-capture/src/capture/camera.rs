//! Camera capture source

use async_trait::async_trait;
use bovin_common::events::SourceKind;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::feed::{FeedError, FrameFeed};
use super::{CaptureError, CaptureSettings, CaptureSource};
use crate::models::{CameraInfo, CaptureResult, ImageMime};

/// A camera's feed plus the lock making each capture attempt exclusive
pub struct CameraFeed {
    feed: Arc<dyn FrameFeed>,
    in_use: Mutex<()>,
}

impl CameraFeed {
    pub fn new(feed: Arc<dyn FrameFeed>) -> Self {
        Self {
            feed,
            in_use: Mutex::new(()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.feed.is_connected()
    }
}

/// Samples one frame from a live feed and encodes it as JPEG
pub struct CameraSource {
    camera: CameraInfo,
    feed: Arc<CameraFeed>,
    settings: CaptureSettings,
}

impl CameraSource {
    pub fn new(camera: CameraInfo, feed: Arc<CameraFeed>, settings: CaptureSettings) -> Self {
        Self {
            camera,
            feed,
            settings,
        }
    }

    pub fn camera(&self) -> &CameraInfo {
        &self.camera
    }

    fn unavailable(&self, reason: &str) -> CaptureError {
        CaptureError::SourceUnavailable(format!("Camera '{}' {}", self.camera.name, reason))
    }
}

/// Encode a frame as baseline JPEG at `quality` (1-100)
pub fn encode_jpeg(frame: &DynamicImage, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let rgb = frame.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(&rgb)
        .map_err(|e| CaptureError::Encoding(e.to_string()))?;
    Ok(buffer)
}

#[async_trait]
impl CaptureSource for CameraSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Camera
    }

    fn describe(&self) -> String {
        format!("camera {}", self.camera.id)
    }

    async fn acquire(&self) -> Result<CaptureResult, CaptureError> {
        if !self.camera.is_online() {
            return Err(self.unavailable("is offline"));
        }
        if !self.feed.is_connected() {
            return Err(self.unavailable("feed is not connected"));
        }

        let _exclusive = self
            .feed
            .in_use
            .try_lock()
            .map_err(|_| self.unavailable("is in use by another capture"))?;

        let started = Instant::now();
        let frame = tokio::time::timeout(
            self.settings.frame_ready_timeout,
            self.feed.feed.current_frame(),
        )
        .await
        .map_err(|_| self.unavailable("produced no frame in time"))?
        .map_err(|e| match e {
            FeedError::NotConnected => self.unavailable("feed is not connected"),
            FeedError::Failed(reason) => {
                warn!(camera_id = %self.camera.id, error = %reason, "Camera feed failed");
                self.unavailable("feed failed")
            }
        })?;

        let quality = self.settings.jpeg_quality;
        let encoded = tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality))
            .await
            .map_err(|e| CaptureError::Encoding(e.to_string()))??;

        if encoded.len() > self.settings.max_image_bytes {
            return Err(CaptureError::TooLarge {
                size_bytes: encoded.len(),
                max_bytes: self.settings.max_image_bytes,
            });
        }

        debug!(
            camera_id = %self.camera.id,
            size_bytes = encoded.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Camera frame captured"
        );

        Ok(CaptureResult::new(Bytes::from(encoded), ImageMime::Jpeg))
    }
}
