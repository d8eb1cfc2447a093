//! Live frame feeds
//!
//! A feed delivers the current frame of a camera. Only one still frame is
//! ever sampled per capture; streaming protocols stay behind the feed.

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("feed is not connected")]
    NotConnected,

    #[error("feed failed: {0}")]
    Failed(String),
}

/// Source of live camera frames
#[async_trait]
pub trait FrameFeed: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Current frame. Waits when the feed is connected but has not
    /// produced a frame yet.
    async fn current_frame(&self) -> Result<DynamicImage, FeedError>;
}

/// Camera exposing its current frame at an HTTP snapshot URL
pub struct SnapshotFeed {
    url: String,
    client: reqwest::Client,
}

impl SnapshotFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Failed(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl FrameFeed for SnapshotFeed {
    fn is_connected(&self) -> bool {
        !self.url.is_empty()
    }

    async fn current_frame(&self) -> Result<DynamicImage, FeedError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FeedError::Failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FeedError::Failed(format!(
                "snapshot returned {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FeedError::Failed(e.to_string()))?;

        tokio::task::spawn_blocking(move || image::load_from_memory(&body))
            .await
            .map_err(|e| FeedError::Failed(e.to_string()))?
            .map_err(|e| FeedError::Failed(format!("undecodable snapshot: {}", e)))
    }
}

/// In-process feed holding the latest frame pushed into it.
///
/// Used for locally attached cameras whose driver pushes frames, for the
/// mock backend, and in tests.
#[derive(Clone)]
pub struct StillFrameFeed {
    connected: Arc<AtomicBool>,
    frame_tx: Arc<watch::Sender<Option<Arc<DynamicImage>>>>,
}

impl Default for StillFrameFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl StillFrameFeed {
    /// Connected feed with no frame yet
    pub fn new() -> Self {
        let (frame_tx, _) = watch::channel(None);
        Self {
            connected: Arc::new(AtomicBool::new(true)),
            frame_tx: Arc::new(frame_tx),
        }
    }

    pub fn with_frame(frame: DynamicImage) -> Self {
        let feed = Self::new();
        feed.push_frame(frame);
        feed
    }

    /// Feed showing a gradient test pattern
    pub fn test_pattern(width: u32, height: u32) -> Self {
        let pattern = RgbImage::from_fn(width, height, |x, y| {
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            Rgb([r, g, 128])
        });
        Self::with_frame(DynamicImage::ImageRgb8(pattern))
    }

    pub fn push_frame(&self, frame: DynamicImage) {
        self.frame_tx.send_replace(Some(Arc::new(frame)));
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl FrameFeed for StillFrameFeed {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn current_frame(&self) -> Result<DynamicImage, FeedError> {
        if !self.is_connected() {
            return Err(FeedError::NotConnected);
        }
        let mut rx = self.frame_tx.subscribe();
        let frame = rx
            .wait_for(|frame| frame.is_some())
            .await
            .map_err(|_| FeedError::NotConnected)?
            .clone();
        frame
            .map(|f| (*f).clone())
            .ok_or_else(|| FeedError::Failed("no frame".to_string()))
    }
}
