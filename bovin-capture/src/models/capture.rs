//! Captured image types

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upload size ceiling for this pipeline (10 MiB)
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Image formats accepted anywhere in the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageMime {
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/webp")]
    Webp,
}

impl ImageMime {
    /// The allow-list
    pub const ALLOWED: [ImageMime; 3] = [ImageMime::Jpeg, ImageMime::Png, ImageMime::Webp];

    pub fn as_str(self) -> &'static str {
        match self {
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Png => "image/png",
            ImageMime::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageMime::Jpeg => "jpg",
            ImageMime::Png => "png",
            ImageMime::Webp => "webp",
        }
    }

    /// Parse a MIME string; parameters (`; charset=...`) and case are ignored.
    /// `image/jpg` is accepted as a common alias.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageMime::Jpeg),
            "image/png" => Some(ImageMime::Png),
            "image/webp" => Some(ImageMime::Webp),
            _ => None,
        }
    }
}

impl fmt::Display for ImageMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One still image, ready to be committed to a workflow step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub encoded_image: Bytes,
    pub mime_type: ImageMime,
    pub size_bytes: usize,
}

impl CaptureResult {
    pub fn new(encoded_image: Bytes, mime_type: ImageMime) -> Self {
        let size_bytes = encoded_image.len();
        Self {
            encoded_image,
            mime_type,
            size_bytes,
        }
    }

    /// File name used when forwarding the image as a multipart part
    pub fn file_name(&self) -> String {
        format!("capture.{}", self.mime_type.extension())
    }
}
