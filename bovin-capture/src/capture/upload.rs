//! Upload capture source

use async_trait::async_trait;
use bovin_common::events::SourceKind;
use bytes::Bytes;
use tracing::debug;

use super::{CaptureError, CaptureSource};
use crate::models::{CaptureResult, ImageMime};

/// A file chosen by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub file_name: Option<String>,
    /// MIME type reported by the client, if any
    pub declared_mime: Option<String>,
    pub bytes: Bytes,
}

impl SelectedFile {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: None,
            declared_mime: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_declared_mime(mut self, mime: impl Into<String>) -> Self {
        self.declared_mime = Some(mime.into());
        self
    }
}

/// Validates an uploaded file and yields it unchanged
pub struct UploadSource {
    file: SelectedFile,
    max_bytes: usize,
}

impl UploadSource {
    pub fn new(file: SelectedFile, max_bytes: usize) -> Self {
        Self { file, max_bytes }
    }

    /// Size first, then declared type, then magic bytes
    fn validate(&self) -> Result<ImageMime, CaptureError> {
        let size_bytes = self.file.bytes.len();
        if size_bytes > self.max_bytes {
            return Err(CaptureError::TooLarge {
                size_bytes,
                max_bytes: self.max_bytes,
            });
        }

        if size_bytes == 0 {
            return Err(CaptureError::InvalidFormat("empty file".to_string()));
        }

        if let Some(declared) = &self.file.declared_mime {
            if ImageMime::from_mime(declared).is_none() {
                return Err(CaptureError::InvalidFormat(declared.clone()));
            }
        }

        let detected = infer::get(&self.file.bytes)
            .map(|kind| kind.mime_type())
            .unwrap_or("unknown");

        let mime = ImageMime::from_mime(detected)
            .ok_or_else(|| CaptureError::InvalidFormat(detected.to_string()))?;

        if let Some(declared) = self.file.declared_mime.as_deref().and_then(ImageMime::from_mime) {
            if declared != mime {
                debug!(
                    declared = %declared,
                    detected = %mime,
                    "Declared MIME type differs from file content, using detected type"
                );
            }
        }

        Ok(mime)
    }
}

#[async_trait]
impl CaptureSource for UploadSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Upload
    }

    fn describe(&self) -> String {
        format!(
            "upload {}",
            self.file.file_name.as_deref().unwrap_or("<unnamed>")
        )
    }

    async fn acquire(&self) -> Result<CaptureResult, CaptureError> {
        let mime = self.validate()?;
        Ok(CaptureResult::new(self.file.bytes.clone(), mime))
    }
}
