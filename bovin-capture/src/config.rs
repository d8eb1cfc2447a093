//! Configuration for bovin-capture
//!
//! Bootstrap TOML located by `bovin_common::config::ConfigFileResolver`,
//! then individual environment overrides, then validation.

use bovin_common::config::{
    env_override, load_toml_config, ConfigFileResolver, ConfigSource, LoggingConfig,
};
use bovin_common::events::CameraRole;
use bovin_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::capture::CaptureSettings;
use crate::models::{CameraInfo, CameraStatus, DEFAULT_MAX_IMAGE_BYTES};
use crate::stages::{ConfidencePolicy, StageSettings, DEFAULT_WARN_CONFIDENCE};
use crate::workflow::WorkflowSettings;

pub const MODULE_NAME: &str = "bovin-capture";
pub const DEFAULT_PORT: u16 = 5731;

pub const PORT_ENV_VAR: &str = "BOVIN_PORT";
pub const BACKEND_URL_ENV_VAR: &str = "BOVIN_BACKEND_URL";
pub const BACKEND_MODE_ENV_VAR: &str = "BOVIN_BACKEND_MODE";

/// Which collaborator strategy serves identification, measurement and storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    Http,
    #[default]
    Mock,
}

impl FromStr for BackendMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(BackendMode::Http),
            "mock" => Ok(BackendMode::Mock),
            other => Err(format!("unknown backend mode '{}' (expected http or mock)", other)),
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendMode::Http => f.write_str("http"),
            BackendMode::Mock => f.write_str("mock"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub mode: BackendMode,
    /// Collaborator base URL, required in http mode
    pub base_url: Option<String>,
    /// Transport ceiling for every collaborator request
    pub request_timeout_secs: u64,
    /// Operator recorded on records stored by the mock backend
    pub operator: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::default(),
            base_url: None,
            request_timeout_secs: 30,
            operator: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    pub max_upload_bytes: usize,
    pub jpeg_quality: u8,
    pub frame_ready_timeout_ms: u64,
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_IMAGE_BYTES,
            jpeg_quality: 90,
            frame_ready_timeout_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    pub identification_timeout_secs: u64,
    pub morphology_timeout_secs: u64,
    pub submit_timeout_secs: u64,
    /// Results below this confidence are flagged
    pub warn_confidence: f64,
    /// Results below this confidence are refused; unset never refuses
    pub min_confidence: Option<f64>,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            identification_timeout_secs: 15,
            morphology_timeout_secs: 15,
            submit_timeout_secs: 15,
            warn_confidence: DEFAULT_WARN_CONFIDENCE,
            min_confidence: None,
        }
    }
}

/// A camera installed at the capture station
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: String,
    pub name: String,
    pub role: CameraRole,
    /// HTTP endpoint returning the current frame
    #[serde(default)]
    pub snapshot_url: Option<String>,
    #[serde(default = "default_true")]
    pub online: bool,
}

fn default_true() -> bool {
    true
}

impl CameraConfig {
    pub fn to_camera_info(&self) -> CameraInfo {
        CameraInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            role: self.role,
            status: if self.online {
                CameraStatus::Online
            } else {
                CameraStatus::Offline
            },
            snapshot_url: self.snapshot_url.clone(),
        }
    }
}

/// bovin-capture bootstrap configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub host: String,
    pub port: u16,
    pub logging: LoggingConfig,
    pub backend: BackendConfig,
    pub capture: CaptureSection,
    pub stages: StagesConfig,
    pub cameras: Vec<CameraConfig>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            logging: LoggingConfig::default(),
            backend: BackendConfig::default(),
            capture: CaptureSection::default(),
            stages: StagesConfig::default(),
            cameras: Vec::new(),
        }
    }
}

impl CaptureConfig {
    /// Resolve, load, apply environment overrides and validate
    pub fn load(cli_path: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let source = ConfigFileResolver::new(MODULE_NAME).resolve(cli_path);
        let mut config: CaptureConfig = load_toml_config(&source)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok((config, source))
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(port) = env_override::<u16>(PORT_ENV_VAR)? {
            info!("Port overridden by {}: {}", PORT_ENV_VAR, port);
            self.port = port;
        }
        if let Some(url) = env_override::<String>(BACKEND_URL_ENV_VAR)? {
            info!("Backend URL overridden by {}", BACKEND_URL_ENV_VAR);
            self.backend.base_url = Some(url);
        }
        if let Some(mode) = env_override::<BackendMode>(BACKEND_MODE_ENV_VAR)? {
            info!("Backend mode overridden by {}: {}", BACKEND_MODE_ENV_VAR, mode);
            self.backend.mode = mode;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.max_upload_bytes == 0 {
            return Err(Error::Config("capture.max_upload_bytes must be positive".to_string()));
        }
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(Error::Config(format!(
                "capture.jpeg_quality must be between 1 and 100, got {}",
                self.capture.jpeg_quality
            )));
        }
        let timeouts = [
            ("capture.frame_ready_timeout_ms", self.capture.frame_ready_timeout_ms),
            ("backend.request_timeout_secs", self.backend.request_timeout_secs),
            ("stages.identification_timeout_secs", self.stages.identification_timeout_secs),
            ("stages.morphology_timeout_secs", self.stages.morphology_timeout_secs),
            ("stages.submit_timeout_secs", self.stages.submit_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(Error::Config(format!("{} must be non-zero", name)));
        }
        for (name, value) in [
            ("stages.warn_confidence", Some(self.stages.warn_confidence)),
            ("stages.min_confidence", self.stages.min_confidence),
        ] {
            if let Some(value) = value {
                if !(0.0..=1.0).contains(&value) {
                    return Err(Error::Config(format!(
                        "{} must be within [0, 1], got {}",
                        name, value
                    )));
                }
            }
        }
        if self.backend.mode == BackendMode::Http
            && self.backend.base_url.as_deref().map_or(true, |u| u.trim().is_empty())
        {
            return Err(Error::Config(format!(
                "backend.base_url is required in http mode (or set {})",
                BACKEND_URL_ENV_VAR
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for camera in &self.cameras {
            if !seen.insert(camera.id.as_str()) {
                return Err(Error::Config(format!("duplicate camera id '{}'", camera.id)));
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            max_image_bytes: self.capture.max_upload_bytes,
            jpeg_quality: self.capture.jpeg_quality,
            frame_ready_timeout: Duration::from_millis(self.capture.frame_ready_timeout_ms),
        }
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        let confidence = ConfidencePolicy {
            warn_below: self.stages.warn_confidence,
            block_below: self.stages.min_confidence,
        };
        WorkflowSettings {
            identification: StageSettings::default()
                .with_timeout(Duration::from_secs(self.stages.identification_timeout_secs))
                .with_confidence(confidence),
            morphology: StageSettings::default()
                .with_timeout(Duration::from_secs(self.stages.morphology_timeout_secs))
                .with_confidence(confidence),
            submit_timeout: Duration::from_secs(self.stages.submit_timeout_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    pub fn camera_infos(&self) -> Vec<CameraInfo> {
        self.cameras.iter().map(CameraConfig::to_camera_info).collect()
    }
}
