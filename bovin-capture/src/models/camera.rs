//! Camera descriptions

use bovin_common::events::CameraRole;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CameraStatus {
    #[default]
    Online,
    Offline,
}

/// A camera known to the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraInfo {
    /// Stable camera identifier, also sent to camera-direct collaborator calls
    pub id: String,
    /// Human-readable name
    pub name: String,
    pub role: CameraRole,
    #[serde(default)]
    pub status: CameraStatus,
    /// HTTP endpoint returning the current frame as an image, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_url: Option<String>,
}

impl CameraInfo {
    pub fn is_online(&self) -> bool {
        self.status == CameraStatus::Online
    }
}

/// Online cameras for `role`, in list order
pub fn online_cameras_for(
    cameras: &[CameraInfo],
    role: CameraRole,
) -> impl Iterator<Item = &CameraInfo> {
    cameras
        .iter()
        .filter(move |c| c.role == role && c.is_online())
}

/// Cameras filtered by role (all cameras when `role` is None)
pub fn cameras_with_role(cameras: &[CameraInfo], role: Option<CameraRole>) -> Vec<CameraInfo> {
    cameras
        .iter()
        .filter(|c| role.map_or(true, |r| c.role == r))
        .cloned()
        .collect()
}
