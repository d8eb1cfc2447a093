//! Capture source selection
//!
//! Prefers the camera when a camera of the step's role is online and its
//! feed is connected; otherwise the workflow defaults to upload.

use bovin_common::events::{SourceKind, Step};
use std::collections::HashMap;
use std::sync::Arc;

use super::camera::{CameraFeed, CameraSource};
use super::upload::{SelectedFile, UploadSource};
use super::CaptureSettings;
use crate::models::camera::online_cameras_for;
use crate::models::CameraInfo;

/// Camera feeds by camera id
#[derive(Clone, Default)]
pub struct FeedRegistry {
    feeds: HashMap<String, Arc<CameraFeed>>,
}

impl FeedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, camera_id: impl Into<String>, feed: Arc<CameraFeed>) {
        self.feeds.insert(camera_id.into(), feed);
    }

    pub fn get(&self, camera_id: &str) -> Option<Arc<CameraFeed>> {
        self.feeds.get(camera_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}

/// Factory choosing between camera and upload for a workflow
#[derive(Clone)]
pub struct SourceSelector {
    cameras: Vec<CameraInfo>,
    feeds: FeedRegistry,
    settings: CaptureSettings,
}

impl SourceSelector {
    pub fn new(cameras: Vec<CameraInfo>, feeds: FeedRegistry, settings: CaptureSettings) -> Self {
        Self {
            cameras,
            feeds,
            settings,
        }
    }

    /// Selector that only ever offers upload
    pub fn upload_only(settings: CaptureSettings) -> Self {
        Self::new(Vec::new(), FeedRegistry::new(), settings)
    }

    /// Same feeds and settings, restricted to a pre-filtered camera list
    pub fn with_cameras(&self, cameras: Vec<CameraInfo>) -> Self {
        Self::new(cameras, self.feeds.clone(), self.settings.clone())
    }

    pub fn cameras(&self) -> &[CameraInfo] {
        &self.cameras
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// First camera usable for `step`: online, of the right role, with a
    /// connected feed
    pub fn camera_for(&self, step: Step) -> Option<CameraSource> {
        let role = step.camera_role()?;
        online_cameras_for(&self.cameras, role).find_map(|camera| {
            let feed = self.feeds.get(&camera.id)?;
            feed.is_connected()
                .then(|| CameraSource::new(camera.clone(), feed, self.settings.clone()))
        })
    }

    /// Source kind the workflow should offer by default at `step`
    pub fn preferred(&self, step: Step) -> SourceKind {
        if self.camera_for(step).is_some() {
            SourceKind::Camera
        } else {
            SourceKind::Upload
        }
    }

    pub fn upload(&self, file: SelectedFile) -> UploadSource {
        UploadSource::new(file, self.settings.max_image_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::StillFrameFeed;
    use crate::models::CameraStatus;
    use bovin_common::events::CameraRole;

    fn selector(status: CameraStatus) -> SourceSelector {
        let camera = CameraInfo {
            id: "cam-id".to_string(),
            name: "Identification".to_string(),
            role: CameraRole::Identification,
            status,
            snapshot_url: None,
        };
        let mut feeds = FeedRegistry::new();
        feeds.insert(
            "cam-id",
            Arc::new(CameraFeed::new(Arc::new(StillFrameFeed::test_pattern(4, 4)))),
        );
        SourceSelector::new(vec![camera], feeds, CaptureSettings::default())
    }

    #[test]
    fn test_prefers_online_camera_of_role() {
        let selector = selector(CameraStatus::Online);
        assert_eq!(selector.preferred(Step::Identification), SourceKind::Camera);
        // no morphology camera configured
        assert_eq!(selector.preferred(Step::Morphology), SourceKind::Upload);
        assert_eq!(selector.preferred(Step::Results), SourceKind::Upload);
    }

    #[test]
    fn test_offline_camera_defaults_to_upload() {
        let selector = selector(CameraStatus::Offline);
        assert_eq!(selector.preferred(Step::Identification), SourceKind::Upload);
        assert!(selector.camera_for(Step::Identification).is_none());
    }

    #[test]
    fn test_camera_without_feed_is_not_offered() {
        let camera = CameraInfo {
            id: "orphan".to_string(),
            name: "Orphan".to_string(),
            role: CameraRole::Morphology,
            status: CameraStatus::Online,
            snapshot_url: None,
        };
        let selector =
            SourceSelector::new(vec![camera], FeedRegistry::new(), CaptureSettings::default());
        assert_eq!(selector.preferred(Step::Morphology), SourceKind::Upload);
    }

    #[test]
    fn test_skips_camera_without_feed_for_next_candidate() {
        let camera = |id: &str| CameraInfo {
            id: id.to_string(),
            name: id.to_uppercase(),
            role: CameraRole::Morphology,
            status: CameraStatus::Online,
            snapshot_url: None,
        };
        let mut feeds = FeedRegistry::new();
        feeds.insert(
            "second",
            Arc::new(CameraFeed::new(Arc::new(StillFrameFeed::test_pattern(4, 4)))),
        );
        let selector = SourceSelector::new(
            vec![camera("first"), camera("second")],
            feeds,
            CaptureSettings::default(),
        );

        let source = selector.camera_for(Step::Morphology).unwrap();
        assert_eq!(source.camera().id, "second");
        assert_eq!(selector.preferred(Step::Morphology), SourceKind::Camera);
    }

    #[test]
    fn test_disconnected_feed_falls_through_to_next_candidate() {
        let camera = |id: &str| CameraInfo {
            id: id.to_string(),
            name: id.to_uppercase(),
            role: CameraRole::Identification,
            status: CameraStatus::Online,
            snapshot_url: None,
        };
        let unplugged = StillFrameFeed::test_pattern(4, 4);
        unplugged.set_connected(false);
        let mut feeds = FeedRegistry::new();
        feeds.insert("first", Arc::new(CameraFeed::new(Arc::new(unplugged))));
        feeds.insert(
            "second",
            Arc::new(CameraFeed::new(Arc::new(StillFrameFeed::test_pattern(4, 4)))),
        );
        let selector = SourceSelector::new(
            vec![camera("first"), camera("second")],
            feeds,
            CaptureSettings::default(),
        );

        assert_eq!(selector.camera_for(Step::Identification).unwrap().camera().id, "second");
    }
}
