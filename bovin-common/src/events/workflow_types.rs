//! Capture workflow type definitions
//!
//! Supporting types shared between the capture service and anything that
//! consumes its events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three ordered steps of the capture workflow.
///
/// Steps only move to an adjacent step. Leaving the workflow entirely
/// (submit or cancel) is not a step; it ends the workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Capture an image and identify the animal
    Identification,
    /// Capture an image and measure the identified animal
    Morphology,
    /// Review results before explicit submission
    Results,
}

impl Step {
    /// All steps in workflow order
    pub const ALL: [Step; 3] = [Step::Identification, Step::Morphology, Step::Results];

    /// Transition table: the step `next()` leads to, if any.
    ///
    /// `Results` has no successor; leaving it requires an explicit submit.
    pub fn successor(self) -> Option<Step> {
        match self {
            Step::Identification => Some(Step::Morphology),
            Step::Morphology => Some(Step::Results),
            Step::Results => None,
        }
    }

    /// Transition table: the step `back()` leads to, if any.
    pub fn predecessor(self) -> Option<Step> {
        match self {
            Step::Identification => None,
            Step::Morphology => Some(Step::Identification),
            Step::Results => Some(Step::Morphology),
        }
    }

    /// Zero-based position in the workflow
    pub fn index(self) -> usize {
        match self {
            Step::Identification => 0,
            Step::Morphology => 1,
            Step::Results => 2,
        }
    }

    /// Camera role needed to capture at this step (None at Results)
    pub fn camera_role(self) -> Option<CameraRole> {
        match self {
            Step::Identification => Some(CameraRole::Identification),
            Step::Morphology => Some(CameraRole::Morphology),
            Step::Results => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Identification => "identification",
            Step::Morphology => "morphology",
            Step::Results => "results",
        };
        f.write_str(name)
    }
}

/// What a camera is installed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraRole {
    Identification,
    Morphology,
}

impl fmt::Display for CameraRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraRole::Identification => f.write_str("identification"),
            CameraRole::Morphology => f.write_str("morphology"),
        }
    }
}

/// Origin of a captured image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Still frame sampled from a live camera feed
    Camera,
    /// File selected by the user
    Upload,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Camera => f.write_str("camera"),
            SourceKind::Upload => f.write_str("upload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successor_never_skips() {
        for step in Step::ALL {
            if let Some(next) = step.successor() {
                assert_eq!(next.index(), step.index() + 1);
            }
        }
        assert_eq!(Step::Results.successor(), None);
    }

    #[test]
    fn test_predecessor_is_inverse_of_successor() {
        for step in Step::ALL {
            if let Some(next) = step.successor() {
                assert_eq!(next.predecessor(), Some(step));
            }
        }
        assert_eq!(Step::Identification.predecessor(), None);
    }

    #[test]
    fn test_step_serializes_snake_case() {
        let json = serde_json::to_string(&Step::Morphology).unwrap();
        assert_eq!(json, "\"morphology\"");
    }

    #[test]
    fn test_camera_role_per_step() {
        assert_eq!(Step::Identification.camera_role(), Some(CameraRole::Identification));
        assert_eq!(Step::Morphology.camera_role(), Some(CameraRole::Morphology));
        assert_eq!(Step::Results.camera_role(), None);
    }
}
