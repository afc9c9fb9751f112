//! Common types shared across the pose estimation pipeline crates.
//!
//! This crate sits at the bottom of the dependency hierarchy:
//! - Has NO dependencies on other workspace crates
//! - Provides the camera, detection, pose and stage types every other crate speaks
//! - Owns the JSON wire shape of those types (snake_case, camelCase aliases accepted)

pub mod camera;
pub mod detection;
pub mod pose;
pub mod stage;

pub use camera::{CameraExtrinsics, CameraIntrinsics, CameraModel, CameraParams};
pub use detection::{BBox, Detection, RleCounts, RleMask};
pub use pose::{summarize_poses, PoseEntry};
pub use stage::{OutputMode, PipelineResult, StageKind, StageRecord};
