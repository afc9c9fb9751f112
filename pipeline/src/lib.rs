//! Pose-estimation pipeline orchestration.
//!
//! A run takes an RGB-D frame plus camera parameters for one known object and
//! drives three remote services in order:
//!
//! 1. **Render**: template rendering for the object's CAD model, skipped when
//!    templates already exist and no re-render was forced
//! 2. **Segment**: instance segmentation against the templates
//! 3. **Estimate**: 6D pose estimation on the top-K usable detections
//!
//! Stage failures are recorded per stage and never abort the run. What ends up
//! on disk is decided by the run's [`OutputMode`](common::OutputMode).

pub mod artifacts;
pub mod capture;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod request;

pub use artifacts::{ArtifactWriter, RunMetadata, METADATA_FILE, POSE_RESULTS_FILE};
pub use capture::{capture_frame, CapturedFrame};
pub use config::{CameraDefaults, PathMapping, PersistenceSwitches, PipelineConfig, StaticPaths, DEFAULT_DET_SCORE_THRESH};
pub use error::{PipelineError, Result};
pub use orchestrator::PipelineOrchestrator;
pub use output::{normalize_tag, plan_output_dir, DEFAULT_CAPTURE_TAG, DEFAULT_TAG};
pub use request::{CaptureRequest, PipelineRequest, RenderOutcome, RenderTemplatesReport};
