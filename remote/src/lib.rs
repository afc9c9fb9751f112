//! Clients for the services the pipeline depends on.
//!
//! - [`InferenceServices`]: render, segment and estimate calls ([`HttpInferenceClient`] over reqwest)
//! - [`CameraClient`]: raw frames and calibration from the capture service
//! - [`ServerMonitor`]: concurrent health probes with an overall verdict
//! - [`ProgressMonitor`]: progress logging while a long call is outstanding
//!
//! Every failure is a [`RemoteError`] whose [`kind`](RemoteError::kind) ends up
//! on the failed stage record.

pub mod camera;
pub mod client;
pub mod error;
pub mod monitor;
pub mod progress;
pub mod types;

pub use camera::{resolve_base_url, CameraClient, DEFAULT_CAMERA_HOST, DEFAULT_CAMERA_PORT, DEFAULT_CAMERA_TIMEOUT};
pub use client::{HttpInferenceClient, InferenceServices, ServiceEndpoints, StageTimeouts};
pub use error::{RemoteError, Result};
pub use monitor::{HealthState, OverallStatus, ServerMonitor, ServerStatus, ServersReport, DEFAULT_HEALTH_TIMEOUT};
pub use progress::{ProgressEvent, ProgressMonitor, ProgressState};
pub use types::{
    EstimateRequest, EstimateResponse, RenderRequest, RenderResponse, SegmentRequest, SegmentResponse, ServiceReply,
};
