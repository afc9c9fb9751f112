//! Files written into a run's output directory.
//!
//! | file                       | written when                                  |
//! |----------------------------|-----------------------------------------------|
//! | `input_rgb.png`            | `full`, input images switch on                |
//! | `input_depth.png`          | `full`, input images switch on                |
//! | `camera_params.json`       | `full`, camera params switch on               |
//! | `ism_server_response.json` | `full`, server responses switch on            |
//! | `pem_server_response.json` | `full`, server responses switch on            |
//! | `pipeline_metadata.json`   | `full`                                        |
//! | `pose_results.json`        | `full` or `results_only`                      |

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use common::{CameraParams, PoseEntry, StageRecord};
use estimation_asset_cache::{CadAsset, TemplateBundle};
use estimation_vision::image_io;
use serde::Serialize;

use crate::config::PersistenceSwitches;
use crate::error::{PipelineError, Result};

pub const METADATA_FILE: &str = "pipeline_metadata.json";
pub const POSE_RESULTS_FILE: &str = "pose_results.json";
pub const CAMERA_PARAMS_FILE: &str = "camera_params.json";
pub const INPUT_RGB_FILE: &str = "input_rgb.png";
pub const INPUT_DEPTH_FILE: &str = "input_depth.png";
pub const SEGMENT_RESPONSE_FILE: &str = "ism_server_response.json";
pub const ESTIMATE_RESPONSE_FILE: &str = "pem_server_response.json";

#[derive(Debug, Clone, Serialize)]
pub struct PipelineInfo {
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub duration_seconds: f64,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestInfo {
    pub class_name: String,
    pub object_name: String,
    pub cad_path: String,
    pub template_dir: String,
    pub template_existed: bool,
    pub request_tag: String,
    pub output_mode: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fx: Option<f64>,
    pub fy: Option<f64>,
    pub cx: Option<f64>,
    pub cy: Option<f64>,
    pub intrinsic: Vec<f64>,
    pub depth_scale: f64,
}

impl CameraInfo {
    pub fn from_params(params: &CameraParams) -> Self {
        let k = params.intrinsics();
        let legacy_dim = |key: &str| params.extra.get(key).and_then(|v| v.as_u64()).map(|v| v as u32);
        Self {
            width: params.width.or_else(|| legacy_dim("depth_image_width")),
            height: params.height.or_else(|| legacy_dim("depth_image_height")),
            fx: k.map(|k| k.fx),
            fy: k.map(|k| k.fy),
            cx: k.map(|k| k.cx),
            cy: k.map(|k| k.cy),
            intrinsic: params.cam_k.clone(),
            depth_scale: params.depth_scale,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AssetInfo {
    pub template: Option<TemplateBundle>,
    pub cad: Option<CadAsset>,
}

/// Stage records keyed the way the service names are known on disk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineSteps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render: Option<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ism: Option<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pem: Option<StageRecord>,
}

impl PipelineSteps {
    pub fn from_records(records: &[StageRecord]) -> Self {
        use common::StageKind;
        let find = |kind: StageKind| records.iter().find(|r| r.stage == kind).cloned();
        Self {
            render: find(StageKind::Render),
            ism: find(StageKind::Segment),
            pem: find(StageKind::Estimate),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub pipeline_info: PipelineInfo,
    pub request_info: RequestInfo,
    pub camera_info: CameraInfo,
    pub assets: AssetInfo,
    pub pipeline_steps: PipelineSteps,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoseResultsFile<'a> {
    pub success: bool,
    pub num_poses: usize,
    pub pose_results: &'a [PoseEntry],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
}

/// Writes the artifacts of one run. All paths are relative to [`dir`](Self::dir).
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
    switches: PersistenceSwitches,
}

impl ArtifactWriter {
    /// Creates the output directory (and parents).
    pub async fn create(dir: impl Into<PathBuf>, switches: PersistenceSwitches) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PipelineError::persist(&dir, e))?;
        Ok(Self { dir, switches })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn switches(&self) -> PersistenceSwitches {
        self.switches
    }

    /// Creates `<dir>/<name>` for a stage's own outputs.
    pub async fn stage_dir(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| PipelineError::persist(&path, e))?;
        Ok(path)
    }

    async fn write_bytes(&self, name: &str, bytes: Vec<u8>) -> Result<PathBuf> {
        let path = self.dir.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PipelineError::persist(&path, e))?;
        tracing::debug!(path = %path.display(), "Artifact written");
        Ok(path)
    }

    pub async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(name, bytes).await
    }

    /// Input images and camera parameters, each gated by its switch.
    ///
    /// The depth payload is written as received when it cannot be decoded.
    pub async fn save_inputs(&self, rgb_image: &str, depth_image: &str, cam_params: &CameraParams) -> Result<()> {
        if self.switches.save_input_images {
            let rgb = image_io::decode_base64(rgb_image)?;
            self.write_bytes(INPUT_RGB_FILE, image_io::ensure_png(&rgb)?).await?;

            let depth = image_io::decode_base64(depth_image)?;
            let depth_png = match image_io::ensure_png(&depth) {
                Ok(png) => png,
                Err(e) => {
                    tracing::warn!(error = %e, "Depth payload is not a decodable image, writing raw bytes");
                    depth
                }
            };
            self.write_bytes(INPUT_DEPTH_FILE, depth_png).await?;
        } else {
            tracing::info!("Skipping input image persistence");
        }

        if self.switches.save_camera_params {
            self.write_json(CAMERA_PARAMS_FILE, cam_params).await?;
        }
        Ok(())
    }

    /// Raw remote response, only when server responses are persisted.
    pub async fn save_response<T: Serialize>(&self, name: &str, response: &T) -> Result<Option<PathBuf>> {
        if !self.switches.save_server_responses {
            return Ok(None);
        }
        self.write_json(name, response).await.map(Some)
    }

    pub async fn save_metadata(&self, metadata: &RunMetadata) -> Result<PathBuf> {
        self.write_json(METADATA_FILE, metadata).await
    }

    pub async fn save_pose_results(&self, success: bool, poses: &[PoseEntry], error: Option<&str>) -> Result<PathBuf> {
        let file = PoseResultsFile {
            success,
            num_poses: poses.len(),
            pose_results: poses,
            error,
        };
        self.write_json(POSE_RESULTS_FILE, &file).await
    }
}
