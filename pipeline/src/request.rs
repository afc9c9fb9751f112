//! Run requests and the batch render report.

use common::CameraParams;
use serde::{Deserialize, Serialize};

/// One pipeline run over caller-supplied images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    #[serde(alias = "classId", alias = "className")]
    pub class_name: String,

    #[serde(alias = "objectId", alias = "objectName")]
    pub object_name: String,

    /// Base64 PNG/JPEG.
    #[serde(alias = "rgbImageBase64", alias = "rgb_image_base64", alias = "rgbImage")]
    pub rgb_image: String,

    /// Base64 16-bit PNG.
    #[serde(alias = "depthImageBase64", alias = "depth_image_base64", alias = "depthImage")]
    pub depth_image: String,

    #[serde(alias = "camParams")]
    pub cam_params: CameraParams,

    #[serde(default, alias = "outputDir")]
    pub output_dir: Option<String>,

    #[serde(default, alias = "frameGuess")]
    pub frame_guess: bool,

    /// Legacy switch, consulted only when `output_mode` is absent.
    #[serde(default, alias = "saveOutputs")]
    pub save_outputs: Option<bool>,

    #[serde(default, alias = "outputMode")]
    pub output_mode: Option<String>,

    #[serde(default, alias = "requestTag")]
    pub request_tag: Option<String>,

    #[serde(default, alias = "forceRender", alias = "force_regenerate")]
    pub force_render: bool,
}

/// A run whose images come from the capture service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    #[serde(alias = "classId", alias = "className")]
    pub class_name: String,

    #[serde(alias = "objectId", alias = "objectName")]
    pub object_name: String,

    #[serde(default)]
    pub base: Option<String>,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default, alias = "alignColor")]
    pub align_color: bool,

    #[serde(default, alias = "outputDir")]
    pub output_dir: Option<String>,

    #[serde(default, alias = "frameGuess")]
    pub frame_guess: bool,

    #[serde(default, alias = "saveOutputs")]
    pub save_outputs: Option<bool>,

    #[serde(default, alias = "outputMode")]
    pub output_mode: Option<String>,

    #[serde(default, alias = "requestTag")]
    pub request_tag: Option<String>,

    #[serde(default, alias = "forceRender", alias = "force_regenerate")]
    pub force_render: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOutcome {
    pub object_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_generated: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of [`render_templates`](crate::PipelineOrchestrator::render_templates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderTemplatesReport {
    /// True when at least one object succeeded (rendered or already present).
    pub success: bool,
    pub total: usize,
    pub successful: usize,
    pub results: Vec<RenderOutcome>,
}

impl RenderTemplatesReport {
    pub fn from_outcomes(results: Vec<RenderOutcome>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            success: successful > 0,
            total: results.len(),
            successful,
            results,
        }
    }
}
