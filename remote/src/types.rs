//! Wire types for the remote services.
//!
//! Requests are serialized with the snake_case names the services expect.
//! Responses additionally accept the camelCase names and keep every unknown
//! member in `extra`, so a response can be persisted without loss.

use common::{CameraParams, Detection};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Implemented by every service response that carries a `success` flag.
pub trait ServiceReply {
    fn succeeded(&self) -> bool;
    fn failure_message(&self) -> Option<&str>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderRequest {
    pub cad_path: String,
    pub output_dir: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default, alias = "templatesGenerated", skip_serializing_if = "Option::is_none")]
    pub templates_generated: Option<u64>,

    #[serde(default, alias = "error_message", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServiceReply for RenderResponse {
    fn succeeded(&self) -> bool {
        self.success
    }

    fn failure_message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentRequest {
    pub rgb_image: String,
    pub depth_image: String,
    pub cam_params: CameraParams,
    pub template_dir: String,
    pub cad_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentResponse {
    #[serde(default)]
    pub success: bool,

    /// Left loosely typed; the detection adapter understands every shape the service emits.
    #[serde(default)]
    pub detections: Value,

    #[serde(default, alias = "inferenceTime", skip_serializing_if = "Option::is_none")]
    pub inference_time: Option<f64>,

    #[serde(default, alias = "error", alias = "errorMessage", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SegmentResponse {
    /// Number of masks in a columnar payload, or entries in a list payload.
    pub fn raw_detection_count(&self) -> usize {
        count_entries(&self.detections)
    }
}

fn count_entries(detections: &Value) -> usize {
    match detections {
        Value::Array(items) => items.len(),
        Value::Object(obj) if obj.contains_key("detections") => count_entries(&obj["detections"]),
        Value::Object(obj) => ["masks", "scores", "boxes"]
            .iter()
            .filter_map(|k| obj.get(*k).and_then(Value::as_array))
            .map(Vec::len)
            .max()
            .unwrap_or(0),
        _ => 0,
    }
}

impl ServiceReply for SegmentResponse {
    fn succeeded(&self) -> bool {
        self.success
    }

    fn failure_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimateRequest {
    pub rgb_image: String,
    pub depth_image: String,
    pub cam_params: CameraParams,
    pub cad_path: String,
    pub template_dir: String,
    pub seg_data: Vec<Detection>,
    pub det_score_thresh: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_guess: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimateResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default, alias = "poseScores")]
    pub pose_scores: Vec<f64>,

    #[serde(default, alias = "predRotations", alias = "pred_rotations")]
    pub pred_rot: Vec<Vec<Vec<f64>>>,

    #[serde(default, alias = "predTranslations", alias = "pred_translations")]
    pub pred_trans: Vec<Vec<f64>>,

    #[serde(default, alias = "inferenceTime", skip_serializing_if = "Option::is_none")]
    pub inference_time: Option<f64>,

    #[serde(default, alias = "error_message", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServiceReply for EstimateResponse {
    fn succeeded(&self) -> bool {
        self.success
    }

    fn failure_message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_segment_response_aliases_and_extra() {
        let resp: SegmentResponse = serde_json::from_value(json!({
            "success": true,
            "detections": {"masks": [1, 2], "scores": [0.1, 0.2, 0.3]},
            "inferenceTime": 1.5,
            "output_dir_used": "/tmp/x"
        }))
        .unwrap();
        assert_eq!(resp.inference_time, Some(1.5));
        assert_eq!(resp.raw_detection_count(), 3);
        assert_eq!(resp.extra["output_dir_used"], "/tmp/x");

        let back = serde_json::to_value(&resp).unwrap();
        assert_eq!(back["output_dir_used"], "/tmp/x");
    }

    #[test]
    fn test_estimate_response_camel_case() {
        let resp: EstimateResponse = serde_json::from_value(json!({
            "success": true,
            "poseScores": [0.9],
            "predRotations": [[[1, 0, 0], [0, 1, 0], [0, 0, 1]]],
            "predTranslations": [[0.1, 0.2, 0.3]]
        }))
        .unwrap();
        assert_eq!(resp.pose_scores, vec![0.9]);
        assert_eq!(resp.pred_trans[0][2], 0.3);
    }

    #[test]
    fn test_failure_message_alias() {
        let resp: RenderResponse = serde_json::from_value(json!({"success": false, "error_message": "no gpu"})).unwrap();
        assert!(!resp.succeeded());
        assert_eq!(resp.failure_message(), Some("no gpu"));
    }

    #[test]
    fn test_segment_request_omits_missing_output_dir() {
        let req = SegmentRequest {
            rgb_image: "a".into(),
            depth_image: "b".into(),
            cam_params: CameraParams::new(&common::CameraIntrinsics::new(1.0, 1.0, 0.0, 0.0), 1.0),
            template_dir: "/t".into(),
            cad_path: "/c.ply".into(),
            output_dir: None,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("output_dir").is_none());
        assert_eq!(value["cam_params"]["cam_K"][0], 1.0);
    }
}
