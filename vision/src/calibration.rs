//! Extraction of camera geometry from capture-service calibration blobs.
//!
//! Capture firmwares disagree on naming, so every lookup tries a list of key
//! conventions and the first usable match wins. Nothing here fails hard: a
//! missing or malformed entry is simply `None`.

use common::{CameraExtrinsics, CameraIntrinsics};
use serde_json::{Map, Value};

const MATRIX_KEYS: &[&str] = &[
    "K",
    "CamK",
    "camK",
    "cam_K",
    "camera_matrix",
    "intrinsic_matrix",
    "color_camera_matrix",
    "depth_camera_matrix",
];

const INTRINSIC_SECTIONS: &[&str] = &[
    "depth_intrinsics",
    "depth",
    "color_intrinsics",
    "color",
    "rgb",
    "camera",
    "intrinsics",
    "left",
    "right",
];

const DEPTH_SCALE_KEYS: &[&str] = &["depth_scale", "depthScale", "depth_unit", "depthUnit", "depth_scale_mm"];

const EXTRINSIC_KEYS: &[&str] = &["T_depth_to_color", "T_dc", "extrinsic_depth_to_color", "depth_to_color"];
const EXTRINSIC_SECTIONS: &[&str] = &["extrinsics", "calibration", "transforms"];
const EXTRINSIC_NESTED_KEYS: &[&str] = &["depth_to_color", "DepthToColor", "depth2color", "T_depth_to_color"];

const MAX_DEPTH: usize = 4;

/// Flattens a (possibly nested) numeric array, or an object's `data` member.
fn matrix_values(value: &Value) -> Option<Vec<f64>> {
    fn flatten(value: &Value, out: &mut Vec<f64>) -> Option<()> {
        match value {
            Value::Array(items) => items.iter().try_for_each(|v| flatten(v, out)),
            other => {
                out.push(other.as_f64()?);
                Some(())
            }
        }
    }

    let source = match value {
        Value::Object(obj) => obj.get("data")?,
        other => other,
    };
    if !source.is_array() {
        return None;
    }
    let mut out = Vec::new();
    flatten(source, &mut out)?;
    Some(out)
}

fn number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_f64))
}

fn intrinsics_from_fields(obj: &Map<String, Value>) -> Option<CameraIntrinsics> {
    let intrinsics = CameraIntrinsics::new(
        number(obj, &["fx"])?,
        number(obj, &["fy"])?,
        number(obj, &["cx", "ppx"])?,
        number(obj, &["cy", "ppy"])?,
    );
    intrinsics.is_valid().then_some(intrinsics)
}

fn search_intrinsics(obj: &Map<String, Value>, depth: usize) -> Option<CameraIntrinsics> {
    if depth > MAX_DEPTH {
        return None;
    }
    let from_matrix = MATRIX_KEYS.iter().find_map(|k| {
        let values = matrix_values(obj.get(*k)?)?;
        CameraIntrinsics::from_matrix(&values)
    });
    if from_matrix.is_some() {
        return from_matrix;
    }

    for section in INTRINSIC_SECTIONS {
        if let Some(Value::Object(sub)) = obj.get(*section) {
            if let Some(found) = intrinsics_from_fields(sub).or_else(|| search_intrinsics(sub, depth + 1)) {
                return Some(found);
            }
        }
    }

    intrinsics_from_fields(obj)
}

/// Intrinsics of the depth stream (or of whichever stream the blob describes first).
pub fn extract_intrinsics(calib: &Value) -> Option<CameraIntrinsics> {
    search_intrinsics(calib.as_object()?, 0)
}

/// Intrinsics of the color stream; only `color_intrinsics` is trusted for this.
pub fn extract_color_intrinsics(calib: &Value) -> Option<CameraIntrinsics> {
    match calib.get("color_intrinsics")? {
        Value::Object(sub) => intrinsics_from_fields(sub),
        _ => None,
    }
}

fn depth_scale_in(blob: &Value) -> Option<f64> {
    let obj = blob.as_object()?;
    DEPTH_SCALE_KEYS.iter().find_map(|k| match obj.get(*k)? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite() && *v > 0.0),
        Value::String(unit) => match unit.trim().to_ascii_lowercase().as_str() {
            "mm" | "millimeter" | "millimetre" => Some(1.0),
            "m" | "meter" | "metre" => Some(1000.0),
            _ => None,
        },
        _ => None,
    })
}

/// Depth scale from the calibration blob, then the status blob; 1.0 when neither says.
pub fn extract_depth_scale(calib: &Value, status: Option<&Value>) -> f64 {
    depth_scale_in(calib)
        .or_else(|| status.and_then(depth_scale_in))
        .unwrap_or(1.0)
}

fn extrinsics_from(value: &Value) -> Option<CameraExtrinsics> {
    match value {
        Value::Object(obj) => {
            let rotation = ["R", "rotation", "rot"].iter().find_map(|k| matrix_values(obj.get(*k)?));
            let translation = ["t", "translation"].iter().find_map(|k| matrix_values(obj.get(*k)?));
            if let (Some(r), Some(t)) = (rotation, translation) {
                return CameraExtrinsics::from_parts(&r, &t);
            }
            CameraExtrinsics::from_homogeneous(&matrix_values(obj.get("matrix")?)?)
        }
        Value::Array(_) => CameraExtrinsics::from_homogeneous(&matrix_values(value)?),
        _ => None,
    }
}

/// Rigid depth-to-color transform, translation in metres.
pub fn extract_extrinsics(calib: &Value) -> Option<CameraExtrinsics> {
    let obj = calib.as_object()?;
    if let Some(found) = EXTRINSIC_KEYS.iter().find_map(|k| extrinsics_from(obj.get(*k)?)) {
        return Some(found);
    }
    EXTRINSIC_SECTIONS.iter().find_map(|section| {
        let sub = obj.get(*section)?.as_object()?;
        EXTRINSIC_NESTED_KEYS.iter().find_map(|k| extrinsics_from(sub.get(*k)?))
    })
}

fn size_in(obj: &Map<String, Value>) -> Option<(u32, u32)> {
    let w = number(obj, &["width", "w"])?;
    let h = number(obj, &["height", "h"])?;
    let dim = |v: f64| (v >= 1.0 && v <= f64::from(u32::MAX) && v.fract() == 0.0).then_some(v as u32);
    Some((dim(w)?, dim(h)?))
}

/// Color frame size `(width, height)` when the blob carries one.
pub fn extract_frame_size(calib: &Value) -> Option<(u32, u32)> {
    let obj = calib.as_object()?;
    ["color_intrinsics", "color"]
        .iter()
        .find_map(|k| size_in(obj.get(*k)?.as_object()?))
        .or_else(|| size_in(obj))
}

/// Everything the capture path needs from the calibration and status blobs.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureCalibration {
    pub depth_intrinsics: Option<CameraIntrinsics>,
    pub color_intrinsics: Option<CameraIntrinsics>,
    pub extrinsics: Option<CameraExtrinsics>,
    pub depth_scale: f64,
    pub frame_size: Option<(u32, u32)>,
}

impl CaptureCalibration {
    pub fn from_blobs(calib: &Value, status: Option<&Value>) -> Self {
        let found = Self {
            depth_intrinsics: extract_intrinsics(calib).or_else(|| status.and_then(extract_intrinsics)),
            color_intrinsics: extract_color_intrinsics(calib),
            extrinsics: extract_extrinsics(calib).or_else(|| status.and_then(extract_extrinsics)),
            depth_scale: extract_depth_scale(calib, status),
            frame_size: extract_frame_size(calib),
        };
        tracing::debug!(
            depth_k = found.depth_intrinsics.is_some(),
            color_k = found.color_intrinsics.is_some(),
            extrinsics = found.extrinsics.is_some(),
            depth_scale = found.depth_scale,
            "Calibration extracted"
        );
        found
    }

    /// Intrinsics to report as `cam_K`: color when the depth was aligned to color, depth otherwise.
    pub fn camera_intrinsics(&self, aligned_to_color: bool) -> Option<CameraIntrinsics> {
        if aligned_to_color {
            self.color_intrinsics
        } else {
            self.depth_intrinsics
        }
    }

    /// Whether every input of depth-to-color alignment is present.
    pub fn can_align(&self) -> bool {
        self.depth_intrinsics.is_some() && self.color_intrinsics.is_some() && self.extrinsics.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_matrix_key_wins() {
        let calib = json!({
            "camera_matrix": [[600.0, 0.0, 320.0], [0.0, 601.0, 240.0], [0.0, 0.0, 1.0]],
            "depth_intrinsics": {"fx": 1.0, "fy": 1.0, "cx": 0.0, "cy": 0.0}
        });
        let k = extract_intrinsics(&calib).unwrap();
        assert_eq!((k.fx, k.fy, k.cx, k.cy), (600.0, 601.0, 320.0, 240.0));
    }

    #[test]
    fn test_matrix_data_object() {
        let calib = json!({"K": {"rows": 3, "data": [500.0, 0.0, 10.0, 0.0, 500.0, 20.0, 0.0, 0.0, 1.0]}});
        assert_eq!(extract_intrinsics(&calib).unwrap().cy, 20.0);
    }

    #[test]
    fn test_section_fields_with_ppx() {
        let calib = json!({"depth": {"fx": 400.0, "fy": 410.0, "ppx": 300.5, "ppy": 200.5}});
        let k = extract_intrinsics(&calib).unwrap();
        assert_eq!(k.cx, 300.5);
        assert_eq!(k.cy, 200.5);
    }

    #[test]
    fn test_nested_section_recursion() {
        let calib = json!({"camera": {"left": {"K": [1.0, 0.0, 2.0, 0.0, 3.0, 4.0, 0.0, 0.0, 1.0]}}});
        assert_eq!(extract_intrinsics(&calib).unwrap().fy, 3.0);
    }

    #[test]
    fn test_top_level_fields_and_missing() {
        assert!(extract_intrinsics(&json!({"fx": 1.0, "fy": 1.0, "cx": 0.0, "cy": 0.0})).is_some());
        assert!(extract_intrinsics(&json!({"fx": 1.0})).is_none());
        assert!(extract_intrinsics(&json!([1, 2, 3])).is_none());
    }

    #[test]
    fn test_color_intrinsics_only_from_color_section() {
        let calib = json!({
            "K": [1.0, 0.0, 2.0, 0.0, 3.0, 4.0, 0.0, 0.0, 1.0],
            "color_intrinsics": {"fx": 900.0, "fy": 900.0, "ppx": 640.0, "ppy": 360.0, "width": 1280, "height": 720}
        });
        assert_eq!(extract_color_intrinsics(&calib).unwrap().fx, 900.0);
        assert!(extract_color_intrinsics(&json!({"K": [1.0, 0.0, 2.0, 0.0, 3.0, 4.0, 0.0, 0.0, 1.0]})).is_none());
        assert_eq!(extract_frame_size(&calib), Some((1280, 720)));
    }

    #[test]
    fn test_frame_size_rejects_unrepresentable_dims() {
        assert_eq!(extract_frame_size(&json!({"width": 1e12, "height": 480})), None);
        assert_eq!(extract_frame_size(&json!({"width": 640.5, "height": 480})), None);
        assert_eq!(extract_frame_size(&json!({"width": 0, "height": 480})), None);
        assert_eq!(extract_frame_size(&json!({"w": 640, "h": 480})), Some((640, 480)));
    }

    #[test]
    fn test_depth_scale_variants() {
        assert_eq!(extract_depth_scale(&json!({"depth_scale": 0.5}), None), 0.5);
        assert_eq!(extract_depth_scale(&json!({"depthUnit": "m"}), None), 1000.0);
        assert_eq!(extract_depth_scale(&json!({"depth_unit": "Millimeter"}), None), 1.0);
        assert_eq!(extract_depth_scale(&json!({}), Some(&json!({"depthScale": 2.0}))), 2.0);
        assert_eq!(extract_depth_scale(&json!({"depth_unit": "furlong"}), None), 1.0);
    }

    #[test]
    fn test_extrinsics_forms() {
        let parts = json!({"T_depth_to_color": {
            "R": [[1, 0, 0], [0, 1, 0], [0, 0, 1]],
            "t": [0.015, 0.0, 0.0]
        }});
        assert_eq!(extract_extrinsics(&parts).unwrap().translation[0], 0.015);

        let matrix = json!({"extrinsics": {"depth2color": {"matrix": [
            1, 0, 0, 0.02,
            0, 1, 0, 0,
            0, 0, 1, 0,
            0, 0, 0, 1
        ]}}});
        assert_eq!(extract_extrinsics(&matrix).unwrap().translation[0], 0.02);

        let raw = json!({"T_dc": [1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0.1, 0, 0, 0, 1]});
        assert_eq!(extract_extrinsics(&raw).unwrap().translation[2], 0.1);

        assert!(extract_extrinsics(&json!({"T_dc": [1, 2, 3]})).is_none());
    }

    #[test]
    fn test_capture_calibration_cam_k_choice() {
        let calib = json!({
            "depth_intrinsics": {"fx": 400.0, "fy": 400.0, "cx": 320.0, "cy": 240.0},
            "color_intrinsics": {"fx": 600.0, "fy": 600.0, "cx": 640.0, "cy": 360.0}
        });
        let cal = CaptureCalibration::from_blobs(&calib, None);
        assert_eq!(cal.camera_intrinsics(true).unwrap().fx, 600.0);
        assert_eq!(cal.camera_intrinsics(false).unwrap().fx, 400.0);
        assert_eq!(cal.depth_scale, 1.0);
        assert!(cal.extrinsics.is_none());
        assert!(!cal.can_align());
    }
}
