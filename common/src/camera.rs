//! Camera geometry: pinhole intrinsics, rigid extrinsics and the `cam_params`
//! blob forwarded to the remote services.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Pinhole intrinsics (focal lengths and principal point, in pixels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Builds intrinsics from a row-major 3x3 `K` matrix.
    pub fn from_matrix(k: &[f64]) -> Option<Self> {
        if k.len() != 9 {
            return None;
        }
        let intrinsics = Self::new(k[0], k[4], k[2], k[5]);
        intrinsics.is_valid().then_some(intrinsics)
    }

    /// Row-major 3x3 `K` matrix.
    pub fn to_matrix(&self) -> [f64; 9] {
        [self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0]
    }

    /// Focal lengths must be positive and every parameter finite.
    pub fn is_valid(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy].iter().all(|v| v.is_finite())
            && self.fx > 0.0
            && self.fy > 0.0
    }
}

/// Intrinsics paired with the image size they were calibrated for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: CameraIntrinsics,
    pub width: u32,
    pub height: u32,
}

impl CameraModel {
    pub fn new(intrinsics: CameraIntrinsics, width: u32, height: u32) -> Self {
        Self { intrinsics, width, height }
    }
}

/// Rigid transform mapping points from the depth sensor frame into the color
/// sensor frame. Translation is in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraExtrinsics {
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
}

impl CameraExtrinsics {
    pub fn identity() -> Self {
        Self {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0; 3],
        }
    }

    /// Builds a transform from a row-major 9-element rotation and a 3-element translation.
    pub fn from_parts(rotation: &[f64], translation: &[f64]) -> Option<Self> {
        if rotation.len() != 9 || translation.len() != 3 {
            return None;
        }
        if rotation.iter().chain(translation).any(|v| !v.is_finite()) {
            return None;
        }
        let mut r = [[0.0; 3]; 3];
        for (i, row) in r.iter_mut().enumerate() {
            row.copy_from_slice(&rotation[i * 3..i * 3 + 3]);
        }
        Some(Self {
            rotation: r,
            translation: [translation[0], translation[1], translation[2]],
        })
    }

    /// Builds a transform from a row-major 4x4 homogeneous matrix.
    pub fn from_homogeneous(m: &[f64]) -> Option<Self> {
        if m.len() != 16 {
            return None;
        }
        let rotation = [m[0], m[1], m[2], m[4], m[5], m[6], m[8], m[9], m[10]];
        Self::from_parts(&rotation, &[m[3], m[7], m[11]])
    }

    /// `R·p + t` with `t` scaled by `translation_scale` (e.g. metres to millimetres).
    pub fn apply(&self, p: [f64; 3], translation_scale: f64) -> [f64; 3] {
        let r = &self.rotation;
        let t = &self.translation;
        [
            r[0][0] * p[0] + r[0][1] * p[1] + r[0][2] * p[2] + t[0] * translation_scale,
            r[1][0] * p[0] + r[1][1] * p[1] + r[1][2] * p[2] + t[1] * translation_scale,
            r[2][0] * p[0] + r[2][1] * p[1] + r[2][2] * p[2] + t[2] * translation_scale,
        ]
    }
}

fn default_depth_scale() -> f64 {
    1.0
}

/// Camera parameters as exchanged with the segmentation and pose services.
///
/// `cam_K` may arrive flat (9 numbers) or nested (3x3); it is stored flat.
/// Unknown keys are preserved and forwarded untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
    #[serde(rename = "cam_K", alias = "K", alias = "camK", deserialize_with = "deserialize_matrix")]
    pub cam_k: Vec<f64>,

    #[serde(default = "default_depth_scale", alias = "depthScale")]
    pub depth_scale: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CameraParams {
    pub fn new(intrinsics: &CameraIntrinsics, depth_scale: f64) -> Self {
        Self {
            cam_k: intrinsics.to_matrix().to_vec(),
            depth_scale,
            width: None,
            height: None,
            extra: Map::new(),
        }
    }

    pub fn intrinsics(&self) -> Option<CameraIntrinsics> {
        CameraIntrinsics::from_matrix(&self.cam_k)
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }
}

fn deserialize_matrix<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Matrix {
        Flat(Vec<f64>),
        Nested(Vec<Vec<f64>>),
    }

    Ok(match Matrix::deserialize(deserializer)? {
        Matrix::Flat(values) => values,
        Matrix::Nested(rows) => rows.into_iter().flatten().collect(),
    })
}
