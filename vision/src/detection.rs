//! Normalization of segmentation output into pose-service detections.
//!
//! The segmentation service is loose about shapes: detections come either as
//! parallel columns (`masks`, `boxes`, `scores`, `object_ids`) or as a list
//! of objects, and each mask may be an RLE object, a dense 2-D array or
//! missing. [`parse_raw_detections`] resolves all of that once into
//! [`RawDetection`] values with a [`MaskShape`]; [`DetectionAdapter`] then
//! produces canonical, score-sorted, top-K [`Detection`]s that always carry a
//! consistent RLE mask.

use common::{BBox, Detection, RleCounts, RleMask};
use ndarray::Array2;
use serde_json::Value;

use crate::rle;

/// Default number of detections handed to pose estimation.
pub const DEFAULT_TOP_K: usize = 10;

/// Category assigned when the service omits one.
const DEFAULT_CATEGORY: i64 = 1;

/// Mask as it arrived from the segmentation service.
#[derive(Debug, Clone, PartialEq)]
pub enum MaskShape {
    Rle(RleMask),
    Dense(Array2<u8>),
    Absent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub bbox: Option<BBox>,
    pub score: f64,
    pub category_id: i64,
    pub mask: MaskShape,
}

/// Canvas size used to synthesize masks from bounding boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDims {
    pub width: u32,
    pub height: u32,
}

impl ImageDims {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

fn as_bbox(value: &Value) -> Option<BBox> {
    let arr = value.as_array()?;
    if arr.len() < 4 {
        return None;
    }
    let mut bbox = [0.0; 4];
    for (dst, src) in bbox.iter_mut().zip(arr) {
        *dst = src.as_f64()?;
    }
    Some(bbox)
}

fn as_rle(value: &Value) -> Option<RleMask> {
    let obj = value.as_object()?;
    let size = obj.get("size")?.as_array()?;
    let (h, w) = match size.as_slice() {
        [h, w] => (h.as_u64()? as u32, w.as_u64()? as u32),
        _ => return None,
    };
    let counts = match obj.get("counts")? {
        Value::String(s) if !s.is_empty() => RleCounts::Compressed(s.clone()),
        Value::Array(runs) if !runs.is_empty() => RleCounts::Runs(
            runs.iter()
                .map(|r| r.as_u64().map(|v| v as u32))
                .collect::<Option<Vec<_>>>()?,
        ),
        _ => return None,
    };
    Some(RleMask { height: h, width: w, counts })
}

fn as_dense(value: &Value) -> Option<Array2<u8>> {
    let rows = value.as_array()?;
    let width = rows.first()?.as_array()?.len();
    let mut cells = Vec::with_capacity(rows.len() * width);
    for row in rows {
        let row = row.as_array()?;
        if row.len() != width {
            return None;
        }
        for cell in row {
            let on = match cell {
                Value::Bool(b) => *b,
                other => other.as_f64()? > 0.0,
            };
            cells.push(on as u8);
        }
    }
    Array2::from_shape_vec((rows.len(), width), cells).ok()
}

fn as_mask(value: Option<&Value>) -> MaskShape {
    match value {
        None | Some(Value::Null) => MaskShape::Absent,
        Some(v @ Value::Object(_)) => as_rle(v).map(MaskShape::Rle).unwrap_or(MaskShape::Absent),
        Some(v @ Value::Array(_)) => match as_dense(v) {
            Some(dense) => MaskShape::Dense(dense),
            None => {
                tracing::warn!("Dense mask is ragged or non-numeric, ignoring it");
                MaskShape::Absent
            }
        },
        Some(_) => MaskShape::Absent,
    }
}

fn column<'a>(obj: &'a serde_json::Map<String, Value>, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn parse_columnar(obj: &serde_json::Map<String, Value>) -> Vec<RawDetection> {
    let masks = column(obj, &["masks"]);
    let boxes = column(obj, &["boxes", "bboxes"]);
    let scores = column(obj, &["scores"]);
    let ids = column(obj, &["object_ids", "category_ids", "categoryIds", "objectIds"]);
    let n = masks.len().max(boxes.len()).max(scores.len()).max(ids.len());

    (0..n)
        .map(|i| RawDetection {
            bbox: boxes.get(i).and_then(as_bbox),
            score: scores.get(i).and_then(Value::as_f64).unwrap_or(0.0),
            category_id: ids.get(i).and_then(Value::as_i64).unwrap_or(DEFAULT_CATEGORY),
            mask: as_mask(masks.get(i)),
        })
        .collect()
}

fn parse_item(item: &Value) -> Option<RawDetection> {
    let obj = item.as_object()?;
    let category_id = ["category_id", "categoryId", "object_id"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_i64))
        .unwrap_or(DEFAULT_CATEGORY);
    Some(RawDetection {
        bbox: obj.get("bbox").and_then(as_bbox),
        score: obj.get("score").and_then(Value::as_f64).unwrap_or(0.0),
        category_id,
        mask: as_mask(obj.get("segmentation").or_else(|| obj.get("mask"))),
    })
}

/// Accepts a full segmentation response, its `detections` member, a columnar
/// object or a list of detection objects.
pub fn parse_raw_detections(value: &Value) -> Vec<RawDetection> {
    match value {
        Value::Array(items) => items.iter().filter_map(parse_item).collect(),
        Value::Object(obj) => match obj.get("detections") {
            Some(inner) => parse_raw_detections(inner),
            None => parse_columnar(obj),
        },
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DetectionAdapter {
    top_k: usize,
}

impl Default for DetectionAdapter {
    fn default() -> Self {
        Self { top_k: DEFAULT_TOP_K }
    }
}

impl DetectionAdapter {
    pub fn new(top_k: usize) -> Self {
        Self { top_k: top_k.max(1) }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Canonical detections, highest score first, at most `top_k` of them.
    ///
    /// Non-positive or non-finite scores are dropped and scores above 1 are
    /// clamped. Each survivor gets its mask resolved; detections with no
    /// usable mask and no usable bbox (or no known canvas) are dropped.
    pub fn adapt(&self, raw: Vec<RawDetection>, dims: Option<ImageDims>) -> Vec<Detection> {
        let total = raw.len();
        let mut candidates: Vec<RawDetection> = raw
            .into_iter()
            .filter(|d| d.score.is_finite() && d.score > 0.0)
            .map(|mut d| {
                d.score = d.score.min(1.0);
                d
            })
            .collect();
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut out = Vec::with_capacity(self.top_k.min(candidates.len()));
        for det in candidates {
            if out.len() == self.top_k {
                break;
            }
            let Some(mask) = resolve_mask(&det, dims) else {
                continue;
            };
            out.push(Detection::new(
                det.category_id,
                det.bbox.unwrap_or([0.0; 4]),
                det.score,
                mask,
            ));
        }

        tracing::info!(total, forwarded = out.len(), top_k = self.top_k, "Detections adapted for pose estimation");
        out
    }
}

fn resolve_mask(det: &RawDetection, dims: Option<ImageDims>) -> Option<RleMask> {
    match &det.mask {
        MaskShape::Rle(rle) if rle.is_consistent() => return Some(rle.clone()),
        MaskShape::Rle(_) => tracing::warn!(score = det.score, "RLE counts do not cover the mask size, ignoring mask"),
        MaskShape::Dense(dense) if dense.iter().any(|&v| v != 0) => return Some(rle::encode(dense)),
        MaskShape::Dense(_) | MaskShape::Absent => {}
    }

    let Some(bbox) = det.bbox else {
        tracing::warn!(score = det.score, "Detection has neither mask nor bbox, dropping");
        return None;
    };
    let Some(dims) = dims else {
        tracing::warn!(score = det.score, bbox = ?bbox, "Image size unknown, cannot synthesize mask from bbox");
        return None;
    };
    match rle::rasterize_bbox(&bbox, dims.height, dims.width) {
        Some(mask) => Some(rle::encode(&mask)),
        None => {
            tracing::warn!(score = det.score, bbox = ?bbox, "Degenerate bbox and no mask, dropping");
            None
        }
    }
}
