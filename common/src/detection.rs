//! Canonical detections and their run-length encoded masks.

use serde::{Deserialize, Serialize};

/// Axis-aligned box `[x1, y1, x2, y2]` in pixel coordinates.
pub type BBox = [f64; 4];

/// Run counts of an RLE mask.
///
/// `Runs` is an explicit list of alternating background/foreground run
/// lengths starting with background. `Compressed` is an opaque COCO string
/// forwarded as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RleCounts {
    Runs(Vec<u32>),
    Compressed(String),
}

/// Run-length encoded binary mask over a row-major `height x width` grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RleWire", into = "RleWire")]
pub struct RleMask {
    pub height: u32,
    pub width: u32,
    pub counts: RleCounts,
}

#[derive(Serialize, Deserialize)]
struct RleWire {
    size: [u32; 2],
    counts: RleCounts,
}

impl From<RleWire> for RleMask {
    fn from(wire: RleWire) -> Self {
        Self {
            height: wire.size[0],
            width: wire.size[1],
            counts: wire.counts,
        }
    }
}

impl From<RleMask> for RleWire {
    fn from(mask: RleMask) -> Self {
        Self {
            size: [mask.height, mask.width],
            counts: mask.counts,
        }
    }
}

impl RleMask {
    pub fn from_runs(height: u32, width: u32, runs: Vec<u32>) -> Self {
        Self {
            height,
            width,
            counts: RleCounts::Runs(runs),
        }
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.height) * u64::from(self.width)
    }

    /// Number of foreground pixels, when the counts are explicit.
    pub fn area(&self) -> Option<u64> {
        match &self.counts {
            RleCounts::Runs(runs) => Some(runs.iter().skip(1).step_by(2).map(|&r| u64::from(r)).sum()),
            RleCounts::Compressed(_) => None,
        }
    }

    /// Explicit runs must cover the grid exactly; compressed counts cannot be checked.
    pub fn is_consistent(&self) -> bool {
        match &self.counts {
            RleCounts::Runs(runs) => runs.iter().map(|&r| u64::from(r)).sum::<u64>() == self.pixel_count(),
            RleCounts::Compressed(s) => !s.is_empty(),
        }
    }
}

/// A detection ready to be handed to the pose estimation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub scene_id: u32,
    #[serde(default)]
    pub image_id: u32,
    #[serde(alias = "categoryId")]
    pub category_id: i64,
    pub bbox: BBox,
    pub score: f64,
    #[serde(alias = "mask")]
    pub segmentation: RleMask,
}

impl Detection {
    pub fn new(category_id: i64, bbox: BBox, score: f64, segmentation: RleMask) -> Self {
        Self {
            scene_id: 0,
            image_id: 0,
            category_id,
            bbox,
            score,
            segmentation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rle_wire_shape() {
        let mask = RleMask::from_runs(2, 3, vec![1, 4, 1]);
        let value = serde_json::to_value(&mask).unwrap();
        assert_eq!(value["size"], serde_json::json!([2, 3]));
        assert_eq!(value["counts"], serde_json::json!([1, 4, 1]));

        let back: RleMask = serde_json::from_value(value).unwrap();
        assert_eq!(back, mask);
    }

    #[test]
    fn test_rle_compressed_counts_pass_through() {
        let mask: RleMask =
            serde_json::from_str(r#"{"size": [480, 640], "counts": "PPa0"}"#).unwrap();
        assert_eq!(mask.counts, RleCounts::Compressed("PPa0".to_string()));
        assert!(mask.area().is_none());
        assert!(mask.is_consistent());
    }

    #[test]
    fn test_rle_consistency_and_area() {
        let good = RleMask::from_runs(2, 2, vec![0, 3, 1]);
        assert!(good.is_consistent());
        assert_eq!(good.area(), Some(3));

        let bad = RleMask::from_runs(2, 2, vec![1, 1]);
        assert!(!bad.is_consistent());
    }

    #[test]
    fn test_detection_wire_format() {
        let det = Detection::new(1, [0.0, 0.0, 2.0, 2.0], 0.9, RleMask::from_runs(2, 2, vec![0, 4]));
        let value = serde_json::to_value(&det).unwrap();
        assert_eq!(value["scene_id"], 0);
        assert_eq!(value["image_id"], 0);
        assert_eq!(value["category_id"], 1);
        assert_eq!(value["segmentation"]["size"], serde_json::json!([2, 2]));
    }
}
