//! Row-major run-length encoding of binary masks.
//!
//! Runs alternate background/foreground and always start with a background
//! run, which may be 0. The runs of a mask sum to `height * width`.

use common::{BBox, RleCounts, RleMask};
use ndarray::Array2;

/// Encodes a mask; any non-zero cell is foreground.
///
/// Runs are row-major and uncompressed. COCO / pycocotools RLE is column-major
/// and usually carries LEB128-style compressed counts, so masks bound for COCO
/// tooling must be transposed (`mask.t()`) before encoding and compressed by
/// the consumer. Compressed counts received from such tools are kept as
/// [`RleCounts::Compressed`] and not decoded here.
pub fn encode(mask: &Array2<u8>) -> RleMask {
    let (height, width) = mask.dim();
    let mut runs = Vec::new();
    let mut current = false;
    let mut length = 0u32;

    // `iter()` walks a standard-layout array in row-major order
    for &cell in mask.iter() {
        let fg = cell != 0;
        if fg != current {
            runs.push(length);
            current = fg;
            length = 0;
        }
        length += 1;
    }
    runs.push(length);

    RleMask::from_runs(height as u32, width as u32, runs)
}

/// Decodes explicit runs back into a mask. Compressed or inconsistent counts yield `None`.
pub fn decode(rle: &RleMask) -> Option<Array2<u8>> {
    let RleCounts::Runs(runs) = &rle.counts else {
        return None;
    };
    if !rle.is_consistent() {
        return None;
    }

    let mut cells = Vec::with_capacity(rle.pixel_count() as usize);
    for (i, &run) in runs.iter().enumerate() {
        let value = (i % 2) as u8;
        cells.extend(std::iter::repeat(value).take(run as usize));
    }
    Array2::from_shape_vec((rle.height as usize, rle.width as usize), cells).ok()
}

/// Rasterizes a bbox as a filled rectangle on a `height x width` canvas.
///
/// Corners are floored/ceiled and clamped to the canvas, keeping at least one
/// pixel in each direction. Boxes that are non-finite, inverted, empty or
/// entirely off-canvas return `None`.
pub fn rasterize_bbox(bbox: &BBox, height: u32, width: u32) -> Option<Array2<u8>> {
    if height == 0 || width == 0 || bbox.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let [x1, y1, x2, y2] = *bbox;
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    let (w, h) = (f64::from(width), f64::from(height));
    if x2 <= 0.0 || y2 <= 0.0 || x1 >= w || y1 >= h {
        return None;
    }

    let c0 = (x1.floor().max(0.0) as usize).min(width as usize - 1);
    let r0 = (y1.floor().max(0.0) as usize).min(height as usize - 1);
    let c1 = (x2.ceil().min(w) as usize).max(c0 + 1);
    let r1 = (y2.ceil().min(h) as usize).max(r0 + 1);

    let mut mask = Array2::<u8>::zeros((height as usize, width as usize));
    mask.slice_mut(ndarray::s![r0..r1, c0..c1]).fill(1);
    Some(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_starts_with_background() {
        let mask = ndarray::arr2(&[[1u8, 1, 0], [0, 1, 1]]);
        let rle = encode(&mask);
        assert_eq!(rle.counts, RleCounts::Runs(vec![0, 2, 2, 2]));
        assert_eq!((rle.height, rle.width), (2, 3));
    }

    #[test]
    fn test_transposed_encode_gives_column_major_runs() {
        let mask = ndarray::arr2(&[[1u8, 0], [1, 0]]);
        assert_eq!(encode(&mask).counts, RleCounts::Runs(vec![0, 1, 1, 1, 1]));
        assert_eq!(encode(&mask.t().to_owned()).counts, RleCounts::Runs(vec![0, 2, 2]));
    }

    #[test]
    fn test_encode_empty_mask() {
        let rle = encode(&Array2::<u8>::zeros((3, 4)));
        assert_eq!(rle.counts, RleCounts::Runs(vec![12]));
        assert_eq!(rle.area(), Some(0));
    }

    #[test]
    fn test_rasterize_bbox_floor_ceil() {
        let mask = rasterize_bbox(&[1.4, 0.6, 2.2, 1.1], 4, 5).unwrap();
        // columns 1..3, rows 0..2
        assert_eq!(mask.sum(), 4);
        assert_eq!(mask[[0, 1]], 1);
        assert_eq!(mask[[1, 2]], 1);
        assert_eq!(mask[[2, 1]], 0);
    }

    #[test]
    fn test_rasterize_bbox_clamps() {
        let mask = rasterize_bbox(&[-10.0, -10.0, 100.0, 100.0], 3, 3).unwrap();
        assert_eq!(mask.sum(), 9);
    }

    #[test]
    fn test_rasterize_degenerate() {
        assert!(rasterize_bbox(&[0.0, 0.0, 0.0, 0.0], 4, 4).is_none());
        assert!(rasterize_bbox(&[3.0, 1.0, 2.0, 2.0], 4, 4).is_none());
        assert!(rasterize_bbox(&[5.0, 5.0, 9.0, 9.0], 4, 4).is_none());
        assert!(rasterize_bbox(&[0.0, 0.0, f64::NAN, 2.0], 4, 4).is_none());
        assert!(rasterize_bbox(&[0.0, 0.0, 2.0, 2.0], 0, 4).is_none());
    }

    #[test]
    fn test_decode_rejects_compressed() {
        let rle = RleMask {
            height: 1,
            width: 1,
            counts: RleCounts::Compressed("1".into()),
        };
        assert!(decode(&rle).is_none());
    }

    proptest! {
        #[test]
        fn prop_runs_cover_grid(h in 1usize..12, w in 1usize..12, seed in proptest::collection::vec(any::<bool>(), 144)) {
            let mask = Array2::from_shape_fn((h, w), |(r, c)| seed[r * 12 + c] as u8);
            let rle = encode(&mask);
            prop_assert!(rle.is_consistent());
            prop_assert_eq!(rle.area(), Some(mask.iter().filter(|&&v| v != 0).count() as u64));
            prop_assert_eq!(decode(&rle), Some(mask));
        }
    }
}
