//! Depth-to-color reprojection with z-buffering.
//!
//! Every valid source depth pixel is back-projected with the depth camera's
//! intrinsics, moved into the color camera frame by the rigid extrinsics and
//! projected onto the color camera's pixel grid. When several source points
//! land on one target pixel the nearest one wins. Target pixels nobody lands
//! on stay 0 (no data).

use common::{CameraExtrinsics, CameraIntrinsics, CameraModel};
use ndarray::Array2;

/// Depth units per metre of extrinsic translation (millimetre depth by default).
pub const DEFAULT_UNITS_PER_METER: f64 = 1000.0;

/// Largest target grid [`FrameAligner::align_or_passthrough`] will allocate.
pub const MAX_TARGET_PIXELS: usize = 64 * 1024 * 1024;

/// Why alignment was not performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingExtrinsics,
    MissingSourceIntrinsics,
    MissingTargetCamera,
    TargetTooLarge,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingExtrinsics => "missing depth-to-color extrinsics",
            Self::MissingSourceIntrinsics => "missing depth intrinsics",
            Self::MissingTargetCamera => "missing color intrinsics",
            Self::TargetTooLarge => "color frame size out of range",
        }
    }
}

/// Result of [`FrameAligner::align_or_passthrough`].
#[derive(Debug, Clone, PartialEq)]
pub enum Alignment {
    Aligned(Array2<u16>),
    Passthrough { depth: Array2<u16>, reason: SkipReason },
}

impl Alignment {
    pub fn into_depth(self) -> Array2<u16> {
        match self {
            Self::Aligned(depth) | Self::Passthrough { depth, .. } => depth,
        }
    }

    pub fn is_aligned(&self) -> bool {
        matches!(self, Self::Aligned(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameAligner {
    units_per_meter: f64,
}

impl Default for FrameAligner {
    fn default() -> Self {
        Self {
            units_per_meter: DEFAULT_UNITS_PER_METER,
        }
    }
}

impl FrameAligner {
    pub fn new(units_per_meter: f64) -> Self {
        Self { units_per_meter }
    }

    /// Reprojects `depth` (source grid, `[row, col]`) into `target`'s grid.
    ///
    /// Allocates the full target grid; callers with untrusted sizes go through
    /// [`align_or_passthrough`](Self::align_or_passthrough).
    pub fn align(
        &self,
        depth: &Array2<u16>,
        source: &CameraIntrinsics,
        target: &CameraModel,
        extrinsics: &CameraExtrinsics,
    ) -> Array2<u16> {
        let (tw, th) = (target.width as usize, target.height as usize);
        let k = &target.intrinsics;
        let mut zbuf = Array2::<f64>::from_elem((th, tw), f64::INFINITY);

        for ((v, u), &raw) in depth.indexed_iter() {
            if raw == 0 {
                continue;
            }
            let z = f64::from(raw);
            let p = [
                (u as f64 - source.cx) / source.fx * z,
                (v as f64 - source.cy) / source.fy * z,
                z,
            ];
            let [x, y, zb] = extrinsics.apply(p, self.units_per_meter);
            if !(zb > 0.0) {
                continue;
            }

            let ub = (k.fx * (x / zb) + k.cx).round_ties_even();
            let vb = (k.fy * (y / zb) + k.cy).round_ties_even();
            if !(ub >= 0.0 && vb >= 0.0 && ub < tw as f64 && vb < th as f64) {
                continue;
            }

            let cell = &mut zbuf[[vb as usize, ub as usize]];
            if zb < *cell {
                *cell = zb;
            }
        }

        zbuf.mapv(|z| {
            if z.is_finite() {
                z.round_ties_even().clamp(0.0, f64::from(u16::MAX)) as u16
            } else {
                0
            }
        })
    }

    /// Aligns when every input is present, otherwise hands back the source depth unchanged.
    pub fn align_or_passthrough(
        &self,
        depth: Array2<u16>,
        source: Option<&CameraIntrinsics>,
        target: Option<&CameraModel>,
        extrinsics: Option<&CameraExtrinsics>,
    ) -> Alignment {
        let reason = match (source, target, extrinsics) {
            (Some(_), Some(target), Some(_)) if !target_fits(target) => SkipReason::TargetTooLarge,
            (Some(source), Some(target), Some(extrinsics)) => {
                return Alignment::Aligned(self.align(&depth, source, target, extrinsics));
            }
            (_, _, None) => SkipReason::MissingExtrinsics,
            (None, _, _) => SkipReason::MissingSourceIntrinsics,
            (_, None, _) => SkipReason::MissingTargetCamera,
        };
        tracing::info!(reason = reason.as_str(), "Depth alignment skipped, using source depth");
        Alignment::Passthrough { depth, reason }
    }
}

fn target_fits(target: &CameraModel) -> bool {
    (target.width as usize)
        .checked_mul(target.height as usize)
        .is_some_and(|px| px <= MAX_TARGET_PIXELS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics::new(500.0, 500.0, 3.5, 2.5)
    }

    fn model(w: u32, h: u32) -> CameraModel {
        CameraModel::new(intrinsics(), w, h)
    }

    #[test]
    fn test_identity_is_exact() {
        let depth = Array2::from_shape_fn((6, 8), |(v, u)| ((v * 8 + u) as u16 + 1) * 37);
        let out = FrameAligner::default().align(&depth, &intrinsics(), &model(8, 6), &CameraExtrinsics::identity());
        assert_eq!(out, depth);
    }

    #[test]
    fn test_zbuffer_keeps_nearest() {
        // Two source pixels collapse onto the target centre because the target
        // focal length is tiny; the nearer one must win.
        let mut depth = Array2::<u16>::zeros((1, 2));
        depth[[0, 0]] = 900;
        depth[[0, 1]] = 400;
        let source = CameraIntrinsics::new(500.0, 500.0, 0.5, 0.0);
        let target = CameraModel::new(CameraIntrinsics::new(0.001, 0.001, 0.0, 0.0), 1, 1);

        let out = FrameAligner::default().align(&depth, &source, &target, &CameraExtrinsics::identity());
        assert_eq!(out[[0, 0]], 400);
    }

    #[test]
    fn test_translation_shifts_pixels() {
        // 1 m depth, 1 cm baseline along x with fx=500 gives a 5 px shift.
        let mut depth = Array2::<u16>::zeros((5, 20));
        depth[[2, 5]] = 1000;
        let k = CameraIntrinsics::new(500.0, 500.0, 10.0, 2.0);
        let ext = CameraExtrinsics::from_parts(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0], &[0.01, 0.0, 0.0]).unwrap();

        let out = FrameAligner::default().align(&depth, &k, &CameraModel::new(k, 20, 5), &ext);
        assert_eq!(out[[2, 10]], 1000);
        assert_eq!(out.iter().filter(|&&z| z > 0).count(), 1);
    }

    #[test]
    fn test_out_of_bounds_and_behind_camera_discarded() {
        let depth = Array2::<u16>::from_elem((4, 4), 1000);
        let flip = CameraExtrinsics::from_parts(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0], &[0.0; 3]).unwrap();
        let out = FrameAligner::default().align(&depth, &intrinsics(), &model(4, 4), &flip);
        assert!(out.iter().all(|&z| z == 0));
    }

    #[test]
    fn test_target_resolution_used() {
        let depth = Array2::<u16>::from_elem((4, 4), 500);
        let out = FrameAligner::default().align(&depth, &intrinsics(), &model(10, 3), &CameraExtrinsics::identity());
        assert_eq!(out.dim(), (3, 10));
    }

    #[test]
    fn test_passthrough_without_extrinsics() {
        let depth = Array2::<u16>::from_elem((2, 2), 7);
        let result = FrameAligner::default().align_or_passthrough(depth.clone(), Some(&intrinsics()), Some(&model(2, 2)), None);
        assert!(!result.is_aligned());
        assert!(matches!(result, Alignment::Passthrough { reason: SkipReason::MissingExtrinsics, .. }));
        assert_eq!(result.into_depth(), depth);
    }

    #[test]
    fn test_passthrough_without_target() {
        let depth = Array2::<u16>::zeros((2, 2));
        let ext = CameraExtrinsics::identity();
        let result = FrameAligner::default().align_or_passthrough(depth, Some(&intrinsics()), None, Some(&ext));
        assert!(matches!(result, Alignment::Passthrough { reason: SkipReason::MissingTargetCamera, .. }));
    }

    #[test]
    fn test_passthrough_when_target_grid_too_large() {
        let depth = Array2::<u16>::from_elem((2, 2), 7);
        let ext = CameraExtrinsics::identity();
        let huge = model(u32::MAX, u32::MAX);
        let result = FrameAligner::default().align_or_passthrough(depth.clone(), Some(&intrinsics()), Some(&huge), Some(&ext));
        assert!(matches!(result, Alignment::Passthrough { reason: SkipReason::TargetTooLarge, .. }));
        assert_eq!(result.into_depth(), depth);
    }

    proptest! {
        #[test]
        fn prop_zero_depth_never_contributes(
            tx in -0.05f64..0.05,
            ty in -0.05f64..0.05,
            mask in proptest::collection::vec(any::<bool>(), 48),
        ) {
            // Only pixels flagged in `mask` carry depth; an all-false mask must yield an empty image
            let depth = Array2::from_shape_fn((6, 8), |(v, u)| if mask[v * 8 + u] { 800 } else { 0 });
            let ext = CameraExtrinsics::from_parts(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0], &[tx, ty, 0.0]).unwrap();
            let out = FrameAligner::default().align(&depth, &intrinsics(), &model(8, 6), &ext);

            let src_valid = depth.iter().filter(|&&z| z > 0).count();
            let dst_valid = out.iter().filter(|&&z| z > 0).count();
            prop_assert!(dst_valid <= src_valid);
            if src_valid == 0 {
                prop_assert_eq!(dst_valid, 0);
            }
        }

        #[test]
        fn prop_identity_roundtrip(values in proptest::collection::vec(0u16..=u16::MAX, 24)) {
            let depth = Array2::from_shape_vec((4, 6), values).unwrap();
            let out = FrameAligner::default().align(&depth, &intrinsics(), &model(6, 4), &CameraExtrinsics::identity());
            prop_assert_eq!(out, depth);
        }
    }
}
