//! Turning one capture-service frame into pipeline inputs.

use common::{CameraModel, CameraParams};
use estimation_remote::CameraClient;
use estimation_vision::{image_io, CaptureCalibration, FrameAligner};

use crate::error::{PipelineError, Result};

/// Base64 images and camera parameters ready for [`PipelineRequest`](crate::PipelineRequest).
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub rgb_image: String,
    pub depth_image: String,
    pub cam_params: CameraParams,
    pub width: u32,
    pub height: u32,
    pub aligned: bool,
}

/// Fetches calibration, status and both raw streams, then encodes them.
///
/// The depth frame is reprojected onto the color grid when `align_color` is set
/// and the calibration carries both intrinsics and the extrinsics; otherwise it
/// is used as captured. `cam_K` follows whichever grid the depth ends up on.
pub async fn capture_frame(camera: &CameraClient, align_color: bool, aligner: &FrameAligner) -> Result<CapturedFrame> {
    let calib = camera.calibration().await?;
    let status = match camera.status().await {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!(error = %e, "Camera status unavailable, using calibration only");
            None
        }
    };
    let calibration = CaptureCalibration::from_blobs(&calib, status.as_ref());

    let will_align = align_color && calibration.can_align();
    if calibration.camera_intrinsics(will_align).is_none() {
        return Err(PipelineError::Capture(
            "Failed to infer camera intrinsics from calibration/status".to_string(),
        ));
    }

    let (width, height) = match calibration.frame_size {
        Some(size) => size,
        None => {
            let jpeg = camera.color_jpeg().await?;
            image_io::image_dimensions(&jpeg)?
        }
    };
    tracing::info!(width, height, align_color, will_align, "Capturing frame");

    let color_raw = camera.color_raw().await?;
    let rgb_png = image_io::bgr_to_rgb_png(&color_raw, width, height)?;

    let depth_raw = camera.depth_raw().await?;
    let depth = image_io::depth_from_le_bytes(&depth_raw, width, height)?;

    let target = calibration
        .color_intrinsics
        .map(|k| CameraModel::new(k, width, height));
    let (depth, aligned) = if align_color {
        let alignment = aligner.align_or_passthrough(
            depth,
            calibration.depth_intrinsics.as_ref(),
            target.as_ref(),
            calibration.extrinsics.as_ref(),
        );
        let aligned = alignment.is_aligned();
        (alignment.into_depth(), aligned)
    } else {
        (depth, false)
    };
    let depth_png = image_io::depth_to_png(&depth)?;

    let intrinsics = calibration
        .camera_intrinsics(aligned)
        .ok_or_else(|| PipelineError::Capture("camera intrinsics missing after alignment".to_string()))?;
    let mut cam_params = CameraParams::new(&intrinsics, calibration.depth_scale);
    cam_params.width = Some(width);
    cam_params.height = Some(height);

    Ok(CapturedFrame {
        rgb_image: image_io::encode_base64(&rgb_png),
        depth_image: image_io::encode_base64(&depth_png),
        cam_params,
        width,
        height,
        aligned,
    })
}
