//! Image-side processing for the pose pipeline.
//!
//! - [`frame_align`]: depth-to-color reprojection with z-buffering
//! - [`detection`]: segmentation output to canonical, top-K detections
//! - [`rle`]: row-major run-length masks
//! - [`calibration`]: camera geometry from capture calibration blobs
//! - [`image_io`]: base64 payloads and PNG encoding of raw frames

pub mod calibration;
pub mod detection;
pub mod error;
pub mod frame_align;
pub mod image_io;
pub mod rle;

pub use calibration::{
    extract_color_intrinsics, extract_depth_scale, extract_extrinsics, extract_frame_size, extract_intrinsics,
    CaptureCalibration,
};
pub use detection::{parse_raw_detections, DetectionAdapter, ImageDims, MaskShape, RawDetection, DEFAULT_TOP_K};
pub use error::{Result, VisionError};
pub use frame_align::{Alignment, FrameAligner, SkipReason, DEFAULT_UNITS_PER_METER, MAX_TARGET_PIXELS};
