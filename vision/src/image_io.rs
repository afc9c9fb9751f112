//! Image payload helpers: base64 transport, PNG encoding of raw camera
//! buffers and 16-bit depth maps.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageBuffer, ImageEncoder, ImageFormat, ImageReader, Luma};
use ndarray::Array2;

use crate::error::{Result, VisionError};

/// Decodes a base64 payload, tolerating a `data:<mime>;base64,` prefix and embedded whitespace.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let payload = match data.find(";base64,") {
        Some(idx) if data.starts_with("data:") => &data[idx + ";base64,".len()..],
        _ => data,
    };
    let cleaned: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(STANDARD.decode(cleaned)?)
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// `(width, height)` of an encoded image, read from its header only.
pub fn image_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    Ok(reader.into_dimensions()?)
}

/// Byte length of a `width x height` frame, checked against `raw` before anything is allocated.
fn frame_len(what: &'static str, raw: &[u8], width: u32, height: u32, bytes_per_px: usize) -> Result<usize> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|px| px.checked_mul(bytes_per_px))
        .ok_or_else(|| VisionError::Shape(format!("{} size {}x{} overflows", what, width, height)))?;
    if raw.len() < expected {
        return Err(VisionError::BufferSize {
            what,
            expected,
            actual: raw.len(),
        });
    }
    Ok(expected)
}

/// Encodes a packed BGR8 buffer as an RGB PNG. Trailing bytes beyond `w*h*3` are ignored.
pub fn bgr_to_rgb_png(raw: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = frame_len("color frame", raw, width, height, 3)?;

    let mut rgb = Vec::with_capacity(expected);
    for px in raw[..expected].chunks_exact(3) {
        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
    }

    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(&rgb, width, height, ExtendedColorType::Rgb8)?;
    Ok(out)
}

/// Reads a packed little-endian u16 depth buffer into a `[row, col]` array.
pub fn depth_from_le_bytes(raw: &[u8], width: u32, height: u32) -> Result<Array2<u16>> {
    let expected = frame_len("depth frame", raw, width, height, 2)?;
    let (w, h) = (width as usize, height as usize);

    let values: Vec<u16> = raw[..expected]
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect();
    Array2::from_shape_vec((h, w), values).map_err(|e| VisionError::Shape(e.to_string()))
}

/// Encodes a depth map as a single-channel 16-bit PNG.
pub fn depth_to_png(depth: &Array2<u16>) -> Result<Vec<u8>> {
    let (h, w) = depth.dim();
    let values: Vec<u16> = depth.iter().copied().collect();
    let buffer = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, values)
        .ok_or_else(|| VisionError::Shape(format!("depth buffer does not match {}x{}", w, h)))?;

    let mut out = Vec::new();
    DynamicImage::ImageLuma16(buffer).write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}

/// Decodes any supported image into a 16-bit single-channel depth map.
pub fn decode_depth_png(bytes: &[u8]) -> Result<Array2<u16>> {
    let luma = image::load_from_memory(bytes)?.into_luma16();
    let (w, h) = luma.dimensions();
    Array2::from_shape_vec((h as usize, w as usize), luma.into_raw())
        .map_err(|e| VisionError::Shape(e.to_string()))
}

/// Returns `bytes` unchanged when already PNG, otherwise decodes and re-encodes as PNG
/// (bit depth is kept).
pub fn ensure_png(bytes: &[u8]) -> Result<Vec<u8>> {
    if image::guess_format(bytes)? == ImageFormat::Png {
        return Ok(bytes.to_vec());
    }
    let img = image::load_from_memory(bytes)?;
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}
