// src/pipeline/crop.rs

//! Face cropping.
//!
//! Converts a normalized bounding box into a clamped pixel rectangle and
//! re-encodes that region of the source image as JPEG.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};

use crate::error::{AppError, Result};
use crate::models::{BoundingBox, PixelBox};

/// Decode uploaded bytes, accepting only JPEG and PNG.
///
/// The EXIF orientation is applied, so pixel coordinates match the upright
/// frame the recognition service reports bounding boxes in.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    let format = image::guess_format(bytes).map_err(AppError::unreadable)?;
    if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
        return Err(AppError::unreadable(format!(
            "unsupported image format {format:?}"
        )));
    }

    let mut decoder = ImageReader::with_format(Cursor::new(bytes), format)
        .into_decoder()
        .map_err(AppError::unreadable)?;
    let orientation = decoder.orientation().unwrap_or_else(|e| {
        log::warn!("Ignoring unreadable orientation metadata: {}", e);
        Orientation::NoTransforms
    });

    let mut image = DynamicImage::from_decoder(decoder).map_err(AppError::unreadable)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Scale a fraction to a pixel coordinate, truncating and clamping to `[0, extent]`.
fn scale(fraction: f32, extent: u32) -> u32 {
    let scaled = (f64::from(fraction) * f64::from(extent)).trunc();
    // NaN casts to 0
    scaled.clamp(0.0, f64::from(extent)) as u32
}

/// Pixel rectangle for a normalized box, clamped to the image bounds.
///
/// Guarantees `left <= right <= width` and `top <= bottom <= height`.
pub fn pixel_box(bbox: &BoundingBox, width: u32, height: u32) -> PixelBox {
    let left = scale(bbox.left, width);
    let top = scale(bbox.top, height);
    let right = scale(bbox.left + bbox.width, width).max(left);
    let bottom = scale(bbox.top + bbox.height, height).max(top);

    PixelBox {
        left,
        top,
        right,
        bottom,
    }
}

/// Crop `region` out of `image` and encode it as JPEG.
pub fn crop_region(image: &DynamicImage, region: &PixelBox, quality: u8) -> Result<Vec<u8>> {
    if region.is_empty() {
        return Err(AppError::crop(format!("empty region {region}")));
    }

    let face = image
        .crop_imm(region.left, region.top, region.width(), region.height())
        .to_rgb8();

    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&face)
        .map_err(|e| AppError::crop(format!("JPEG encode failed: {e}")))?;
    Ok(buf)
}

/// Crop the face described by `bbox` and encode it as JPEG.
pub fn crop(image: &DynamicImage, bbox: &BoundingBox, quality: u8) -> Result<Vec<u8>> {
    let region = pixel_box(bbox, image.width(), image.height());
    crop_region(image, &region, quality)
}
