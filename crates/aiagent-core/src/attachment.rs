//! Image attachment loading
//!
//! Turns a file on disk or raw bytes (a captured frame, a pasted image) into an
//! [`ImagePayload`] the providers can send inline:
//! - PNG and JPEG within the size limit pass through untouched
//! - anything else is decoded, shrunk to fit, and re-encoded

use std::io::Cursor;
use std::path::Path;

use image::{imageops::FilterType, DynamicImage, ImageFormat, ImageReader};
use thiserror::Error;

use crate::state::ImagePayload;

/// Longest edge, in pixels, of an image sent to a model
pub const MAX_IMAGE_DIMENSION: u32 = 1024;

/// Supported image extensions (lowercase)
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tiff", "tif"];

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("could not read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported or corrupt image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Check if a file path points to a supported image format
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Load an attachment from a file
pub fn load_from_path(path: &Path) -> Result<ImagePayload, ImageError> {
    let data = std::fs::read(path)?;
    tracing::debug!(path = %path.display(), bytes = data.len(), "loaded image file");
    load_from_bytes(&data)
}

/// Load an attachment from encoded image bytes
pub fn load_from_bytes(data: &[u8]) -> Result<ImagePayload, ImageError> {
    let reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
    let format = reader.format();
    let img = reader.decode()?;
    let (width, height) = (img.width(), img.height());

    let fits = width <= MAX_IMAGE_DIMENSION && height <= MAX_IMAGE_DIMENSION;
    match format {
        Some(ImageFormat::Png) if fits => return Ok(ImagePayload::new(data.to_vec(), "image/png", width, height)),
        Some(ImageFormat::Jpeg) if fits => {
            return Ok(ImagePayload::new(data.to_vec(), "image/jpeg", width, height))
        }
        _ => {}
    }

    let img = resize_to_fit(img, MAX_IMAGE_DIMENSION);
    encode(&img)
}

/// Resize image if either dimension exceeds max_pixels, keeping aspect ratio
fn resize_to_fit(img: DynamicImage, max_pixels: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());

    if w <= max_pixels && h <= max_pixels {
        return img;
    }

    let ratio = (max_pixels as f64) / (w.max(h) as f64);
    let new_w = ((w as f64) * ratio).round().max(1.0) as u32;
    let new_h = ((h as f64) * ratio).round().max(1.0) as u32;

    img.resize_exact(new_w, new_h, FilterType::Lanczos3)
}

/// PNG when transparency matters, JPEG otherwise
fn encode(img: &DynamicImage) -> Result<ImagePayload, ImageError> {
    let mut buffer = Vec::new();
    let mime_type = if img.color().has_alpha() {
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        "image/png"
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)?;
        "image/jpeg"
    };

    Ok(ImagePayload::new(buffer, mime_type, img.width(), img.height()))
}
