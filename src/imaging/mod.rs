//! Image decode, bounded-box downsampling and JPEG re-encoding
//!
//! Every function here is pure and returns `None` on failure; callers decide
//! whether a failure is fatal (decode) or recoverable (resize and encode).

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

use crate::models::TransformOptions;

pub fn decode(bytes: &[u8]) -> Option<DynamicImage> {
    image::load_from_memory(bytes).ok()
}

/// Scale factor that fits the source inside the box, never above 1.0
pub fn bounded_scale(source_width: u32, source_height: u32, box_width: u32, box_height: u32) -> f64 {
    if source_width == 0 || source_height == 0 {
        return 1.0;
    }
    let width_ratio = box_width as f64 / source_width as f64;
    let height_ratio = box_height as f64 / source_height as f64;
    width_ratio.min(height_ratio).min(1.0)
}

/// Output dimensions for a source under a bounding box
pub fn target_dimensions(source_width: u32, source_height: u32, box_width: u32, box_height: u32) -> (u32, u32) {
    let scale = bounded_scale(source_width, source_height, box_width, box_height);
    let scaled = |dimension: u32| ((dimension as f64 * scale).floor() as u32).max(1);
    (scaled(source_width), scaled(source_height))
}

pub fn bounded_resize(image: &DynamicImage, options: &TransformOptions) -> Option<DynamicImage> {
    if options.width == 0 || options.height == 0 {
        return None;
    }

    let (width, height) = target_dimensions(image.width(), image.height(), options.width, options.height);
    if (width, height) == (image.width(), image.height()) {
        return Some(image.clone());
    }
    Some(image.resize_exact(width, height, FilterType::Triangle))
}

pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Option<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    DynamicImage::ImageRgb8(image.to_rgb8())
        .write_with_encoder(encoder)
        .ok()?;
    Some(buffer)
}

/// A transformed image ready to be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Resize into the box and re-encode. `None` means the caller should keep
/// the original bytes.
pub fn transform(image: &DynamicImage, options: &TransformOptions) -> Option<Transformed> {
    let resized = bounded_resize(image, options)?;
    let data = encode_jpeg(&resized, options.quality)?;
    Some(Transformed {
        data,
        width: resized.width(),
        height: resized.height(),
    })
}
