use anyhow::{Context, Result};
use chrono::Local;
use image::RgbImage;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::CaptureConfig;

/// Process-wide capture sequence. Timestamps truncate to whole seconds, so two
/// captures inside the same second need the counter to stay distinct.
static CAPTURE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Which user path produced the image bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Camera,
    File,
}

impl SourceKind {
    pub fn filename_prefix(&self) -> &'static str {
        match self {
            SourceKind::Camera => "captured_image",
            SourceKind::File => "uploaded_image",
        }
    }
}

/// An encoded still image ready for upload. Immutable once created; a new
/// capture supersedes it rather than mutating it.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub data: Vec<u8>,
    pub filename: String,
    /// Decoded frame kept for local display, so a successful upload never
    /// needs to re-fetch its own image from the server.
    pub frame: RgbImage,
}

impl CapturedImage {
    /// Snapshot a frame: fit it into the capture raster, encode as PNG and
    /// stamp it with a unique name.
    pub fn from_frame(frame: &RgbImage, kind: SourceKind, config: &CaptureConfig) -> Result<Self> {
        let fitted = fit_to_raster(frame, config.width, config.height);
        let data = encode_png(&fitted)?;
        let filename = unique_filename(kind);

        log::debug!(
            "Captured {}x{} frame into {} ({} bytes)",
            fitted.width(),
            fitted.height(),
            filename,
            data.len()
        );

        Ok(Self {
            data,
            filename,
            frame: fitted,
        })
    }
}

/// Fit an image within the capture raster, preserving aspect ratio. Frames
/// already inside the raster are passed through unscaled.
pub fn fit_to_raster(image: &RgbImage, max_width: u32, max_height: u32) -> RgbImage {
    let (width, height) = (image.width(), image.height());

    let width_ratio = max_width as f32 / width as f32;
    let height_ratio = max_height as f32 / height as f32;
    let scale = width_ratio.min(height_ratio);

    if scale >= 1.0 {
        return image.clone();
    }

    let new_width = (width as f32 * scale) as u32;
    let new_height = (height as f32 * scale) as u32;

    image::imageops::resize(image, new_width, new_height, image::imageops::FilterType::Lanczos3)
}

/// Encode an RGB frame as PNG bytes in memory.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), image::ImageOutputFormat::Png)
        .context("Failed to encode frame as PNG")?;
    Ok(buffer)
}

/// Generate a collision-free filename of the form `<prefix>_<digits>.png`.
/// The digits are a wall-clock timestamp followed by a monotonic sequence, so
/// captures within the same second still get distinct names.
pub fn unique_filename(kind: SourceKind) -> String {
    let timestamp = Local::now().format("%Y%m%d%H%M%S");
    let sequence = CAPTURE_SEQUENCE.fetch_add(1, Ordering::Relaxed) % 1000;
    format!("{}_{}{:03}.png", kind.filename_prefix(), timestamp, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame(width: u32, height: u32) -> RgbImage {
        image::ImageBuffer::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    fn assert_name_shape(name: &str, prefix: &str) {
        assert!(name.starts_with(&format!("{}_", prefix)), "bad prefix: {}", name);
        assert!(name.ends_with(".png"), "bad extension: {}", name);
        let digits = &name[prefix.len() + 1..name.len() - 4];
        assert!(!digits.is_empty());
        assert!(digits.chars().all(|c| c.is_ascii_digit()), "non-digit in: {}", name);
    }

    #[test]
    fn test_filename_pattern() {
        assert_name_shape(&unique_filename(SourceKind::Camera), "captured_image");
        assert_name_shape(&unique_filename(SourceKind::File), "uploaded_image");
    }

    #[test]
    fn test_filenames_unique_within_one_second() {
        let names: Vec<String> = (0..20).map(|_| unique_filename(SourceKind::Camera)).collect();
        let mut deduped = names.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(names.len(), deduped.len(), "sub-second filename collision");
    }

    #[test]
    fn test_encode_png_magic() {
        let frame = test_frame(8, 8);
        let bytes = encode_png(&frame).unwrap();
        assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn test_fit_to_raster_downscales() {
        let frame = test_frame(1280, 960);
        let fitted = fit_to_raster(&frame, 640, 480);
        assert_eq!(fitted.width(), 640);
        assert_eq!(fitted.height(), 480);
    }

    #[test]
    fn test_fit_to_raster_keeps_small_frames() {
        let frame = test_frame(320, 240);
        let fitted = fit_to_raster(&frame, 640, 480);
        assert_eq!(fitted.width(), 320);
        assert_eq!(fitted.height(), 240);
    }

    #[test]
    fn test_fit_preserves_aspect_ratio() {
        // 1600x480 is wider than 4:3, so width constrains the scale
        let frame = test_frame(1600, 480);
        let fitted = fit_to_raster(&frame, 640, 480);
        assert_eq!(fitted.width(), 640);
        assert_eq!(fitted.height(), 192);
    }

    #[test]
    fn test_captured_image_from_frame() {
        let frame = test_frame(1280, 960);
        let config = CaptureConfig { width: 640, height: 480 };

        let captured = CapturedImage::from_frame(&frame, SourceKind::Camera, &config).unwrap();

        assert_name_shape(&captured.filename, "captured_image");
        assert_eq!(captured.frame.width(), 640);
        assert_eq!(captured.frame.height(), 480);
        assert!(!captured.data.is_empty());
    }
}
