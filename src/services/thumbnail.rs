//! Thumbnail generation

use crate::config::ThumbnailConfig;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while producing a thumbnail
#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode thumbnail: {0}")]
    Encode(String),
}

/// Output encoding of generated thumbnails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailFormat {
    /// Lossy WebP
    #[default]
    WebP,
    Jpeg,
    /// Lossless, quality is ignored
    Png,
}

impl ThumbnailFormat {
    /// File extension used in storage keys
    pub fn extension(&self) -> &'static str {
        match self {
            ThumbnailFormat::WebP => "webp",
            ThumbnailFormat::Jpeg => "jpg",
            ThumbnailFormat::Png => "png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ThumbnailFormat::WebP => "image/webp",
            ThumbnailFormat::Jpeg => "image/jpeg",
            ThumbnailFormat::Png => "image/png",
        }
    }
}

/// Encoded thumbnail
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ThumbnailFormat,
}

/// Downscales images to fit a bounding box and re-encodes them.
#[derive(Debug, Clone)]
pub struct ThumbnailGenerator {
    max_width: u32,
    max_height: u32,
    format: ThumbnailFormat,
    quality: u8,
}

impl ThumbnailGenerator {
    pub fn new(max_width: u32, max_height: u32, format: ThumbnailFormat, quality: u8) -> Self {
        Self {
            max_width: max_width.max(1),
            max_height: max_height.max(1),
            format,
            quality: quality.min(100),
        }
    }

    pub fn from_config(config: &ThumbnailConfig) -> Self {
        Self::new(
            config.max_width,
            config.max_height,
            config.format,
            config.quality,
        )
    }

    pub fn format(&self) -> ThumbnailFormat {
        self.format
    }

    /// Decode, shrink and encode an image.
    ///
    /// Images other than 8-bit RGB/RGBA are converted to RGBA first. Images
    /// already inside the bounding box keep their size.
    pub fn generate(&self, image_data: &[u8]) -> Result<Thumbnail, ThumbnailError> {
        let mut img = image::load_from_memory(image_data).map_err(ThumbnailError::Decode)?;

        if !matches!(img.color(), ColorType::Rgb8 | ColorType::Rgba8) {
            img = DynamicImage::ImageRgba8(img.to_rgba8());
        }

        let (width, height) = img.dimensions();
        let (new_width, new_height) = fit_within(width, height, self.max_width, self.max_height);
        if (new_width, new_height) != (width, height) {
            img = img.resize_exact(new_width, new_height, FilterType::Lanczos3);
        }

        let bytes = self.encode(&img)?;

        Ok(Thumbnail {
            bytes,
            width: new_width,
            height: new_height,
            format: self.format,
        })
    }

    fn encode(&self, img: &DynamicImage) -> Result<Vec<u8>, ThumbnailError> {
        match self.format {
            ThumbnailFormat::WebP => {
                let encoder = webp::Encoder::from_image(img)
                    .map_err(|e| ThumbnailError::Encode(e.to_string()))?;
                Ok(encoder.encode(self.quality as f32).to_vec())
            }
            ThumbnailFormat::Jpeg => {
                let mut buf = Vec::new();
                // JPEG has no alpha channel
                let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, self.quality))
                    .map_err(|e| ThumbnailError::Encode(e.to_string()))?;
                Ok(buf)
            }
            ThumbnailFormat::Png => {
                let mut buf = Vec::new();
                img.write_with_encoder(PngEncoder::new(&mut buf))
                    .map_err(|e| ThumbnailError::Encode(e.to_string()))?;
                Ok(buf)
            }
        }
    }
}

impl Default for ThumbnailGenerator {
    fn default() -> Self {
        Self::from_config(&ThumbnailConfig::default())
    }
}

/// Largest size fitting in `max_width × max_height` with the same aspect ratio.
/// Never upscales and never returns a zero dimension.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let new_width = ((width as f64 * scale).round() as u32).clamp(1, max_width);
    let new_height = ((height as f64 * scale).round() as u32).clamp(1, max_height);
    (new_width, new_height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb};
    use std::io::Cursor;

    fn png_rgb(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn assert_aspect_preserved(original: (u32, u32), thumb: (u32, u32)) {
        let original_ratio = original.0 as f64 / original.1 as f64;
        let thumb_ratio = thumb.0 as f64 / thumb.1 as f64;
        // one pixel of rounding on the shorter side
        let tolerance = original_ratio / thumb.1.min(thumb.0) as f64 + 1e-9;
        assert!(
            (original_ratio - thumb_ratio).abs() <= tolerance,
            "ratio {} vs {}",
            original_ratio,
            thumb_ratio
        );
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(1024, 768, 512, 512), (512, 384));
        assert_eq!(fit_within(768, 1024, 512, 512), (384, 512));
        assert_eq!(fit_within(2000, 2000, 512, 512), (512, 512));
        assert_eq!(fit_within(300, 200, 512, 512), (300, 200));
        assert_eq!(fit_within(5000, 3, 512, 512), (512, 1));
    }

    #[test]
    fn test_fit_within_bounds_and_ratio() {
        let sizes = [(1920, 1080), (513, 512), (100, 4000), (3001, 1999), (640, 480)];
        for &(w, h) in &sizes {
            let (tw, th) = fit_within(w, h, 512, 512);
            assert!(tw <= 512 && th <= 512);
            assert_aspect_preserved((w, h), (tw, th));
        }
    }

    #[test]
    fn test_generate_webp_thumbnail() {
        let generator = ThumbnailGenerator::default();
        let thumbnail = generator.generate(&png_rgb(1024, 600)).unwrap();

        assert_eq!((thumbnail.width, thumbnail.height), (512, 300));
        assert_eq!(thumbnail.format, ThumbnailFormat::WebP);
        assert_eq!(&thumbnail.bytes[0..4], b"RIFF");
        assert_eq!(&thumbnail.bytes[8..12], b"WEBP");

        let decoded = image::load_from_memory(&thumbnail.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (512, 300));
    }

    #[test]
    fn test_small_image_is_not_upscaled() {
        let generator = ThumbnailGenerator::new(512, 512, ThumbnailFormat::Png, 75);
        let thumbnail = generator.generate(&png_rgb(120, 80)).unwrap();

        let decoded = image::load_from_memory(&thumbnail.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (120, 80));
    }

    #[test]
    fn test_grayscale_is_converted() {
        let img = ImageBuffer::from_pixel(700, 350, Luma([90u8]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();

        let generator = ThumbnailGenerator::default();
        let thumbnail = generator.generate(buf.get_ref()).unwrap();
        assert_eq!((thumbnail.width, thumbnail.height), (512, 256));
    }

    #[test]
    fn test_jpeg_output() {
        let generator = ThumbnailGenerator::new(64, 64, ThumbnailFormat::Jpeg, 80);
        let thumbnail = generator.generate(&png_rgb(256, 128)).unwrap();

        assert_eq!(&thumbnail.bytes[0..2], &[0xFF, 0xD8]);
        assert_eq!((thumbnail.width, thumbnail.height), (64, 32));
    }

    #[test]
    fn test_garbage_fails_without_panicking() {
        let generator = ThumbnailGenerator::default();
        let result = generator.generate(b"not an image");
        assert!(matches!(result, Err(ThumbnailError::Decode(_))));
    }

    #[test]
    fn test_format_metadata() {
        assert_eq!(ThumbnailFormat::WebP.extension(), "webp");
        assert_eq!(ThumbnailFormat::WebP.content_type(), "image/webp");
        assert_eq!(ThumbnailFormat::Jpeg.extension(), "jpg");
    }
}
