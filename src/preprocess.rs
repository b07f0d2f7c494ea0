//! Image preprocessing for classifier inference.
//!
//! Turns uploaded image bytes into the NCHW float tensor the exported
//! ResNet classifiers expect: square resize, RGB, ImageNet normalization.

use image::imageops::FilterType;
use thiserror::Error;

/// ImageNet channel means (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Errors raised while turning bytes into a model input
#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
}

/// Model input ready to be wrapped in a tensor
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    /// Tensor shape, always `[1, 3, size, size]`
    pub shape: Vec<i64>,
    /// Channel-major pixel data
    pub data: Vec<f32>,
}

/// Converts raw image bytes into normalized model input.
pub struct ImageTensorizer {
    input_size: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl ImageTensorizer {
    /// Create a tensorizer producing `input_size × input_size` inputs with ImageNet statistics.
    pub fn new(input_size: u32) -> Self {
        Self {
            input_size,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    /// Number of values in one produced tensor
    pub fn tensor_len(&self) -> usize {
        3 * (self.input_size as usize) * (self.input_size as usize)
    }

    /// Decode, resize and normalize an image.
    ///
    /// The aspect ratio is not preserved; the image is stretched to the
    /// square input the models were trained on.
    pub fn tensorize(&self, bytes: &[u8]) -> Result<ImageTensor, PreprocessError> {
        let img = image::load_from_memory(bytes)?;
        let resized = img.resize_exact(self.input_size, self.input_size, FilterType::CatmullRom);
        let rgb = resized.to_rgb8();

        let plane = (self.input_size as usize) * (self.input_size as usize);
        let mut data = vec![0.0_f32; 3 * plane];

        for (i, pixel) in rgb.pixels().enumerate() {
            for c in 0..3 {
                let value = pixel.0[c] as f32 / 255.0;
                data[c * plane + i] = (value - self.mean[c]) / self.std[c];
            }
        }

        let size = self.input_size as i64;
        Ok(ImageTensor {
            shape: vec![1, 3, size, size],
            data,
        })
    }
}

impl Default for ImageTensorizer {
    fn default() -> Self {
        Self::new(224)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb(color));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_tensor_shape() {
        let tensorizer = ImageTensorizer::default();
        let tensor = tensorizer.tensorize(&png_bytes(300, 120, [10, 20, 30])).unwrap();

        assert_eq!(tensor.shape, vec![1, 3, 224, 224]);
        assert_eq!(tensor.data.len(), tensorizer.tensor_len());
    }

    #[test]
    fn test_normalization_is_channel_major() {
        let tensorizer = ImageTensorizer::new(4);
        let tensor = tensorizer.tensorize(&png_bytes(8, 8, [255, 0, 0])).unwrap();

        let red = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let green = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];

        assert!((tensor.data[0] - red).abs() < 1e-5);
        assert!((tensor.data[15] - red).abs() < 1e-5);
        assert!((tensor.data[16] - green).abs() < 1e-5);
    }

    #[test]
    fn test_same_bytes_same_tensor() {
        let tensorizer = ImageTensorizer::default();
        let bytes = png_bytes(64, 48, [120, 80, 200]);

        assert_eq!(
            tensorizer.tensorize(&bytes).unwrap(),
            tensorizer.tensorize(&bytes).unwrap()
        );
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let tensorizer = ImageTensorizer::default();
        let result = tensorizer.tensorize(b"definitely not an image");
        assert!(matches!(result, Err(PreprocessError::Decode(_))));
    }
}
