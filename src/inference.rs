//! Matting engine abstraction
//!
//! [`MattingBackend`] is the boundary the pipeline talks to: an RGBA raster
//! goes in, the same raster with a predicted alpha channel comes out.
//! Model runtimes implement the lower-level [`InferenceBackend`] and are
//! wrapped in [`ModelMatting`], which owns the tensor conversion.

use crate::{error::Result, utils::ImagePreprocessor};
use image::RgbaImage;
use ndarray::Array4;
use tracing::debug;

// Use instant crate for cross-platform time compatibility
use instant::Instant;

/// Foreground extraction engine shared across concurrent requests
pub trait MattingBackend: Send + Sync {
    /// Short engine name for logs
    fn name(&self) -> &'static str;

    /// Predict foreground alpha for `image`
    ///
    /// Implementations return a raster of the same dimensions whose RGB is
    /// copied from the input.
    ///
    /// # Errors
    /// - `Matting` for any engine failure; the backend stays usable afterwards
    fn matte(&self, image: &RgbaImage) -> Result<RgbaImage>;
}

/// Raw tensor-in, tensor-out model runtime
pub trait InferenceBackend: Send + Sync {
    /// Short runtime name for logs
    fn name(&self) -> &'static str;

    /// Run the model on a `[1, 3, H, W]` tensor and return its first output
    ///
    /// # Errors
    /// - `Matting` if the runtime rejects the input or produces no output
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>>;
}

/// Adapts a salient-object model runtime to the [`MattingBackend`] contract
pub struct ModelMatting<B> {
    backend: B,
}

impl<B: InferenceBackend> ModelMatting<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

impl<B: InferenceBackend> MattingBackend for ModelMatting<B> {
    fn name(&self) -> &'static str {
        self.backend.name()
    }

    fn matte(&self, image: &RgbaImage) -> Result<RgbaImage> {
        let (width, height) = image.dimensions();
        let start = Instant::now();

        let input = ImagePreprocessor::to_tensor(image);
        let output = self.backend.infer(&input)?;
        let mask = ImagePreprocessor::to_mask(&output, width, height)?;
        let matted = ImagePreprocessor::apply_mask(image, &mask)?;

        debug!(
            backend = self.backend.name(),
            width,
            height,
            output_shape = ?output.shape(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "matting complete"
        );
        Ok(matted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CutoutError;

    /// Runtime whose saliency increases left to right
    struct GradientRuntime;

    impl InferenceBackend for GradientRuntime {
        fn name(&self) -> &'static str {
            "gradient"
        }

        fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
            let (_, _, h, w) = input.dim();
            Ok(Array4::from_shape_fn((1, 1, h, w), |(_, _, _, x)| x as f32))
        }
    }

    struct BrokenRuntime;

    impl InferenceBackend for BrokenRuntime {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn infer(&self, _input: &Array4<f32>) -> Result<Array4<f32>> {
            Err(CutoutError::matting("runtime exploded"))
        }
    }

    #[test]
    fn test_model_matting_preserves_rgb_and_size() {
        let image = RgbaImage::from_pixel(90, 40, image::Rgba([11, 22, 33, 255]));
        let matting = ModelMatting::new(GradientRuntime);

        let out = matting.matte(&image).unwrap();

        assert_eq!(matting.name(), "gradient");
        assert_eq!(out.dimensions(), (90, 40));
        assert_eq!(&out.get_pixel(45, 20).0[..3], &[11, 22, 33]);
        assert!(out.get_pixel(0, 20).0[3] < out.get_pixel(89, 20).0[3]);
    }

    #[test]
    fn test_model_matting_propagates_runtime_errors() {
        let image = RgbaImage::new(4, 4);
        let err = ModelMatting::new(BrokenRuntime).matte(&image).unwrap_err();
        assert!(matches!(err, CutoutError::Matting(_)));
    }
}
