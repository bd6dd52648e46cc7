//! Model input and output conversion
//!
//! The salient-object model takes a fixed 320x320 NCHW tensor and returns a
//! single-channel saliency map at the same resolution. These helpers convert
//! between rasters and those tensors.

use crate::error::{CutoutError, Result};
use image::{imageops::FilterType, GrayImage, Luma, Rgba, RgbaImage};
use ndarray::Array4;

/// Square input edge expected by the model
pub const MODEL_INPUT_SIZE: u32 = 320;

/// Per-channel mean applied after scaling to [0, 1]
pub const NORMALIZATION_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation
pub const NORMALIZATION_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Filter used for both the input resize and the mask upscale
const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Tensor preparation and mask decoding for the matting model
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Build the normalized `[1, 3, 320, 320]` input tensor
    ///
    /// Channels are divided by the largest channel value present in the
    /// resized image rather than 255, then standardized per channel. The
    /// source alpha channel is ignored.
    #[must_use]
    pub fn to_tensor(image: &RgbaImage) -> Array4<f32> {
        let size = MODEL_INPUT_SIZE;
        let resized = image::imageops::resize(image, size, size, RESIZE_FILTER);

        let max_value = resized
            .pixels()
            .flat_map(|px| px.0.into_iter().take(3))
            .max()
            .map_or(1.0, f32::from)
            .max(1.0);

        let side = size as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions match the resized raster
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for channel in 0..3 {
                let value = f32::from(pixel[channel]) / max_value;
                tensor[[0, channel, y, x]] =
                    (value - NORMALIZATION_MEAN[channel]) / NORMALIZATION_STD[channel];
            }
        }

        tensor
    }

    /// Turn the model's first output into an 8-bit mask of `width` x `height`
    ///
    /// The saliency map is min-max normalized before scaling to 0..=255. A
    /// constant map carries no information and becomes fully transparent.
    ///
    /// # Errors
    /// - `Matting` if any output dimension is empty
    pub fn to_mask(output: &Array4<f32>, width: u32, height: u32) -> Result<GrayImage> {
        let (batch, channels, out_h, out_w) = output.dim();
        if batch < 1 || channels < 1 || out_h == 0 || out_w == 0 {
            return Err(CutoutError::matting(format!(
                "unexpected model output shape {:?}",
                output.shape()
            )));
        }

        let saliency = output.slice(ndarray::s![0, 0, .., ..]);
        let (min, max) = saliency
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;

        let mask_w = u32::try_from(out_w)
            .map_err(|_| CutoutError::matting("model output width out of range"))?;
        let mask_h = u32::try_from(out_h)
            .map_err(|_| CutoutError::matting("model output height out of range"))?;

        #[allow(clippy::indexing_slicing)]
        // Safe: from_fn only yields coordinates inside the output map
        let mask = GrayImage::from_fn(mask_w, mask_h, |x, y| {
            let value = saliency[[y as usize, x as usize]];
            let normalized = if range > f32::EPSILON && range.is_finite() {
                (value - min) / range
            } else {
                0.0
            };
            Luma([(normalized.clamp(0.0, 1.0) * 255.0) as u8])
        });

        if (mask_w, mask_h) == (width, height) {
            return Ok(mask);
        }
        Ok(image::imageops::resize(&mask, width, height, RESIZE_FILTER))
    }

    /// Copy RGB from `image` and take alpha from `mask`
    ///
    /// # Errors
    /// - `Matting` if mask and image dimensions differ
    pub fn apply_mask(image: &RgbaImage, mask: &GrayImage) -> Result<RgbaImage> {
        if image.dimensions() != mask.dimensions() {
            return Err(CutoutError::matting(format!(
                "mask is {:?} but image is {:?}",
                mask.dimensions(),
                image.dimensions()
            )));
        }

        let mut out = image.clone();
        for (px, alpha) in out.pixels_mut().zip(mask.pixels()) {
            let [r, g, b, _] = px.0;
            *px = Rgba([r, g, b, alpha.0[0]]);
        }
        Ok(out)
    }
}
