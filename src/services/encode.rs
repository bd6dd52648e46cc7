//! PNG encoding service
//!
//! Final stage of the pipeline. Settings are fixed: zlib's default level
//! (6) with per-row adaptive filter selection, which trades a little encode
//! time for noticeably smaller cutouts.

use crate::error::{CutoutError, Result};
use image::{
    codecs::png::{CompressionType, FilterType, PngEncoder},
    ExtendedColorType, ImageEncoder, RgbaImage,
};

/// Compression level used for every response
pub const PNG_COMPRESSION: CompressionType = CompressionType::Default;

/// Row filter strategy used for every response
pub const PNG_FILTER: FilterType = FilterType::Adaptive;

/// Service for serializing results as PNG
pub struct PngOutputEncoder;

impl PngOutputEncoder {
    /// Encode an RGBA raster as PNG bytes
    ///
    /// Output is deterministic: encoding the same raster twice yields
    /// identical bytes.
    ///
    /// # Errors
    /// - `Encode` if the encoder rejects the buffer (treated as a server defect)
    pub fn encode(image: &RgbaImage) -> Result<Vec<u8>> {
        let (width, height) = image.dimensions();
        let mut buffer = Vec::with_capacity(image.as_raw().len() / 2);

        PngEncoder::new_with_quality(&mut buffer, PNG_COMPRESSION, PNG_FILTER)
            .write_image(image.as_raw(), width, height, ExtendedColorType::Rgba8)
            .map_err(|e| CutoutError::encode(format!("{width}x{height} RGBA: {e}")))?;

        tracing::debug!(width, height, bytes = buffer.len(), "encoded PNG");
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 4) as u8, (y * 4) as u8, 128, ((x + y) * 2) as u8])
        })
    }

    #[test]
    fn test_encode_is_deterministic() {
        let image = gradient(48, 32);
        let first = PngOutputEncoder::encode(&image).unwrap();
        let second = PngOutputEncoder::encode(&image).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_encode_produces_valid_png() {
        let image = gradient(48, 32);
        let bytes = PngOutputEncoder::encode(&image).unwrap();

        assert_eq!(bytes.get(..8), Some(&b"\x89PNG\r\n\x1a\n"[..]));

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, image);
    }

    #[test]
    fn test_encode_single_pixel() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0]));
        let bytes = PngOutputEncoder::encode(&image).unwrap();
        assert!(!bytes.is_empty());
    }
}
