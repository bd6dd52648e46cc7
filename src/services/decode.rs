//! Source decoding and normalization service
//!
//! Turns fetched bytes into a bounded RGBA raster. Decoding is strict first;
//! when that fails and the source declared an image, a lenient pass recovers
//! whatever rows a truncated stream still contains.

use crate::error::{CutoutError, Result};
use image::{imageops::FilterType, DynamicImage, ImageFormat, ImageReader, Rgba, RgbaImage};
use std::io::Cursor;
use tracing::{debug, warn};

/// Resampling filter used for pre-matting downscale
pub const DOWNSCALE_FILTER: FilterType = FilterType::Lanczos3;

/// Decoder and normalizer for fetched source images
pub struct SourceDecoder;

impl SourceDecoder {
    /// Decode, normalize to RGBA8 and downscale to `target` in one step
    ///
    /// # Errors
    /// - `Decode` when the bytes cannot be decoded even leniently
    pub fn decode_and_normalize(
        bytes: &[u8],
        content_type: &str,
        target: u32,
    ) -> Result<RgbaImage> {
        let image = Self::decode(bytes, content_type)?;
        Ok(Self::normalize(image, target))
    }

    /// Decode raw bytes into an image
    ///
    /// When strict decoding fails and `content_type` declares an image,
    /// truncated PNG streams are recovered row by row; rows that never
    /// arrived are left fully transparent.
    ///
    /// # Errors
    /// - `Decode` for empty input, unknown formats, or unrecoverable data
    pub fn decode(bytes: &[u8], content_type: &str) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(CutoutError::decode("source returned an empty body"));
        }

        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| CutoutError::decode(format!("could not sniff image format: {e}")))?;
        let format = reader.format();

        let strict_error = match reader.decode() {
            Ok(image) => {
                debug!(
                    format = ?format,
                    width = image.width(),
                    height = image.height(),
                    color = ?image.color(),
                    "decoded source image"
                );
                return Ok(image);
            },
            Err(e) => e,
        };

        let lenient = content_type.to_ascii_lowercase().contains("image");
        if lenient && format == Some(ImageFormat::Png) {
            if let Some(recovered) = Self::decode_png_partial(bytes)? {
                warn!(
                    error = %strict_error,
                    width = recovered.width(),
                    height = recovered.height(),
                    "recovered truncated PNG"
                );
                return Ok(DynamicImage::ImageRgba8(recovered));
            }
        }

        Err(CutoutError::decode(match format {
            Some(format) => format!("{format:?} data is malformed or truncated: {strict_error}"),
            None => format!("unrecognized image format: {strict_error}"),
        }))
    }

    /// Recover the complete rows of a truncated, non-interlaced PNG
    ///
    /// The header is untrusted: the canvas is only allocated when it fits
    /// the same allocation limit strict decoding enforces.
    fn decode_png_partial(bytes: &[u8]) -> Result<Option<RgbaImage>> {
        let max_alloc = max_alloc_bytes();
        let limits = png::Limits {
            bytes: usize::try_from(max_alloc).unwrap_or(usize::MAX),
        };
        let mut decoder = png::Decoder::new_with_limits(Cursor::new(bytes), limits);
        decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
        let Ok(mut reader) = decoder.read_info() else {
            return Ok(None);
        };

        let (width, height, interlaced) = {
            let info = reader.info();
            (info.width, info.height, info.interlaced)
        };
        if interlaced || width == 0 || height == 0 {
            return Ok(None);
        }

        let canvas_bytes = u64::from(width) * u64::from(height) * 4;
        if canvas_bytes > max_alloc {
            warn!(width, height, max_alloc, "truncated PNG declares an oversized canvas");
            return Err(CutoutError::decode(format!(
                "{width}x{height} image exceeds the decoding memory limit"
            )));
        }

        let (color_type, _) = reader.output_color_type();
        let channels = match color_type {
            png::ColorType::Grayscale => 1,
            png::ColorType::GrayscaleAlpha => 2,
            png::ColorType::Rgb => 3,
            png::ColorType::Rgba => 4,
            png::ColorType::Indexed => return Ok(None),
        };

        let mut canvas = RgbaImage::new(width, height);
        let mut y = 0;
        while y < height {
            let Ok(Some(row)) = reader.next_row() else {
                break;
            };
            for (x, px) in row.data().chunks_exact(channels).take(width as usize).enumerate() {
                canvas.put_pixel(x as u32, y, expand_pixel(px));
            }
            y += 1;
        }

        Ok((y > 0).then_some(canvas))
    }

    /// Convert to RGBA8 and shrink so neither side exceeds `target`
    #[must_use]
    pub fn normalize(image: DynamicImage, target: u32) -> RgbaImage {
        let rgba = image.into_rgba8();
        Self::downscale(rgba, target)
    }

    /// Shrink proportionally so the longer side equals `target`
    ///
    /// Images already within bounds are returned unchanged.
    #[must_use]
    pub fn downscale(image: RgbaImage, target: u32) -> RgbaImage {
        let (width, height) = image.dimensions();
        let (new_width, new_height) = Self::target_dimensions(width, height, target);
        if (new_width, new_height) == (width, height) {
            return image;
        }

        debug!(width, height, new_width, new_height, "downscaling before matting");
        image::imageops::resize(&image, new_width, new_height, DOWNSCALE_FILTER)
    }

    /// Dimensions after applying the downscale policy
    #[must_use]
    pub fn target_dimensions(width: u32, height: u32, target: u32) -> (u32, u32) {
        let target = target.max(1);
        if width <= target && height <= target {
            return (width, height);
        }

        let scale_short = |short: u32, long: u32| -> u32 {
            let scaled = (f64::from(short) * f64::from(target) / f64::from(long)).round();
            (scaled as u32).clamp(1, target)
        };

        if width >= height {
            (target, scale_short(height, width))
        } else {
            (scale_short(width, height), target)
        }
    }
}

/// Allocation ceiling shared with the strict decoder's defaults
fn max_alloc_bytes() -> u64 {
    image::Limits::default().max_alloc.unwrap_or(u64::MAX)
}

fn expand_pixel(px: &[u8]) -> Rgba<u8> {
    match *px {
        [g] => Rgba([g, g, g, 255]),
        [g, a] => Rgba([g, g, g, a]),
        [r, g, b] => Rgba([r, g, b, 255]),
        [r, g, b, a] => Rgba([r, g, b, a]),
        _ => Rgba([0, 0, 0, 0]),
    }
}
