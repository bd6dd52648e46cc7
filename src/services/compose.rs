//! Fallback compositing
//!
//! When matting looks degenerate, the matted raster is flattened onto an
//! opaque background so the caller still receives visible content. The
//! response loses its transparency in that case.

use image::{Rgba, RgbaImage};

/// Service flattening a matted image over a solid color
pub struct FallbackCompositor {
    background: [u8; 3],
}

impl FallbackCompositor {
    #[must_use]
    pub fn new(background: [u8; 3]) -> Self {
        Self { background }
    }

    /// Paste `matted` over an opaque canvas using its own alpha as the mask
    ///
    /// Each channel becomes `(src * a + bg * (255 - a)) / 255`, rounded, and
    /// every output pixel is fully opaque.
    #[must_use]
    pub fn composite(&self, matted: &RgbaImage) -> RgbaImage {
        let [br, bg, bb] = self.background;
        let (width, height) = matted.dimensions();
        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([br, bg, bb, 255]));

        for (dst, src) in canvas.pixels_mut().zip(matted.pixels()) {
            let [r, g, b, a] = src.0;
            *dst = Rgba([blend(r, br, a), blend(g, bg, a), blend(b, bb, a), 255]);
        }

        canvas
    }
}

impl Default for FallbackCompositor {
    fn default() -> Self {
        Self::new([255, 255, 255])
    }
}

fn blend(src: u8, bg: u8, alpha: u8) -> u8 {
    let a = u32::from(alpha);
    let value = u32::from(src) * a + u32::from(bg) * (255 - a);
    ((value + 127) / 255) as u8
}
