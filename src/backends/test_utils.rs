//! Mock matting backends for unit tests
//!
//! These stand in for a real model so pipeline and session tests run
//! without any ONNX file.

use crate::{
    error::{CutoutError, Result},
    inference::MattingBackend,
};
use image::{Rgba, RgbaImage};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// What the mock should predict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMask {
    /// Soft-edged disc covering the middle of the frame
    CenteredSubject,
    /// Nothing is foreground
    Empty,
    /// Every call fails
    Failing,
}

/// Mock matting backend with call counting
#[derive(Debug, Clone)]
pub struct MockMattingBackend {
    mask: MockMask,
    calls: Arc<AtomicUsize>,
}

impl MockMattingBackend {
    #[must_use]
    pub fn new(mask: MockMask) -> Self {
        Self {
            mask,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn subject() -> Self {
        Self::new(MockMask::CenteredSubject)
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(MockMask::Empty)
    }

    #[must_use]
    pub fn failing() -> Self {
        Self::new(MockMask::Failing)
    }

    /// Number of `matte` calls so far, shared between clones
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn disc_alpha(x: u32, y: u32, width: u32, height: u32) -> u8 {
        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let radius = (width.min(height) as f32 / 2.5).max(1.0);

        let dx = x as f32 - center_x;
        let dy = y as f32 - center_y;
        let distance = (dx * dx + dy * dy).sqrt();

        // Soft edge over the outer fifth of the radius
        let coverage = ((radius - distance) / (radius * 0.2)).clamp(0.0, 1.0);
        (coverage * 255.0) as u8
    }
}

impl MattingBackend for MockMattingBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn matte(&self, image: &RgbaImage) -> Result<RgbaImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let (width, height) = image.dimensions();
        match self.mask {
            MockMask::Failing => Err(CutoutError::matting("mock backend failure")),
            MockMask::Empty => Ok(RgbaImage::from_fn(width, height, |x, y| {
                let [r, g, b, _] = image.get_pixel(x, y).0;
                Rgba([r, g, b, 0])
            })),
            MockMask::CenteredSubject => Ok(RgbaImage::from_fn(width, height, |x, y| {
                let [r, g, b, _] = image.get_pixel(x, y).0;
                Rgba([r, g, b, Self::disc_alpha(x, y, width, height)])
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_mask_is_mid_range() {
        let image = RgbaImage::from_pixel(100, 100, Rgba([1, 2, 3, 255]));
        let backend = MockMattingBackend::subject();
        let out = backend.matte(&image).unwrap();

        let opaque = out.pixels().filter(|p| p.0[3] > 10).count();
        // Disc of radius 40 in a 100x100 frame covers about half
        assert!(opaque > 3_000 && opaque < 7_000, "opaque = {opaque}");
        assert_eq!(backend.call_count(), 1);
    }

    #[test]
    fn test_empty_and_failing() {
        let image = RgbaImage::new(10, 10);
        let out = MockMattingBackend::empty().matte(&image).unwrap();
        assert!(out.pixels().all(|p| p.0[3] == 0));

        let failing = MockMattingBackend::failing();
        assert!(failing.matte(&image).is_err());
        assert_eq!(failing.clone().call_count(), 1);
    }
}
