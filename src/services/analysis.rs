//! Transparency analysis of matting output
//!
//! A matting engine that fails tends to return a near-empty alpha channel.
//! The ratio of meaningfully opaque pixels is used as a cheap failure
//! signal. It is a heuristic: a correctly extracted subject that covers less
//! than the threshold fraction of the frame is also flagged.

use crate::{config::PipelineConfig, types::AlphaStatistics};
use image::RgbaImage;

/// Service computing alpha coverage statistics
pub struct TransparencyAnalyzer {
    noise_threshold: u8,
    failure_ratio: f64,
}

impl TransparencyAnalyzer {
    #[must_use]
    pub fn new(noise_threshold: u8, failure_ratio: f64) -> Self {
        Self {
            noise_threshold,
            failure_ratio,
        }
    }

    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.alpha_noise_threshold, config.failure_ratio)
    }

    /// Count pixels whose alpha exceeds the noise threshold
    #[must_use]
    pub fn analyze(&self, image: &RgbaImage) -> AlphaStatistics {
        let total = u64::from(image.width()) * u64::from(image.height());
        let non_transparent = image
            .pixels()
            .filter(|px| px.0[3] > self.noise_threshold)
            .count() as u64;

        AlphaStatistics::new(non_transparent, total)
    }

    /// Whether the statistics indicate a likely matting failure
    #[must_use]
    pub fn is_likely_failure(&self, stats: &AlphaStatistics) -> bool {
        stats.looks_degenerate(self.failure_ratio)
    }
}

impl Default for TransparencyAnalyzer {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn with_alpha(alpha: &[u8], width: u32) -> RgbaImage {
        let height = alpha.len() as u32 / width;
        RgbaImage::from_fn(width, height, |x, y| {
            let a = alpha.get((y * width + x) as usize).copied().unwrap_or(0);
            Rgba([50, 60, 70, a])
        })
    }

    #[test]
    fn test_ratio_matches_exact_count() {
        // 10 and below are noise; 11 and up count
        let alpha = [0, 5, 10, 11, 255, 128, 0, 0, 10, 200, 1, 12];
        let image = with_alpha(&alpha, 4);
        let stats = TransparencyAnalyzer::default().analyze(&image);

        let expected = alpha.iter().filter(|&&a| a > 10).count() as u64;
        assert_eq!(stats.non_transparent_pixel_count, expected);
        assert_eq!(stats.total_pixel_count, 12);
        assert!((stats.transparency_ratio - expected as f64 / 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fully_transparent_is_failure() {
        let image = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 0]));
        let analyzer = TransparencyAnalyzer::default();
        let stats = analyzer.analyze(&image);

        assert_eq!(stats.non_transparent_pixel_count, 0);
        assert!(analyzer.is_likely_failure(&stats));
    }

    #[test]
    fn test_threshold_boundary() {
        let analyzer = TransparencyAnalyzer::default();

        // Exactly 10% opaque is not a failure
        let mut alpha = vec![0u8; 100];
        alpha.iter_mut().take(10).for_each(|a| *a = 255);
        let stats = analyzer.analyze(&with_alpha(&alpha, 10));
        assert!(!analyzer.is_likely_failure(&stats));

        // 9% is
        alpha[9] = 0;
        let stats = analyzer.analyze(&with_alpha(&alpha, 10));
        assert!(analyzer.is_likely_failure(&stats));
    }

    #[test]
    fn test_custom_thresholds() {
        let analyzer = TransparencyAnalyzer::new(0, 0.5);
        let image = with_alpha(&[1, 1, 0, 0], 2);
        let stats = analyzer.analyze(&image);
        assert_eq!(stats.non_transparent_pixel_count, 2);
        assert!(!analyzer.is_likely_failure(&stats));
    }
}
