//! Core types for cutout requests and results

use serde::{Deserialize, Serialize};

/// A request to cut the subject out of a remote image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutoutRequest {
    /// Public image URL
    #[serde(rename = "src")]
    pub source_url: String,
    /// Requested longest side before matting; clamped by the pipeline
    #[serde(rename = "size", default, skip_serializing_if = "Option::is_none")]
    pub max_side: Option<i64>,
}

impl CutoutRequest {
    #[must_use]
    pub fn new<S: Into<String>>(source_url: S) -> Self {
        Self {
            source_url: source_url.into(),
            max_side: None,
        }
    }

    #[must_use]
    pub fn with_max_side(mut self, max_side: i64) -> Self {
        self.max_side = Some(max_side);
        self
    }
}

/// Alpha coverage of a matted image
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlphaStatistics {
    /// Pixels whose alpha exceeds the noise threshold
    pub non_transparent_pixel_count: u64,
    /// Total pixels inspected
    pub total_pixel_count: u64,
    /// `non_transparent / total`, 0 for an empty image
    pub transparency_ratio: f64,
}

impl AlphaStatistics {
    #[must_use]
    pub fn new(non_transparent: u64, total: u64) -> Self {
        let transparency_ratio = if total == 0 {
            0.0
        } else {
            non_transparent as f64 / total as f64
        };
        Self {
            non_transparent_pixel_count: non_transparent,
            total_pixel_count: total,
            transparency_ratio,
        }
    }

    /// Whether the ratio falls below the failure threshold
    #[must_use]
    pub fn looks_degenerate(&self, failure_ratio: f64) -> bool {
        self.transparency_ratio < failure_ratio
    }
}

/// Detailed timing breakdown for a cutout run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingTimings {
    /// Session initialization, when this request triggered it
    pub model_load_ms: u64,
    /// Source download
    pub fetch_ms: u64,
    /// Decode, color normalization and downscale
    pub decode_ms: u64,
    /// Matting engine invocation
    pub matting_ms: u64,
    /// Transparency analysis and optional fallback compositing
    pub postprocessing_ms: u64,
    /// PNG encoding
    pub encode_ms: u64,
    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Sum of the individual stages, useful for spotting unaccounted time
    #[must_use]
    pub fn stage_sum(&self) -> u64 {
        self.model_load_ms
            + self.fetch_ms
            + self.decode_ms
            + self.matting_ms
            + self.postprocessing_ms
            + self.encode_ms
    }
}

/// Successful pipeline output
#[derive(Debug, Clone)]
pub struct CutoutResponse {
    /// Encoded PNG
    pub png_bytes: Vec<u8>,
    /// Alpha analysis of the matting output, if it was computed
    pub statistics: Option<AlphaStatistics>,
    /// Whether the opaque-background fallback replaced the matted image
    pub fallback_applied: bool,
    /// Final image dimensions
    pub dimensions: (u32, u32),
    pub timings: ProcessingTimings,
}

impl CutoutResponse {
    pub const CONTENT_TYPE: &'static str = "image/png";
    pub const CACHE_CONTROL: &'static str = "public, max-age=3600";

    /// Value for the transparency diagnostic header
    ///
    /// Always carries a decimal point, so a ratio of zero renders as `0.0`.
    #[must_use]
    pub fn transparency_header(&self) -> String {
        self.statistics
            .map_or_else(|| "unknown".to_string(), |s| format!("{:?}", s.transparency_ratio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let req: CutoutRequest =
            serde_json::from_str(r#"{"src":"https://example.com/a.jpg","size":800}"#).unwrap();
        assert_eq!(req.source_url, "https://example.com/a.jpg");
        assert_eq!(req.max_side, Some(800));

        let req: CutoutRequest = serde_json::from_str(r#"{"src":"https://example.com/a.jpg"}"#).unwrap();
        assert_eq!(req.max_side, None);

        let req: CutoutRequest =
            serde_json::from_str(r#"{"src":"https://example.com/a.jpg","size":null}"#).unwrap();
        assert_eq!(req.max_side, None);
    }

    #[test]
    fn test_alpha_statistics_ratio() {
        let stats = AlphaStatistics::new(25, 100);
        assert!((stats.transparency_ratio - 0.25).abs() < f64::EPSILON);
        assert!(!stats.looks_degenerate(0.10));

        let stats = AlphaStatistics::new(9, 100);
        assert!(stats.looks_degenerate(0.10));

        let empty = AlphaStatistics::new(0, 0);
        assert!(empty.transparency_ratio.abs() < f64::EPSILON);
    }

    #[test]
    fn test_transparency_header() {
        let mut response = CutoutResponse {
            png_bytes: Vec::new(),
            statistics: None,
            fallback_applied: false,
            dimensions: (1, 1),
            timings: ProcessingTimings::default(),
        };
        assert_eq!(response.transparency_header(), "unknown");

        response.statistics = Some(AlphaStatistics::new(1, 4));
        assert_eq!(response.transparency_header(), "0.25");

        response.statistics = Some(AlphaStatistics::new(0, 4));
        assert_eq!(response.transparency_header(), "0.0");

        response.statistics = Some(AlphaStatistics::new(4, 4));
        assert_eq!(response.transparency_header(), "1.0");
    }
}
