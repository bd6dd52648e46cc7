#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Cutout Service
//!
//! An HTTP service that downloads an image by URL, removes its background
//! with a U²-Net salient-object model and returns a transparent PNG.
//!
//! ## Pipeline
//!
//! 1. **Auth guard**: optional bearer token and HMAC-SHA256 URL signature
//! 2. **Fetch**: bounded-time download with a browser-like User-Agent
//! 3. **Decode**: lenient decoding, RGBA normalization, downscale
//! 4. **Matting**: process-wide lazily loaded session (Tract or ONNX Runtime)
//! 5. **Analysis**: fraction of pixels with meaningful alpha
//! 6. **Fallback**: composite onto white when the cutout looks degenerate
//! 7. **Encode**: PNG with diagnostic headers
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use cutout_service::{CutoutConfig, CutoutProcessor, CutoutRequest, Credentials};
//!
//! # async fn example() -> cutout_service::Result<()> {
//! let config = CutoutConfig::builder().default_max_side(512).build()?;
//! let processor = CutoutProcessor::new(&config)?;
//!
//! let request = CutoutRequest::new("https://example.com/product.jpg");
//! let response = processor.process(&request, &Credentials::none()).await?;
//! std::fs::write("cutout.png", &response.png_bytes)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Embedding the HTTP surface
//!
//! ```rust,no_run
//! use cutout_service::{router, CutoutConfig, CutoutProcessor};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let processor = Arc::new(CutoutProcessor::new(&CutoutConfig::default())?);
//! let app = router(processor);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): pure Rust matting backend
//! - `onnx`: ONNX Runtime matting backend
//! - `cli` (default): the `cutout-service` binary and subscriber setup
//! - `tracing-json`: JSON log output
//! - `webp-support` (default): WebP sources

pub mod auth;
pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod server;
pub mod services;
pub mod session;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

pub use auth::{AuthGuard, SIGNATURE_HEADER};
pub use config::{BackendType, CutoutConfig, CutoutConfigBuilder, Preset};
pub use error::{CutoutError, ErrorKind, Result};
pub use inference::{InferenceBackend, MattingBackend, ModelMatting};
pub use models::ModelResolver;
pub use processor::{Credentials, CutoutProcessor};
pub use server::{router, serve, status_for, FALLBACK_HEADER, TRANSPARENCY_HEADER};
pub use services::{
    FallbackCompositor, PngOutputEncoder, SourceDecoder, SourceFetcher, TransparencyAnalyzer,
};
pub use session::{MattingSession, WarmReport};
pub use types::{AlphaStatistics, CutoutRequest, CutoutResponse, ProcessingTimings};
pub use utils::ImagePreprocessor;

#[cfg(feature = "cli")]
pub use tracing_config::{TracingConfig, TracingFormat};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processor_builds_without_loading_model() {
        let processor = CutoutProcessor::new(&CutoutConfig::default()).unwrap();
        assert!(!processor.session().is_initialized());
    }
}
