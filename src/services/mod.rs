//! Service layer for the cutout pipeline
//!
//! Each pipeline stage lives in its own service so it can be tested without
//! the others: fetching, decoding, alpha analysis, fallback compositing and
//! encoding.

pub mod analysis;
pub mod compose;
pub mod decode;
pub mod encode;
pub mod fetch;

pub use analysis::TransparencyAnalyzer;
pub use compose::FallbackCompositor;
pub use decode::SourceDecoder;
pub use encode::PngOutputEncoder;
pub use fetch::{FetchedImage, SourceFetcher};
