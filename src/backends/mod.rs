//! Model runtimes for the matting engine
//!
//! - Tract backend (pure Rust, default)
//! - ONNX Runtime backend (native library, `onnx` feature)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

use crate::{
    config::{BackendType, ModelConfig},
    error::{CutoutError, Result},
    inference::MattingBackend,
};
use std::{path::Path, sync::Arc};

/// Load the model at `model_path` with the configured runtime
///
/// # Errors
/// - `InvalidConfig` if the runtime was not compiled in
/// - `Model` or `Io` if the model cannot be loaded
pub fn create_backend(config: &ModelConfig, model_path: &Path) -> Result<Arc<dyn MattingBackend>> {
    match config.backend {
        #[cfg(feature = "tract")]
        BackendType::Tract => {
            let runtime = TractBackend::from_file(model_path)?;
            Ok(Arc::new(crate::inference::ModelMatting::new(runtime)))
        },
        #[cfg(feature = "onnx")]
        BackendType::Onnx => {
            let runtime = OnnxBackend::from_file(model_path, config.intra_threads)?;
            Ok(Arc::new(crate::inference::ModelMatting::new(runtime)))
        },
        #[allow(unreachable_patterns)]
        other => Err(CutoutError::invalid_config(format!(
            "{other} backend is not compiled in; rebuild with --features {other}"
        ))),
    }
}
