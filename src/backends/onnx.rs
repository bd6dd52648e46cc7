//! ONNX Runtime backend for the salient-object model
//!
//! Available with the `onnx` feature. ONNX Runtime sessions need exclusive
//! access to run, so concurrent requests are serialized behind a mutex.

use crate::{
    error::{CutoutError, Result},
    inference::InferenceBackend,
};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::{path::Path, sync::Mutex};
use tracing::{debug, info};

// Use instant crate for cross-platform time compatibility
use instant::Instant;

/// Runs the matting model with ONNX Runtime on the CPU
pub struct OnnxBackend {
    session: Mutex<Session>,
}

impl OnnxBackend {
    /// Create a session for the model at `path`
    ///
    /// `intra_threads == 0` lets the runtime size its pool from the core count.
    ///
    /// # Errors
    /// - `Model` if ONNX Runtime cannot build the session
    pub fn from_file(path: &Path, intra_threads: usize) -> Result<Self> {
        let start = Instant::now();
        let intra_threads = if intra_threads > 0 {
            intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4)
        };

        let session = Session::builder()
            .map_err(|e| CutoutError::model(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| CutoutError::model(format!("Failed to set optimization level: {e}")))?
            .with_intra_threads(intra_threads)
            .map_err(|e| CutoutError::model(format!("Failed to set intra threads: {e}")))?
            .commit_from_file(path)
            .map_err(|e| {
                CutoutError::model(format!(
                    "Failed to create session from {}: {e}",
                    path.display()
                ))
            })?;

        info!(
            path = %path.display(),
            intra_threads,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "onnx runtime session ready"
        );
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl std::fmt::Debug for OnnxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxBackend").finish_non_exhaustive()
    }
}

impl InferenceBackend for OnnxBackend {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let start = Instant::now();

        let input_value = Value::from_array(input.clone())
            .map_err(|e| CutoutError::matting(format!("Failed to convert input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| CutoutError::matting("ONNX session lock poisoned"))?;

        // Positional inputs avoid depending on the graph's tensor names
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| CutoutError::matting(format!("ONNX inference failed: {e}")))?;

        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| CutoutError::matting("No output tensors found"))?;
        let output_tensor = outputs
            .get(first_key)
            .ok_or_else(|| CutoutError::matting("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| CutoutError::matting(format!("Failed to extract output tensor: {e}")))?;

        let shape = output_tensor.shape().to_vec();
        let &[n, c, h, w] = shape.as_slice() else {
            return Err(CutoutError::matting(format!(
                "Expected 4D output tensor, got {}D",
                shape.len()
            )));
        };
        let output_array =
            Array4::from_shape_vec((n, c, h, w), output_tensor.iter().copied().collect())
                .map_err(|e| {
                    CutoutError::matting(format!("Failed to reshape output tensor: {e}"))
                })?;

        debug!(
            input = ?input.shape(),
            output = ?output_array.shape(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "onnx inference"
        );
        Ok(output_array)
    }
}

#[cfg(all(test, feature = "onnx"))]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_model_error() {
        let err = OnnxBackend::from_file(Path::new("/nonexistent/u2net.onnx"), 1).unwrap_err();
        assert!(matches!(err, CutoutError::Model(_)));
    }

    #[test]
    fn test_auto_thread_count_reaches_session_load() {
        // 0 threads resolves from available parallelism before loading
        let err = OnnxBackend::from_file(Path::new("/nonexistent/u2net.onnx"), 0).unwrap_err();
        assert!(matches!(err, CutoutError::Model(_)));
    }
}
