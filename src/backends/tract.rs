//! Tract backend for the salient-object model
//!
//! Tract is a pure Rust ONNX runtime, so the default build needs no native
//! libraries. The model graph is optimized once at load time for a fixed
//! `[1, 3, 320, 320]` input; the resulting plan is immutable and can be run
//! from many threads at once.

use crate::{
    error::{CutoutError, Result},
    inference::InferenceBackend,
    utils::preprocessing::MODEL_INPUT_SIZE,
};
use ndarray::Array4;
use std::path::Path;
use tracing::{debug, info};
use tract_onnx::prelude::*;

// Use instant crate for cross-platform time compatibility
use instant::Instant;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Runs the matting model with Tract
#[derive(Debug)]
pub struct TractBackend {
    model: TractModel,
}

impl TractBackend {
    /// Load and optimize an ONNX model from disk
    ///
    /// # Errors
    /// - `Io` if the file cannot be read
    /// - `Model` if Tract cannot parse or optimize the graph
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| CutoutError::file_io_error("read model file", path, &e))?;
        info!(path = %path.display(), "loading model with tract");
        Self::from_bytes(&bytes)
    }

    /// Load and optimize an ONNX model held in memory
    ///
    /// # Errors
    /// - `Model` if Tract cannot parse or optimize the graph
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let start = Instant::now();
        let side = MODEL_INPUT_SIZE as usize;

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))
            .map_err(|e| CutoutError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .map_err(|e| CutoutError::model(format!("Failed to pin input shape: {e}")))?
            .into_optimized()
            .map_err(|e| CutoutError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| CutoutError::model(format!("Failed to create runnable model: {e}")))?;

        info!(
            size_mb = bytes.len() as f64 / (1024.0 * 1024.0),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tract model ready"
        );
        Ok(Self { model })
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let start = Instant::now();

        let data: Vec<f32> = input.iter().copied().collect();
        let input_tensor = Tensor::from_shape(input.shape(), &data)
            .map_err(|e| CutoutError::matting(format!("Failed to build input tensor: {e}")))?;

        let outputs = self
            .model
            .run(tvec![input_tensor.into()])
            .map_err(|e| CutoutError::matting(format!("Tract inference failed: {e}")))?;

        // The first output is the fused saliency map
        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| CutoutError::matting("No output tensor found"))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| CutoutError::matting(format!("Failed to read output tensor: {e}")))?;

        let shape = view.shape().to_vec();
        let &[n, c, h, w] = shape.as_slice() else {
            return Err(CutoutError::matting(format!(
                "Expected 4D output tensor, got {}D",
                shape.len()
            )));
        };
        let output_array = Array4::from_shape_vec((n, c, h, w), view.iter().copied().collect())
            .map_err(|e| CutoutError::matting(format!("Failed to reshape output tensor: {e}")))?;

        debug!(
            input = ?input.shape(),
            output = ?output_array.shape(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tract inference"
        );
        Ok(output_array)
    }
}
