//! Classifier capability
//!
//! The network itself is opaque: a backend builds a classifier from an
//! artifact with a given number of output classes, and the classifier maps a
//! preprocessed image to one score per class. [`OnnxBackend`] runs ONNX
//! exports with tract.

use super::preprocess::{INPUT_SHAPE, ImageTensor};
use crate::error::{RegistryError, RegistryResult};
use std::path::Path;
use tract_onnx::prelude::*;

/// A loaded classifier; shareable across threads once built
pub trait Classifier: Send + Sync {
    fn num_classes(&self) -> usize;

    /// Raw per-class scores (logits) for one image
    fn forward(&self, input: &ImageTensor) -> Result<Vec<f32>, String>;
}

/// Builds classifiers from weight artifacts
pub trait ClassifierBackend: Send + Sync {
    /// Fails with `WeightsLoadError` when the artifact is missing, unreadable,
    /// or its output width is not `num_classes`
    fn load(&self, artifact_path: &Path, num_classes: usize) -> RegistryResult<Box<dyn Classifier>>;
}

/// ONNX backend
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxBackend;

struct OnnxClassifier {
    plan: TypedRunnableModel<TypedModel>,
    num_classes: usize,
}

fn weights_error(path: &Path, reason: impl Into<String>) -> RegistryError {
    RegistryError::WeightsLoadError {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

impl ClassifierBackend for OnnxBackend {
    fn load(
        &self,
        artifact_path: &Path,
        num_classes: usize,
    ) -> RegistryResult<Box<dyn Classifier>> {
        if !artifact_path.is_file() {
            return Err(weights_error(artifact_path, "artifact file not found"));
        }

        tracing::debug!(artifact = ?artifact_path, num_classes, "Loading ONNX classifier");

        let model = tract_onnx::onnx()
            .model_for_path(artifact_path)
            .and_then(|m| m.with_input_fact(0, f32::fact(INPUT_SHAPE).into()))
            .and_then(|m| m.into_optimized())
            .map_err(|e| weights_error(artifact_path, format!("{:#}", e)))?;

        let output_width = model
            .output_fact(0)
            .ok()
            .and_then(|fact| fact.shape.as_concrete().and_then(|dims| dims.last().copied()));

        match output_width {
            Some(width) if width == num_classes => {}
            Some(width) => {
                return Err(weights_error(
                    artifact_path,
                    format!(
                        "class count mismatch: weights have {} outputs, labels list {} classes",
                        width, num_classes
                    ),
                ));
            }
            None => {
                return Err(weights_error(
                    artifact_path,
                    "output layer has no concrete shape",
                ));
            }
        }

        let plan = model
            .into_runnable()
            .map_err(|e| weights_error(artifact_path, format!("{:#}", e)))?;

        Ok(Box::new(OnnxClassifier { plan, num_classes }))
    }
}

impl Classifier for OnnxClassifier {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn forward(&self, input: &ImageTensor) -> Result<Vec<f32>, String> {
        let tensor = Tensor::from_shape(&input.shape(), input.as_slice())
            .map_err(|e| format!("Failed to create tensor: {}", e))?;

        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| format!("Forward pass failed: {}", e))?;

        let scores = outputs
            .first()
            .ok_or_else(|| "Model produced no outputs".to_string())?
            .to_array_view::<f32>()
            .map_err(|e| format!("Unexpected output type: {}", e))?;

        Ok(scores.iter().copied().collect())
    }
}
