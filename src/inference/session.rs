//! Inference session
//!
//! A [`Bundle`] pairs a loaded classifier with its ordered class names. It is
//! immutable once built and can serve any number of batches. Per-image
//! failures never abort a batch: they become sentinel results with zero
//! confidence, in input order.

use super::classifier::{Classifier, ClassifierBackend};
use super::preprocess::load_image;
use crate::error::{RegistryError, RegistryResult};
use crate::metrics;
use crate::models::labels::read_labels;
use crate::models::resolver::ResolvedModel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub const FILE_NOT_FOUND_LABEL: &str = "file not found";
pub const UNREADABLE_IMAGE_LABEL: &str = "unreadable image";
pub const INFERENCE_FAILED_LABEL: &str = "inference failed";

/// Outcome of one image in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Ok,
    FileNotFound,
    UnreadableImage,
    InferenceFailed,
}

/// Prediction for one image reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub image: String,
    /// Class name, or a sentinel label when `status` is not `Ok`
    pub prediction: String,
    /// Probability of `prediction`, rounded to 4 decimals; 0 for sentinels
    pub confidence: f64,
    pub status: PredictionStatus,
}

impl PredictionResult {
    fn sentinel(image: String, status: PredictionStatus) -> Self {
        let label = match status {
            PredictionStatus::FileNotFound => FILE_NOT_FOUND_LABEL,
            PredictionStatus::UnreadableImage => UNREADABLE_IMAGE_LABEL,
            PredictionStatus::InferenceFailed | PredictionStatus::Ok => INFERENCE_FAILED_LABEL,
        };
        Self {
            image,
            prediction: label.to_string(),
            confidence: 0.0,
            status,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.status != PredictionStatus::Ok
    }
}

impl fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({:.1}%)",
            self.image,
            self.prediction,
            self.confidence * 100.0
        )
    }
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp_values: Vec<f32> = logits.iter().map(|&x| (x - max_logit).exp()).collect();
    let sum: f32 = exp_values.iter().sum();
    exp_values.iter().map(|&x| x / sum).collect()
}

/// Index and probability of the most likely class; first index wins ties
pub fn arg_max(probabilities: &[f32]) -> Option<(usize, f32)> {
    probabilities
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, p)| match best {
            Some((_, best_p)) if best_p >= p => best,
            _ => Some((i, p)),
        })
}

pub fn round_confidence(probability: f32) -> f64 {
    (f64::from(probability) * 10_000.0).round() / 10_000.0
}

/// Classifier plus ordered class names
pub struct Bundle {
    classifier: Box<dyn Classifier>,
    class_names: Vec<String>,
}

impl Bundle {
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Predict each image in order
    pub fn predict_batch<P: AsRef<Path>>(&self, images: &[P]) -> Vec<PredictionResult> {
        let results: Vec<PredictionResult> = images
            .iter()
            .map(|image| self.predict_one(image.as_ref()))
            .collect();

        let degraded = results.iter().filter(|r| r.is_degraded()).count();
        metrics::record_predictions(results.len(), degraded);
        tracing::info!(images = results.len(), degraded, "Batch prediction complete");

        results
    }

    fn predict_one(&self, path: &Path) -> PredictionResult {
        let image = path.display().to_string();

        if !path.is_file() {
            tracing::warn!(image = %image, "Image file not found");
            return PredictionResult::sentinel(image, PredictionStatus::FileNotFound);
        }

        let tensor = match load_image(path) {
            Ok(tensor) => tensor,
            Err(e) => {
                tracing::warn!(image = %image, error = %e, "Failed to decode image");
                return PredictionResult::sentinel(image, PredictionStatus::UnreadableImage);
            }
        };

        let logits = match self.classifier.forward(&tensor) {
            Ok(logits) if logits.len() == self.class_names.len() => logits,
            Ok(logits) => {
                tracing::error!(
                    image = %image,
                    outputs = logits.len(),
                    classes = self.class_names.len(),
                    "Classifier output width does not match class names"
                );
                return PredictionResult::sentinel(image, PredictionStatus::InferenceFailed);
            }
            Err(e) => {
                tracing::error!(image = %image, error = %e, "Inference failed");
                return PredictionResult::sentinel(image, PredictionStatus::InferenceFailed);
            }
        };

        let probabilities = softmax(&logits);
        match arg_max(&probabilities) {
            Some((index, probability)) => {
                tracing::debug!(
                    image = %image,
                    class = %self.class_names[index],
                    probability,
                    "Prediction"
                );
                PredictionResult {
                    image,
                    prediction: self.class_names[index].clone(),
                    confidence: round_confidence(probability),
                    status: PredictionStatus::Ok,
                }
            }
            None => PredictionResult::sentinel(image, PredictionStatus::InferenceFailed),
        }
    }
}

/// Builds bundles with one classifier backend
#[derive(Clone)]
pub struct InferenceSession {
    backend: Arc<dyn ClassifierBackend>,
}

impl InferenceSession {
    pub fn new(backend: Arc<dyn ClassifierBackend>) -> Self {
        Self { backend }
    }

    /// Load a bundle from an artifact and its labels file
    ///
    /// Fails with `LabelsNotFound` when the labels file is absent and with
    /// `WeightsLoadError` when the weights cannot back one output per label.
    pub fn load(&self, artifact_path: &Path, labels_path: &Path) -> RegistryResult<Bundle> {
        let class_names = read_labels(labels_path)?;
        let classifier = self.backend.load(artifact_path, class_names.len())?;

        if classifier.num_classes() != class_names.len() {
            return Err(RegistryError::WeightsLoadError {
                path: artifact_path.to_path_buf(),
                reason: format!(
                    "class count mismatch: weights have {} outputs, labels list {} classes",
                    classifier.num_classes(),
                    class_names.len()
                ),
            });
        }

        tracing::info!(artifact = ?artifact_path, classes = class_names.len(), "Classifier loaded");

        Ok(Bundle {
            classifier,
            class_names,
        })
    }

    pub fn load_resolved(&self, model: &ResolvedModel) -> RegistryResult<Bundle> {
        self.load(&model.artifact_path, &model.labels_path)
    }
}
