//! Inference over resolved models
//!
//! - Fixed preprocessing pipeline
//! - Opaque classifier capability with an ONNX backend
//! - Batch prediction with per-image sentinels

pub mod classifier;
pub mod preprocess;
pub mod session;

pub use classifier::{Classifier, ClassifierBackend, OnnxBackend};
pub use preprocess::{ImageTensor, load_image, preprocess};
pub use session::{Bundle, InferenceSession, PredictionResult, PredictionStatus};
