//! DermAI - Versioned skin-lesion classifier registry
//!
//! Resolves a model version to local weights and class labels (development
//! directory, managed cache, or remote artifact store), keeps a persistent
//! index of installed versions, and runs batch image classification with the
//! resolved model.

pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod metrics;
pub mod models;

pub use config::RegistryConfig;
pub use error::{RegistryError, RegistryResult};
pub use inference::{Bundle, InferenceSession, OnnxBackend, PredictionResult, PredictionStatus};
pub use models::{
    InstalledModelRecord, ModelIndex, ModelInfo, ModelMetadata, ModelResolver, RegistryEvent,
    ResolutionTier, ResolvedModel,
};
