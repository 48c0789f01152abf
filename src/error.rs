//! Error types for the model registry and inference bundle

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the registry, the artifact sources and the inference bundle
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The index document exists but cannot be parsed. Never rebuilt
    /// automatically, the operator has to fix or remove it.
    #[error("model index {path:?} is corrupt: {source}. Please fix or delete the file manually")]
    CorruptIndex {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download of {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Resolution could not materialize the files for a version
    #[error("model v{version} is unavailable: {cause}")]
    ModelUnavailable {
        version: u32,
        #[source]
        cause: Box<RegistryError>,
    },

    #[error("model v{0} not found")]
    ModelNotFound(u32),

    #[error("invalid model version {0}: versions start at 1")]
    InvalidVersion(u32),

    #[error("labels file not found: {0:?}")]
    LabelsNotFound(PathBuf),

    #[error("labels file {0:?} contains no class names")]
    EmptyLabels(PathBuf),

    #[error("failed to load weights from {path:?}: {reason}")]
    WeightsLoadError { path: PathBuf, reason: String },
}

impl RegistryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteError {
            path: path.into(),
            source,
        }
    }

    /// True for a lookup miss the caller is expected to report, not crash on
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ModelNotFound(_))
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
