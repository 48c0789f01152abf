//! Managed cache layout
//!
//! Every version owns a fixed set of file names inside a single directory:
//! ```text
//! ~/.dermai/models/
//! ├── model_index.json
//! ├── model_index.lock
//! ├── dermai_model_v1.onnx
//! ├── classes_v1.txt
//! └── model_card_v1.json      (optional)
//! ```
//! The local development directory uses the same naming convention, so a
//! `CacheLayout` describes both.

use crate::config::RegistryConfig;
use std::path::{Path, PathBuf};

const INDEX_FILE_NAME: &str = "model_index.json";
const LOCK_FILE_NAME: &str = "model_index.lock";

/// Suffix for files that are still being written
pub const PARTIAL_SUFFIX: &str = ".part";

/// File naming convention rooted at one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
    artifact_prefix: String,
    artifact_extension: String,
    labels_prefix: String,
    card_prefix: String,
}

impl CacheLayout {
    pub fn new(
        root: impl Into<PathBuf>,
        artifact_prefix: impl Into<String>,
        artifact_extension: impl Into<String>,
        labels_prefix: impl Into<String>,
        card_prefix: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            artifact_prefix: artifact_prefix.into(),
            artifact_extension: artifact_extension.into(),
            labels_prefix: labels_prefix.into(),
            card_prefix: card_prefix.into(),
        }
    }

    /// Layout of the managed cache
    pub fn managed(config: &RegistryConfig) -> Self {
        Self::with_root(config, &config.models_dir)
    }

    /// Layout of the local development directory
    pub fn local_dev(config: &RegistryConfig) -> Self {
        Self::with_root(config, &config.local_dev_dir)
    }

    fn with_root(config: &RegistryConfig, root: &Path) -> Self {
        Self::new(
            root,
            config.artifact_prefix.as_str(),
            config.artifact_extension.as_str(),
            config.labels_prefix.as_str(),
            config.card_prefix.as_str(),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// e.g. `dermai_model_v3.onnx`
    pub fn artifact_file_name(&self, version: u32) -> String {
        format!(
            "{}_v{}.{}",
            self.artifact_prefix, version, self.artifact_extension
        )
    }

    /// e.g. `classes_v3.txt`
    pub fn labels_file_name(&self, version: u32) -> String {
        format!("{}_v{}.txt", self.labels_prefix, version)
    }

    /// e.g. `model_card_v3.json`
    pub fn card_file_name(&self, version: u32) -> String {
        format!("{}_v{}.json", self.card_prefix, version)
    }

    pub fn artifact_path(&self, version: u32) -> PathBuf {
        self.root.join(self.artifact_file_name(version))
    }

    pub fn labels_path(&self, version: u32) -> PathBuf {
        self.root.join(self.labels_file_name(version))
    }

    pub fn card_path(&self, version: u32) -> PathBuf {
        self.root.join(self.card_file_name(version))
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE_NAME)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }

    /// Both the artifact and the labels file are present
    pub fn is_complete(&self, version: u32) -> bool {
        self.artifact_path(version).is_file() && self.labels_path(version).is_file()
    }

    /// Combined size of the artifact and labels file, if both exist
    pub fn installed_size(&self, version: u32) -> Option<u64> {
        let artifact = std::fs::metadata(self.artifact_path(version)).ok()?;
        let labels = std::fs::metadata(self.labels_path(version)).ok()?;
        Some(artifact.len() + labels.len())
    }
}

/// Sibling path used while a file is being written
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}
