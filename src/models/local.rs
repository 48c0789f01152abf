//! Local development source
//!
//! During development model files are iterated on in place in a directory
//! next to the checkout. When both files for a version are there, they are
//! copied into the managed cache instead of downloading anything.

use super::cache::{CacheLayout, partial_path};
use super::source::ResolvedPaths;
use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use std::path::Path;
use tokio::fs;

pub struct LocalDevSource {
    dev: CacheLayout,
    cache: CacheLayout,
}

impl LocalDevSource {
    pub fn new(dev: CacheLayout, cache: CacheLayout) -> Self {
        Self { dev, cache }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(CacheLayout::local_dev(config), CacheLayout::managed(config))
    }

    /// Copy the artifact and labels of `version` into the managed cache
    ///
    /// Returns `Ok(None)` without touching anything when either dev file is
    /// missing, so the caller can fall through to the next tier.
    pub async fn try_copy(&self, version: u32) -> RegistryResult<Option<ResolvedPaths>> {
        let source_artifact = self.dev.artifact_path(version);
        let source_labels = self.dev.labels_path(version);

        tracing::debug!(
            version,
            artifact = ?source_artifact,
            labels = ?source_labels,
            "Looking for local dev files"
        );

        if !source_artifact.is_file() || !source_labels.is_file() {
            tracing::debug!(version, dev_dir = ?self.dev.root(), "Local dev files not found");
            return Ok(None);
        }

        fs::create_dir_all(self.cache.root())
            .await
            .map_err(|e| RegistryError::write(self.cache.root(), e))?;

        let artifact_path = self.cache.artifact_path(version);
        let labels_path = self.cache.labels_path(version);

        copy_into_place(&source_artifact, &artifact_path).await?;
        copy_into_place(&source_labels, &labels_path).await?;

        // The card is optional
        let source_card = self.dev.card_path(version);
        if source_card.is_file()
            && let Err(e) = copy_into_place(&source_card, &self.cache.card_path(version)).await
        {
            tracing::warn!(version, error = %e, "Failed to copy model card");
        }

        tracing::info!(version, dev_dir = ?self.dev.root(), "Installed model from local dev files");

        Ok(Some(ResolvedPaths {
            artifact_path,
            labels_path,
        }))
    }
}

/// Copy `src` to `dest` through a `.part` file so `dest` only ever holds a
/// complete copy
async fn copy_into_place(src: &Path, dest: &Path) -> RegistryResult<()> {
    let partial = partial_path(dest);

    if let Err(e) = fs::copy(src, &partial).await {
        let _ = fs::remove_file(&partial).await;
        return Err(RegistryError::write(dest, e));
    }

    fs::rename(&partial, dest)
        .await
        .map_err(|e| RegistryError::write(dest, e))
}
