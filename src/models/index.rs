//! Persisted model index
//!
//! `model_index.json` maps each installed version to its artifact path and
//! metadata. Every mutation rewrites the whole document through a
//! write-to-temp-then-rename, and runs under an exclusive lock on
//! `model_index.lock` so concurrent CLI processes do not lose each other's
//! updates.

use super::cache::CacheLayout;
use super::metadata::{ModelCard, ModelMetadata};
use crate::error::{RegistryError, RegistryResult};
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// One installed model version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledModelRecord {
    pub version: u32,
    /// Weights artifact
    pub path: PathBuf,
    pub metadata: ModelMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct IndexDocument {
    #[serde(default)]
    installed_models: Vec<InstalledModelRecord>,
}

#[derive(Serialize)]
struct IndexDocumentRef<'a> {
    installed_models: &'a [InstalledModelRecord],
}

// ============================================================================
// Trait Definitions
// ============================================================================

/// Exclusive lock on the index; released on drop
#[derive(Debug)]
pub struct IndexLock {
    file: Option<File>,
}

impl IndexLock {
    /// A lock that guards nothing, for backends without a filesystem
    pub fn unlocked() -> Self {
        Self { file: None }
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take()
            && let Err(e) = FileExt::unlock(&file)
        {
            tracing::warn!(error = %e, "Failed to release model index lock");
        }
    }
}

/// Trait for storage backend operations
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Save content to a file path atomically
    async fn save(&self, path: &Path, content: &str) -> RegistryResult<()>;

    /// Load content from a file path
    /// Returns None if file doesn't exist
    async fn load(&self, path: &Path) -> RegistryResult<Option<String>>;

    /// Take an exclusive lock, blocking until other holders release it
    async fn lock(&self, path: &Path) -> RegistryResult<IndexLock>;
}

// ============================================================================
// Production Implementation
// ============================================================================

/// Production storage backend using tokio::fs
pub struct FileSystemStorage;

impl FileSystemStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FileSystemStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for FileSystemStorage {
    async fn save(&self, path: &Path, content: &str) -> RegistryResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| RegistryError::write(parent, e))?;
        }

        // Atomic write: write to temp file, then rename
        let temp_file = path.with_extension(format!("json.{}.tmp", std::process::id()));

        let written = async {
            let mut file = fs::File::create(&temp_file).await?;
            file.write_all(content.as_bytes()).await?;
            file.sync_all().await?;
            fs::rename(&temp_file, path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_file).await;
            return Err(RegistryError::write(path, e));
        }

        Ok(())
    }

    async fn load(&self, path: &Path) -> RegistryResult<Option<String>> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RegistryError::io(path, e)),
        }
    }

    async fn lock(&self, path: &Path) -> RegistryResult<IndexLock> {
        let lock_path = path.to_path_buf();
        let locked = tokio::task::spawn_blocking(move || {
            if let Some(parent) = lock_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            file.lock_exclusive()?;
            Ok::<_, std::io::Error>(file)
        })
        .await
        .map_err(|e| RegistryError::io(path, std::io::Error::other(e)))?;

        let file = locked.map_err(|e| RegistryError::io(path, e))?;
        Ok(IndexLock { file: Some(file) })
    }
}

// ============================================================================
// Model Index
// ============================================================================

/// Persisted mapping from version to installation record
pub struct ModelIndex {
    path: PathBuf,
    lock_path: PathBuf,
    storage: Arc<dyn StorageBackend>,
}

impl ModelIndex {
    /// Create an index with a custom storage backend
    pub fn new_with_storage(layout: &CacheLayout, storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            path: layout.index_path(),
            lock_path: layout.lock_path(),
            storage,
        }
    }

    /// Create an index backed by the filesystem
    pub fn new(layout: &CacheLayout) -> Self {
        Self::new_with_storage(layout, Arc::new(FileSystemStorage::new()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records in insertion order
    ///
    /// An absent document is an empty index. A document that exists but does
    /// not parse FAILS HARD with `CorruptIndex`; the history is never
    /// discarded silently.
    pub async fn load(&self) -> RegistryResult<Vec<InstalledModelRecord>> {
        let Some(content) = self.storage.load(&self.path).await? else {
            tracing::debug!(path = ?self.path, "No model index found, starting empty");
            return Ok(Vec::new());
        };

        let document: IndexDocument =
            serde_json::from_str(&content).map_err(|source| RegistryError::CorruptIndex {
                path: self.path.clone(),
                source,
            })?;

        Ok(document.installed_models)
    }

    /// Overwrite the document with `records`
    pub async fn save(&self, records: &[InstalledModelRecord]) -> RegistryResult<()> {
        let content = serde_json::to_string_pretty(&IndexDocumentRef {
            installed_models: records,
        })
        .map_err(|e| RegistryError::write(&self.path, std::io::Error::other(e)))?;

        self.storage.save(&self.path, &content).await?;

        tracing::debug!(path = ?self.path, records = records.len(), "Model index saved");
        Ok(())
    }

    /// Insert a record unless the version is already present
    ///
    /// First write wins: an existing record is left untouched, whatever the
    /// new path and metadata. Returns whether a record was added.
    pub async fn insert(
        &self,
        version: u32,
        path: &Path,
        metadata: ModelMetadata,
    ) -> RegistryResult<bool> {
        let _lock = self.storage.lock(&self.lock_path).await?;

        let mut records = self.load().await?;
        if records.iter().any(|r| r.version == version) {
            tracing::debug!(version, "Model already registered");
            return Ok(false);
        }

        records.push(InstalledModelRecord {
            version,
            path: path.to_path_buf(),
            metadata,
        });
        self.save(&records).await?;

        tracing::info!(version, path = ?path, "Model registered");
        Ok(true)
    }

    pub async fn find(&self, version: u32) -> RegistryResult<Option<InstalledModelRecord>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|r| r.version == version))
    }

    /// Replace the stored class count of an existing record
    ///
    /// Returns the previous count when it changed, `None` when the record is
    /// absent or already up to date (nothing is written in that case).
    pub async fn refresh_num_classes(
        &self,
        version: u32,
        num_classes: usize,
    ) -> RegistryResult<Option<usize>> {
        let _lock = self.storage.lock(&self.lock_path).await?;

        let mut records = self.load().await?;
        let Some(record) = records.iter_mut().find(|r| r.version == version) else {
            return Ok(None);
        };
        if record.metadata.num_classes == num_classes {
            return Ok(None);
        }

        let previous = std::mem::replace(&mut record.metadata.num_classes, num_classes);
        self.save(&records).await?;

        tracing::info!(version, previous, current = num_classes, "Refreshed class count");
        Ok(Some(previous))
    }

    /// Fill a record's unknown training date and accuracy from `card`
    ///
    /// Known values are kept. Returns whether the record changed; nothing is
    /// written otherwise.
    pub async fn fill_unknown_metadata(
        &self,
        version: u32,
        card: &ModelCard,
    ) -> RegistryResult<bool> {
        let _lock = self.storage.lock(&self.lock_path).await?;

        let mut records = self.load().await?;
        let Some(record) = records.iter_mut().find(|r| r.version == version) else {
            return Ok(false);
        };
        if !record.metadata.fill_unknown_from(card) {
            return Ok(false);
        }

        self.save(&records).await?;

        tracing::info!(version, "Completed model metadata from card");
        Ok(true)
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================
