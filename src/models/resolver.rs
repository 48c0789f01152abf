//! Model resolution
//!
//! `ensure_model_exists` guarantees a version's files are present in the
//! managed cache and registered in the index. Tiers are tried in order of
//! increasing cost:
//!
//! 1. local development copy (only when preferred; wins even over the cache)
//! 2. managed cache, when both files are already there
//! 3. remote download
//!
//! Whatever the tier, the class count is re-derived from the labels file on
//! every resolution and written back to the index if it went stale.

use super::cache::CacheLayout;
use super::download::HttpRemoteSource;
use super::events::{EventSink, RegistryEvent};
use super::index::{InstalledModelRecord, ModelIndex};
use super::labels::read_labels;
use super::local::LocalDevSource;
use super::metadata::{ModelMetadata, parse_model_card};
use super::source::{RemoteSource, ResolvedPaths};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::metrics;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Where a resolution found its files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    LocalDev,
    Cache,
    Remote,
}

impl ResolutionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalDev => "local_dev",
            Self::Cache => "cache",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A version whose files are present locally and registered
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    pub version: u32,
    pub artifact_path: PathBuf,
    pub labels_path: PathBuf,
    /// Index position is the classifier output index
    pub class_names: Vec<String>,
    pub tier: ResolutionTier,
}

impl ResolvedModel {
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }
}

/// Index record joined with the live content of its labels file
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub record: InstalledModelRecord,
    /// Live class count; `None` when the labels file is missing or unreadable
    pub num_classes: Option<usize>,
    pub class_names: Vec<String>,
}

impl fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metadata = &self.record.metadata;
        writeln!(f, "version: {}", self.record.version)?;
        writeln!(f, "path: {}", self.record.path.display())?;
        match self.num_classes {
            Some(n) => writeln!(f, "num_classes: {}", n)?,
            None => writeln!(f, "num_classes: unknown")?,
        }
        writeln!(f, "classes_file: {}", metadata.classes_file.display())?;
        match metadata.train_date {
            Some(d) => writeln!(f, "train_date: {}", d)?,
            None => writeln!(f, "train_date: unknown")?,
        }
        match metadata.accuracy {
            Some(a) => writeln!(f, "accuracy: {:.4}", a)?,
            None => writeln!(f, "accuracy: unknown")?,
        }
        write!(f, "classes: {}", self.class_names.join(", "))
    }
}

/// Resolves model versions against the index, the dev directory and the remote store
pub struct ModelResolver {
    cache: CacheLayout,
    index: ModelIndex,
    local_dev: Option<LocalDevSource>,
    remote: Arc<dyn RemoteSource>,
    events: EventSink,
}

impl ModelResolver {
    pub fn new(
        cache: CacheLayout,
        index: ModelIndex,
        local_dev: Option<LocalDevSource>,
        remote: Arc<dyn RemoteSource>,
    ) -> Self {
        Self {
            cache,
            index,
            local_dev,
            remote,
            events: EventSink::new(),
        }
    }

    /// Build a resolver with the filesystem index and the HTTP remote
    pub fn from_config(config: &RegistryConfig) -> RegistryResult<Self> {
        let cache = CacheLayout::managed(config);
        let index = ModelIndex::new(&cache);
        let remote = Arc::new(HttpRemoteSource::from_config(config)?);

        Ok(Self::new(
            cache,
            index,
            Some(LocalDevSource::from_config(config)),
            remote,
        ))
    }

    /// Subscribe to resolution events
    pub fn subscribe_events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    pub fn cache(&self) -> &CacheLayout {
        &self.cache
    }

    pub fn index(&self) -> &ModelIndex {
        &self.index
    }

    /// Make sure `version` is present locally and registered
    pub async fn ensure_model_exists(
        &self,
        version: u32,
        prefer_local_dev: bool,
    ) -> RegistryResult<ResolvedModel> {
        if version == 0 {
            return Err(RegistryError::InvalidVersion(version));
        }

        let (paths, tier) = self.materialize(version, prefer_local_dev).await?;
        let class_names = self.register(version, &paths).await?;

        metrics::record_resolution(tier.as_str());
        tracing::info!(
            version,
            tier = %tier,
            num_classes = class_names.len(),
            artifact = ?paths.artifact_path,
            "Model resolved"
        );

        Ok(ResolvedModel {
            version,
            artifact_path: paths.artifact_path,
            labels_path: paths.labels_path,
            class_names,
            tier,
        })
    }

    async fn materialize(
        &self,
        version: u32,
        prefer_local_dev: bool,
    ) -> RegistryResult<(ResolvedPaths, ResolutionTier)> {
        if prefer_local_dev
            && let Some(local) = &self.local_dev
            && let Some(paths) = local.try_copy(version).await?
        {
            self.events.emit(RegistryEvent::LocalDevCopied { version });
            return Ok((paths, ResolutionTier::LocalDev));
        }

        if self.cache.is_complete(version) {
            tracing::debug!(version, "Model already in managed cache");
            self.events.emit(RegistryEvent::CacheHit { version });
            return Ok((
                ResolvedPaths {
                    artifact_path: self.cache.artifact_path(version),
                    labels_path: self.cache.labels_path(version),
                },
                ResolutionTier::Cache,
            ));
        }

        tracing::info!(version, "Model not in managed cache, downloading");
        let paths = self
            .remote
            .fetch(version, &self.events)
            .await
            .map_err(|cause| RegistryError::ModelUnavailable {
                version,
                cause: Box::new(cause),
            })?;

        Ok((paths, ResolutionTier::Remote))
    }

    /// Register `paths` in the index and return the live class names
    async fn register(&self, version: u32, paths: &ResolvedPaths) -> RegistryResult<Vec<String>> {
        let class_names = read_labels(&paths.labels_path)?;
        let num_classes = class_names.len();

        let card = parse_model_card(&self.cache.card_path(version));
        let metadata = ModelMetadata {
            num_classes,
            classes_file: paths.labels_path.clone(),
            train_date: card.as_ref().and_then(|c| c.train_date),
            accuracy: card.as_ref().and_then(|c| c.accuracy),
        };

        let inserted = self
            .index
            .insert(version, &paths.artifact_path, metadata)
            .await?;

        if !inserted {
            if let Some(previous) = self.index.refresh_num_classes(version, num_classes).await? {
                self.events.emit(RegistryEvent::NumClassesRefreshed {
                    version,
                    previous,
                    current: num_classes,
                });
            }

            // A card published after the first registration completes it
            if let Some(card) = &card
                && self.index.fill_unknown_metadata(version, card).await?
            {
                self.events.emit(RegistryEvent::MetadataCompleted { version });
            }
        }

        self.events.emit(RegistryEvent::Registered {
            version,
            num_classes,
            inserted,
        });

        Ok(class_names)
    }

    /// Look up a version and read its labels file as it is now
    ///
    /// Fails with `ModelNotFound` for unregistered versions. A missing or
    /// unreadable labels file degrades to an unknown class count.
    pub async fn get_model_info(&self, version: u32) -> RegistryResult<ModelInfo> {
        let record = self
            .index
            .find(version)
            .await?
            .ok_or(RegistryError::ModelNotFound(version))?;

        let (num_classes, class_names) = match read_labels(&record.metadata.classes_file) {
            Ok(names) => (Some(names.len()), names),
            Err(e) => {
                tracing::warn!(version, error = %e, "Labels file unavailable, class count unknown");
                (None, Vec::new())
            }
        };

        Ok(ModelInfo {
            record,
            num_classes,
            class_names,
        })
    }

    /// All installed models in insertion order
    pub async fn list_models(&self) -> RegistryResult<Vec<InstalledModelRecord>> {
        self.index.load().await
    }
}
