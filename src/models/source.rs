//! Artifact sources
//!
//! The resolver materializes a version's files from one of two places: the
//! local development directory ([`LocalDevSource`](super::local::LocalDevSource))
//! or a remote store behind [`RemoteSource`].

use super::events::EventSink;
use crate::error::RegistryResult;
use async_trait::async_trait;
use std::path::PathBuf;

/// Files of one version inside the managed cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub artifact_path: PathBuf,
    pub labels_path: PathBuf,
}

/// Remote store holding two objects (weights, labels) per version
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Download the weights and labels of `version` into the managed cache
    ///
    /// Fails with `DownloadFailed` on any network, HTTP status, timeout or
    /// truncated transfer. A failed fetch leaves no file at the destination
    /// paths that a later resolution could mistake for a complete download.
    async fn fetch(&self, version: u32, events: &EventSink) -> RegistryResult<ResolvedPaths>;
}
