//! Remote artifact downloads over HTTP
//!
//! Objects live at `{base_url}/v{version}/{file_name}`. Bodies are streamed
//! into a `.part` file next to the destination and renamed into place only
//! after the whole body arrived, so an interrupted download never looks like
//! a cached artifact.

use super::cache::{CacheLayout, partial_path};
use super::events::{EventSink, RegistryEvent};
use super::source::{RemoteSource, ResolvedPaths};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::metrics;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Smallest gap between two progress events
const PROGRESS_STEP_BYTES: u64 = 4 * 1024 * 1024;

/// Upper bound on progress events per file when the length is known
const PROGRESS_EVENTS_PER_FILE: u64 = 100;

/// Bytes between progress events for a body of `total_bytes`
///
/// Known lengths are split into at most `PROGRESS_EVENTS_PER_FILE` steps so
/// large artifacts stay well inside the event channel's capacity. Unknown
/// lengths fall back to fixed 4 MiB steps.
fn progress_step(total_bytes: Option<u64>) -> u64 {
    match total_bytes {
        Some(total) => PROGRESS_STEP_BYTES.max(total.div_ceil(PROGRESS_EVENTS_PER_FILE)),
        None => PROGRESS_STEP_BYTES,
    }
}

/// Remote source backed by a plain HTTP(S) object store
pub struct HttpRemoteSource {
    client: reqwest::Client,
    base_url: String,
    cache: CacheLayout,
}

impl HttpRemoteSource {
    /// Create a source with explicit connect and read timeouts
    pub fn new(
        base_url: impl Into<String>,
        cache: CacheLayout,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> RegistryResult<Self> {
        let base_url = base_url.into();
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .user_agent(concat!("dermai/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::DownloadFailed {
                url: base_url.clone(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    pub fn from_config(config: &RegistryConfig) -> RegistryResult<Self> {
        Self::new(
            config.remote_base_url.clone(),
            CacheLayout::managed(config),
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.read_timeout_secs),
        )
    }

    /// URL of one object of a version
    pub fn object_url(&self, version: u32, file_name: &str) -> String {
        format!("{}/v{}/{}", self.base_url, version, file_name)
    }

    /// Download one object to `dest`
    async fn download_file(
        &self,
        version: u32,
        file_name: &str,
        dest: &Path,
        events: &EventSink,
    ) -> RegistryResult<u64> {
        let url = self.object_url(version, file_name);
        let partial = partial_path(dest);

        tracing::info!(version, url = %url, dest = ?dest, "Starting download");

        let bytes = match self
            .stream_to_file(version, file_name, &url, &partial, events)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        fs::rename(&partial, dest)
            .await
            .map_err(|e| RegistryError::write(dest, e))?;

        events.emit(RegistryEvent::DownloadCompleted {
            version,
            file: file_name.to_string(),
            bytes,
        });
        metrics::record_download(file_name, bytes);
        tracing::info!(version, file = %file_name, bytes, "Download complete");

        Ok(bytes)
    }

    async fn stream_to_file(
        &self,
        version: u32,
        file_name: &str,
        url: &str,
        partial: &Path,
        events: &EventSink,
    ) -> RegistryResult<u64> {
        let failed = |reason: String| RegistryError::DownloadFailed {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(describe_transport_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("HTTP {}", status)));
        }

        let total_bytes = response.content_length();
        events.emit(RegistryEvent::DownloadStarted {
            version,
            file: file_name.to_string(),
            total_bytes,
        });

        let mut file = fs::File::create(partial)
            .await
            .map_err(|e| RegistryError::write(partial, e))?;

        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let step = progress_step(total_bytes);
        let mut next_report = step;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| failed(describe_transport_error(&e)))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| RegistryError::write(partial, e))?;
            downloaded += chunk.len() as u64;

            if downloaded >= next_report {
                next_report = downloaded + step;
                tracing::debug!(
                    version,
                    file = %file_name,
                    downloaded,
                    total = ?total_bytes,
                    "Download progress"
                );
                events.emit(RegistryEvent::DownloadProgress {
                    version,
                    file: file_name.to_string(),
                    downloaded_bytes: downloaded,
                    total_bytes,
                });
            }
        }

        file.flush()
            .await
            .map_err(|e| RegistryError::write(partial, e))?;
        file.sync_all()
            .await
            .map_err(|e| RegistryError::write(partial, e))?;

        if let Some(total) = total_bytes
            && downloaded != total
        {
            return Err(failed(format!(
                "truncated body: received {} of {} bytes",
                downloaded, total
            )));
        }

        Ok(downloaded)
    }

    /// Fetch the model card if the store has one
    ///
    /// Cards are optional: a 404 or any other failure only loses the
    /// training date and accuracy, never the resolution.
    async fn fetch_card(&self, version: u32, events: &EventSink) {
        let file_name = self.cache.card_file_name(version);
        let url = self.object_url(version, &file_name);

        match self.client.head(&url).send().await {
            Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                tracing::debug!(version, url = %url, "No model card published");
                return;
            }
            Ok(response) if !response.status().is_success() => {
                tracing::debug!(
                    version,
                    url = %url,
                    status = %response.status(),
                    "Model card unavailable"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(version, url = %url, error = %e, "Failed to check for model card");
                return;
            }
            Ok(_) => {}
        }

        let dest = self.cache.card_path(version);
        if let Err(e) = self.download_file(version, &file_name, &dest, events).await {
            tracing::warn!(version, error = %e, "Failed to download model card");
        }
    }
}

#[async_trait]
impl RemoteSource for HttpRemoteSource {
    async fn fetch(&self, version: u32, events: &EventSink) -> RegistryResult<ResolvedPaths> {
        fs::create_dir_all(self.cache.root())
            .await
            .map_err(|e| RegistryError::write(self.cache.root(), e))?;

        let labels_path = self.cache.labels_path(version);
        let artifact_path = self.cache.artifact_path(version);

        let fetched = async {
            self.download_file(
                version,
                &self.cache.labels_file_name(version),
                &labels_path,
                events,
            )
            .await?;
            self.download_file(
                version,
                &self.cache.artifact_file_name(version),
                &artifact_path,
                events,
            )
            .await
        }
        .await;

        if let Err(e) = fetched {
            // Labels without fresh weights are not a usable cache entry
            let _ = fs::remove_file(&labels_path).await;
            metrics::record_download_failure();
            events.emit(RegistryEvent::DownloadFailed {
                version,
                reason: e.to_string(),
            });
            tracing::error!(version, error = %e, "Model download failed");
            return Err(e);
        }

        self.fetch_card(version, events).await;

        Ok(ResolvedPaths {
            artifact_path,
            labels_path,
        })
    }
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    }
}
