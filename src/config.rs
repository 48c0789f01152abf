//! Configuration structures and loading logic

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Registry configuration
///
/// Every path the registry touches comes from here, so tests can point the
/// whole cache at a temporary directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Managed cache holding `model_index.json` and the per-version files
    pub models_dir: PathBuf,
    /// Development directory checked before the cache when `prefer_local_dev` is set
    pub local_dev_dir: PathBuf,
    /// Base URL of the versioned artifact store
    pub remote_base_url: String,
    pub artifact_prefix: String,
    pub artifact_extension: String,
    pub labels_prefix: String,
    pub card_prefix: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub prefer_local_dev: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            local_dev_dir: default_local_dev_dir(),
            remote_base_url: default_remote_base_url(),
            artifact_prefix: default_artifact_prefix(),
            artifact_extension: default_artifact_extension(),
            labels_prefix: default_labels_prefix(),
            card_prefix: default_card_prefix(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            prefer_local_dev: true,
        }
    }
}

impl RegistryConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        if let Ok(dir) = std::env::var("DERMAI_MODELS_DIR") {
            config.models_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("DERMAI_LOCAL_DEV_DIR") {
            config.local_dev_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("DERMAI_REMOTE_BASE_URL") {
            config.remote_base_url = url;
        }
        if let Ok(flag) = std::env::var("DERMAI_PREFER_LOCAL_DEV") {
            config.prefer_local_dev = flag
                .parse()
                .context("Invalid DERMAI_PREFER_LOCAL_DEV value (expected true or false)")?;
        }

        Ok(config)
    }

    /// Validate configuration and create the managed cache directory
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("artifact_prefix", &self.artifact_prefix),
            ("artifact_extension", &self.artifact_extension),
            ("labels_prefix", &self.labels_prefix),
            ("card_prefix", &self.card_prefix),
        ] {
            if value.is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            if value.contains('/') || value.contains('\\') {
                anyhow::bail!("{} '{}' cannot contain path separators", name, value);
            }
        }

        if !(self.remote_base_url.starts_with("http://")
            || self.remote_base_url.starts_with("https://"))
        {
            anyhow::bail!(
                "remote_base_url must be an http(s) URL (got '{}')",
                self.remote_base_url
            );
        }

        if self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 {
            anyhow::bail!("Download timeouts must be greater than zero");
        }

        if !self.models_dir.exists() {
            std::fs::create_dir_all(&self.models_dir).with_context(|| {
                format!("Cannot create models directory: {:?}", self.models_dir)
            })?;
        }

        Ok(())
    }
}

// Default functions
fn default_models_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".dermai/models"))
        .unwrap_or_else(|| PathBuf::from("/tmp/dermai/models"))
}
fn default_local_dev_dir() -> PathBuf {
    PathBuf::from("model")
}
fn default_remote_base_url() -> String {
    "https://dermai-models.s3.amazonaws.com/releases".to_string()
}
fn default_artifact_prefix() -> String {
    "dermai_model".to_string()
}
fn default_artifact_extension() -> String {
    "onnx".to_string()
}
fn default_labels_prefix() -> String {
    "classes".to_string()
}
fn default_card_prefix() -> String {
    "model_card".to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_read_timeout() -> u64 {
    60
}
