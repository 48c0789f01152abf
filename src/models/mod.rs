//! Model management module
//!
//! Provides functionality for:
//! - Laying out versioned artifacts in the managed cache
//! - Persisting the installed-model index
//! - Copying models from the local development directory
//! - Downloading models from the remote artifact store
//! - Resolving a version to registered local files

pub mod cache;
pub mod download;
pub mod events;
pub mod index;
pub mod labels;
pub mod local;
pub mod metadata;
pub mod resolver;
pub mod source;

pub use cache::CacheLayout;
pub use download::HttpRemoteSource;
pub use events::{EventSink, RegistryEvent};
pub use index::{FileSystemStorage, InstalledModelRecord, ModelIndex, StorageBackend};
pub use labels::read_labels;
pub use local::LocalDevSource;
pub use metadata::{ModelCard, ModelMetadata, parse_model_card};
pub use resolver::{ModelInfo, ModelResolver, ResolutionTier, ResolvedModel};
pub use source::{RemoteSource, ResolvedPaths};
