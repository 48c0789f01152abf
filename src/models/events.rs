//! Registry events
//!
//! Resolution emits typed events on a broadcast channel in addition to its
//! tracing output. Subscribers (tests, progress displays) receive them without
//! scraping log text.

use tokio::sync::broadcast;

/// Events that occur while resolving and registering models
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    /// Files were copied from the local development directory
    LocalDevCopied { version: u32 },
    /// Both files were already in the managed cache
    CacheHit { version: u32 },
    DownloadStarted {
        version: u32,
        file: String,
        total_bytes: Option<u64>,
    },
    DownloadProgress {
        version: u32,
        file: String,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    },
    DownloadCompleted {
        version: u32,
        file: String,
        bytes: u64,
    },
    DownloadFailed { version: u32, reason: String },
    /// Registration finished; `inserted` is false when the record already existed
    Registered {
        version: u32,
        num_classes: usize,
        inserted: bool,
    },
    /// Unknown training date or accuracy filled in from a model card
    MetadataCompleted { version: u32 },
    /// A stale class count in the index was replaced with the live one
    NumClassesRefreshed {
        version: u32,
        previous: usize,
        current: usize,
    },
}

/// Sending half of the event channel
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<RegistryEvent>,
}

impl EventSink {
    /// Capacity of 256 covers a full resolution including progress events
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: RegistryEvent) {
        tracing::trace!(event = ?event, "Registry event");
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}
