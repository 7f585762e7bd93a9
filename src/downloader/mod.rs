//! Orchestration over the source downloaders, split into focused submodules.
//!
//! The `ObjaverseDownloader` struct and its methods are organized by domain:
//! - [`annotations`] - Annotation aggregation across sources
//! - [`dispatch`] - Request validation, partitioning and result merging

mod annotations;
mod dispatch;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use dispatch::DownloadOptions;

use crate::config::Config;
use crate::error::Result;
use crate::sources::SourceTable;
use crate::types::Event;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Downloads Objaverse-XL objects and annotations across all sources
///
/// Cheap to clone; clones share configuration, downloaders and the event
/// channel.
#[derive(Clone)]
pub struct ObjaverseDownloader {
    /// Configuration (wrapped in Arc for sharing)
    pub(crate) config: Arc<Config>,
    /// Exactly one downloader per source
    pub(crate) sources: SourceTable,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl ObjaverseDownloader {
    /// Create a downloader using the bundled HTTP source downloaders
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) when the configuration
    /// fails validation, or a network error if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let sources = SourceTable::from_config(&config)?;
        Ok(Self::with_sources(config, sources))
    }

    /// Create a downloader over a custom set of source downloaders
    pub fn with_sources(config: Config, sources: SourceTable) -> Self {
        // Buffer of 1000 events; slow subscribers see RecvError::Lagged
        let (event_tx, _rx) = broadcast::channel(1000);
        Self {
            config: Arc::new(config),
            sources,
            event_tx,
        }
    }

    /// Subscribe to partition events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use objaverse_dl::{Config, ObjaverseDownloader};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = ObjaverseDownloader::new(Config::default())?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "partition event");
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The per-source downloaders
    pub fn sources(&self) -> &SourceTable {
        &self.sources
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

impl std::fmt::Debug for ObjaverseDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjaverseDownloader")
            .field("config", &self.config)
            .field("sources", &self.sources)
            .finish()
    }
}
