//! # objaverse-dl
//!
//! Downloader for the Objaverse-XL dataset of 3D objects.
//!
//! Objects are sourced from four remote repositories (github, thingiverse,
//! smithsonian, sketchfab). This crate aggregates their annotation tables and
//! downloads a requested subset of objects, routing each record to the
//! downloader for its source and reporting every attempt through optional
//! found / modified / missing handlers.
//!
//! ## Quick Start
//!
//! ```no_run
//! use objaverse_dl::{Config, DownloadOptions, ObjaverseDownloader, ObjectHandlers, Source};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = ObjaverseDownloader::new(Config::default())?;
//!     let dir = Path::new("~/.objaverse");
//!
//!     let annotations = downloader.get_annotations_for(&[Source::Smithsonian], dir, false).await?;
//!     let handlers = ObjectHandlers::new()
//!         .on_missing(|obj| eprintln!("gone: {}", obj.file_identifier));
//!
//!     let downloaded = downloader
//!         .download_objects(
//!             &annotations.head(10),
//!             Some(dir),
//!             &DownloadOptions::new().handlers(handlers),
//!         )
//!         .await?;
//!     for (file_identifier, path) in &downloaded {
//!         println!("{file_identifier} -> {}", path.display());
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Dispatcher and annotation aggregator
pub mod downloader;
/// Error types
pub mod error;
/// Object lifecycle handlers
pub mod handlers;
/// Retry logic with exponential backoff
pub mod retry;
/// Per-source downloaders
pub mod sources;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use downloader::{DownloadOptions, ObjaverseDownloader};
pub use error::{Error, Result};
pub use handlers::ObjectHandlers;
pub use sources::{SourceDownloader, SourceTable};
pub use types::{
    AnnotationTable, DownloadOutcome, DownloadResultMap, Event, FoundObject, Metadata,
    MissingObject, ModifiedObject, ObjectRecord, Source, SourceOptions,
};

/// Run a future to completion unless a termination signal arrives first
///
/// - **Unix:** listens for SIGTERM and SIGINT, falling back to `ctrl_c` if
///   signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Dropping the future cancels in-flight downloads; files still being written
/// only exist under their `.tmp` name.
///
/// # Errors
///
/// Returns [`Error::Interrupted`] when a signal arrived first, otherwise the
/// future's own result.
///
/// # Example
///
/// ```no_run
/// use objaverse_dl::{Config, ObjaverseDownloader, run_until_signal};
/// use std::path::Path;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = ObjaverseDownloader::new(Config::default())?;
///     let annotations =
///         run_until_signal(downloader.get_annotations(Path::new("~/.objaverse"), false)).await?;
///     println!("{} objects", annotations.len());
///     Ok(())
/// }
/// ```
pub async fn run_until_signal<T>(
    future: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        result = future => result,
        _ = wait_for_signal() => Err(Error::Interrupted),
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received Ctrl+C signal");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}
