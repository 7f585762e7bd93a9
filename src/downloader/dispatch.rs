//! Request validation, partitioning by source and result merging

use super::ObjaverseDownloader;
use crate::error::Result;
use crate::handlers::ObjectHandlers;
use crate::sources::DownloadRequest;
use crate::types::{AnnotationTable, DownloadResultMap, Event, SourceOptions};
use crate::utils::expand_home;
use std::path::Path;

/// Options for [`ObjaverseDownloader::download_objects`]
#[derive(Clone, Debug, Default)]
pub struct DownloadOptions {
    /// Worker pool size per source (None = configured value, then available parallelism)
    pub processes: Option<usize>,
    /// Lifecycle handlers, shared by every source
    pub handlers: ObjectHandlers,
    /// Per-source options, forwarded verbatim to every downloader
    pub source_options: SourceOptions,
}

impl DownloadOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker pool size
    pub fn processes(mut self, processes: usize) -> Self {
        self.processes = Some(processes);
        self
    }

    /// Set the lifecycle handlers
    pub fn handlers(mut self, handlers: ObjectHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Set one per-source option
    pub fn source_option(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.source_options.insert(key, value);
        self
    }
}

impl ObjaverseDownloader {
    /// Download objects from every source they reference
    ///
    /// The table is validated and split by source before any downloader runs;
    /// each downloader then receives exactly the records of its source, in
    /// request order. Partitions run one after another and their result maps
    /// are merged. Should two sources report the same file identifier, the
    /// later partition wins.
    ///
    /// With `download_dir = None` files are discarded once their handler ran,
    /// and the returned map is empty.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSource`](crate::Error::InvalidSource) when any record
    ///   names an unsupported source. No downloader is invoked.
    /// - The first error of a failing partition, unchanged. Handlers already
    ///   invoked for earlier partitions are not rolled back.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use objaverse_dl::{Config, DownloadOptions, ObjaverseDownloader, ObjectHandlers};
    /// use std::path::Path;
    ///
    /// # async fn example() -> objaverse_dl::Result<()> {
    /// let downloader = ObjaverseDownloader::new(Config::default())?;
    /// let annotations = downloader.get_annotations(Path::new("~/.objaverse"), false).await?;
    ///
    /// let options = DownloadOptions::new()
    ///     .processes(8)
    ///     .source_option("save_repo_format", "zip")
    ///     .handlers(ObjectHandlers::new().on_modified(|obj| {
    ///         println!("{} changed: {} -> {}", obj.file_identifier, obj.old_sha256, obj.new_sha256)
    ///     }));
    /// let downloaded = downloader
    ///     .download_objects(&annotations.head(100), Some(Path::new("~/.objaverse")), &options)
    ///     .await?;
    /// println!("{} objects on disk", downloaded.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn download_objects(
        &self,
        objects: &AnnotationTable,
        download_dir: Option<&Path>,
        options: &DownloadOptions,
    ) -> Result<DownloadResultMap> {
        let partitions = objects.partition_by_source()?;
        let processes = match options.processes {
            Some(processes) => processes.max(1),
            None => self.config.download.effective_processes(),
        };
        let download_dir = download_dir.map(expand_home);

        let mut results = DownloadResultMap::new();
        for (source, partition) in &partitions {
            let source = *source;
            tracing::info!(
                source = %source,
                objects = partition.len(),
                processes,
                "downloading partition"
            );
            self.emit_event(Event::PartitionStarted {
                source,
                objects: partition.len(),
            });

            let request = DownloadRequest {
                objects: partition,
                download_dir: download_dir.as_deref(),
                processes,
                handlers: &options.handlers,
                options: &options.source_options,
            };
            let downloaded = match self.sources.get(source).download_objects(request).await {
                Ok(downloaded) => downloaded,
                Err(e) => {
                    tracing::error!(source = %source, error = %e, "partition failed");
                    self.emit_event(Event::PartitionFailed {
                        source,
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            };

            self.emit_event(Event::PartitionComplete {
                source,
                retained: downloaded.len(),
            });

            for (file_identifier, path) in downloaded {
                if let Some(previous) = results.insert(file_identifier.clone(), path) {
                    tracing::debug!(
                        file_identifier = %file_identifier,
                        previous = %previous.display(),
                        source = %source,
                        "file identifier reported by more than one source, keeping the later path"
                    );
                }
            }
        }

        Ok(results)
    }
}
