//! Source downloaders
//!
//! Every supported [`Source`] has one [`SourceDownloader`] implementation.
//! The dispatcher reaches them through a [`SourceTable`], which holds exactly
//! one slot per source and is indexed with an exhaustive `match`, so adding a
//! source variant is a compile error until it has a downloader.
//!
//! The bundled implementations share the same machinery:
//! - [`ObjectFetcher`] streams an HTTP object to disk while hashing it
//! - `pool` fans a partition out over a bounded worker pool and feeds outcomes
//!   back to the orchestrating task, which runs the lifecycle handlers
//! - [`AnnotationCache`] fetches and caches per-source annotation tables

mod annotations;
mod archive;
mod fetch;
mod github;
mod pool;
mod sketchfab;
mod smithsonian;
mod thingiverse;

pub use annotations::AnnotationCache;
pub use fetch::{Fetched, ObjectFetcher};
pub use github::{GithubDownloader, SaveRepoFormat};
pub use sketchfab::SketchfabDownloader;
pub use smithsonian::SmithsonianDownloader;
pub use thingiverse::ThingiverseDownloader;

use crate::config::Config;
use crate::error::Result;
use crate::handlers::ObjectHandlers;
use crate::types::{AnnotationTable, DownloadResultMap, Source, SourceOptions};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Parameters for one source partition download
pub struct DownloadRequest<'a> {
    /// Records of this source only, in request order
    pub objects: &'a AnnotationTable,
    /// Root directory for retained files (None = discard after handlers ran)
    pub download_dir: Option<&'a Path>,
    /// Worker pool size
    pub processes: usize,
    /// Lifecycle handlers
    pub handlers: &'a ObjectHandlers,
    /// Opaque per-source options
    pub options: &'a SourceOptions,
}

/// Capability contract every source downloader implements
#[async_trait]
pub trait SourceDownloader: Send + Sync {
    /// Which source this downloader serves
    fn source(&self) -> Source;

    /// Full annotation table for the source
    ///
    /// Cached under `download_dir/<source>/`; `refresh` forces a re-download.
    async fn get_annotations(&self, download_dir: &Path, refresh: bool)
    -> Result<AnnotationTable>;

    /// Annotations used for alignment fine-tuning
    ///
    /// Sources outside [`Source::ALIGNMENT`] return an empty table.
    async fn get_alignment_annotations(
        &self,
        download_dir: &Path,
        refresh: bool,
    ) -> Result<AnnotationTable>;

    /// Download one partition, invoking the handlers for every attempted object
    ///
    /// Returns identifier → local path for retained Found and Modified objects.
    async fn download_objects(&self, request: DownloadRequest<'_>) -> Result<DownloadResultMap>;
}

/// One downloader per source, selected by exhaustive match
#[derive(Clone)]
pub struct SourceTable {
    github: Arc<dyn SourceDownloader>,
    thingiverse: Arc<dyn SourceDownloader>,
    smithsonian: Arc<dyn SourceDownloader>,
    sketchfab: Arc<dyn SourceDownloader>,
}

impl SourceTable {
    /// Table of the given downloaders
    pub fn new(
        github: Arc<dyn SourceDownloader>,
        thingiverse: Arc<dyn SourceDownloader>,
        smithsonian: Arc<dyn SourceDownloader>,
        sketchfab: Arc<dyn SourceDownloader>,
    ) -> Self {
        Self {
            github,
            thingiverse,
            smithsonian,
            sketchfab,
        }
    }

    /// The bundled HTTP downloaders, sharing one client and retry policy
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = config.http.build_client()?;
        let fetcher = ObjectFetcher::new(client, config.retry.clone());
        let annotations = AnnotationCache::new(
            fetcher.clone(),
            &config.endpoints.annotations_base_url,
        );
        let endpoints = &config.endpoints;

        Ok(Self::new(
            Arc::new(GithubDownloader::new(
                fetcher.clone(),
                annotations.clone(),
                &endpoints.github_raw_base_url,
            )),
            Arc::new(ThingiverseDownloader::new(
                fetcher.clone(),
                annotations.clone(),
                &endpoints.thingiverse_base_url,
            )),
            Arc::new(SmithsonianDownloader::new(
                fetcher.clone(),
                annotations.clone(),
            )),
            Arc::new(SketchfabDownloader::new(
                fetcher,
                annotations,
                &endpoints.huggingface_base_url,
            )),
        ))
    }

    /// Replace the downloader for one source
    pub fn with(mut self, source: Source, downloader: Arc<dyn SourceDownloader>) -> Self {
        *self.slot_mut(source) = downloader;
        self
    }

    /// Downloader for a source
    pub fn get(&self, source: Source) -> &Arc<dyn SourceDownloader> {
        match source {
            Source::Github => &self.github,
            Source::Thingiverse => &self.thingiverse,
            Source::Smithsonian => &self.smithsonian,
            Source::Sketchfab => &self.sketchfab,
        }
    }

    fn slot_mut(&mut self, source: Source) -> &mut Arc<dyn SourceDownloader> {
        match source {
            Source::Github => &mut self.github,
            Source::Thingiverse => &mut self.thingiverse,
            Source::Smithsonian => &mut self.smithsonian,
            Source::Sketchfab => &mut self.sketchfab,
        }
    }
}

impl std::fmt::Debug for SourceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(Source::ALL.iter().map(|s| self.get(*s).source()))
            .finish()
    }
}
