//! Per-source annotation tables with an on-disk cache

use super::fetch::{Fetched, ObjectFetcher};
use crate::error::{Error, Result};
use crate::types::{AnnotationTable, Source};
use crate::utils::expand_home;
use std::path::{Path, PathBuf};

/// Fetches annotation tables from `<base_url>/<source>/<file>`
///
/// Tables are cached at `<download_dir>/<source>/<file>` and reused until a
/// refresh is requested. Any failure is reported as
/// [`Error::SourceUnavailable`] naming the source.
#[derive(Clone, Debug)]
pub struct AnnotationCache {
    fetcher: ObjectFetcher,
    base_url: String,
}

impl AnnotationCache {
    /// Create a cache reading from `base_url`
    pub fn new(fetcher: ObjectFetcher, base_url: &str) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Where a table is cached locally
    pub fn cache_path(download_dir: &Path, source: Source, file_name: &str) -> PathBuf {
        expand_home(download_dir)
            .join(source.as_str())
            .join(file_name)
    }

    /// Load a table, downloading it first when absent or when `refresh` is set
    pub async fn load(
        &self,
        source: Source,
        file_name: &str,
        download_dir: &Path,
        refresh: bool,
    ) -> Result<AnnotationTable> {
        self.load_inner(source, file_name, download_dir, refresh)
            .await
            .map_err(|e| Error::source_unavailable(source, e))
    }

    async fn load_inner(
        &self,
        source: Source,
        file_name: &str,
        download_dir: &Path,
        refresh: bool,
    ) -> Result<AnnotationTable> {
        let local_path = Self::cache_path(download_dir, source, file_name);

        if refresh || !tokio::fs::try_exists(&local_path).await? {
            let url = format!("{}/{}/{}", self.base_url, source, file_name);
            tracing::info!(
                source = %source,
                url = %url,
                path = %local_path.display(),
                "downloading annotations"
            );
            if let Fetched::NotFound = self.fetcher.fetch_to(&url, &local_path).await? {
                return Err(Error::HttpStatus { url, status: 404 });
            }
        } else {
            tracing::debug!(source = %source, path = %local_path.display(), "using cached annotations");
        }

        let table = AnnotationTable::read_from(&local_path).await?;
        tracing::debug!(source = %source, rows = table.len(), "annotations loaded");
        Ok(table)
    }
}
