//! Annotation aggregation across sources

use super::ObjaverseDownloader;
use crate::error::{Error, Result};
use crate::types::{AnnotationTable, Source};
use std::path::Path;

impl ObjaverseDownloader {
    /// Concatenated annotations of every source
    ///
    /// Tables are concatenated in the fixed order github, thingiverse,
    /// smithsonian, sketchfab, without deduplication.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceUnavailable`] naming the first source whose
    /// table could not be produced.
    pub async fn get_annotations(
        &self,
        download_dir: &Path,
        refresh: bool,
    ) -> Result<AnnotationTable> {
        self.get_annotations_for(&Source::ALL, download_dir, refresh)
            .await
    }

    /// Concatenated annotations of a subset of sources
    ///
    /// The fixed source order applies regardless of the order of `sources`.
    pub async fn get_annotations_for(
        &self,
        sources: &[Source],
        download_dir: &Path,
        refresh: bool,
    ) -> Result<AnnotationTable> {
        let mut tables = Vec::new();
        for source in Source::ALL.into_iter().filter(|s| sources.contains(s)) {
            let table = self
                .sources
                .get(source)
                .get_annotations(download_dir, refresh)
                .await
                .map_err(|e| Error::source_unavailable(source, e))?;
            tracing::info!(source = %source, rows = table.len(), "loaded annotations");
            tables.push(table);
        }
        Ok(AnnotationTable::concat(tables))
    }

    /// Concatenated alignment annotations of github and sketchfab
    ///
    /// Only sources with alignment annotations ([`Source::ALIGNMENT`]) are consulted.
    pub async fn get_alignment_annotations(
        &self,
        download_dir: &Path,
        refresh: bool,
    ) -> Result<AnnotationTable> {
        let mut tables = Vec::new();
        for source in Source::ALL
            .into_iter()
            .filter(Source::has_alignment_annotations)
        {
            let table = self
                .sources
                .get(source)
                .get_alignment_annotations(download_dir, refresh)
                .await
                .map_err(|e| Error::source_unavailable(source, e))?;
            tracing::info!(source = %source, rows = table.len(), "loaded alignment annotations");
            tables.push(table);
        }
        Ok(AnnotationTable::concat(tables))
    }
}
