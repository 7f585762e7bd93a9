//! Thingiverse files
//!
//! Identifiers carry the Thingiverse file id either as a `fileId` query
//! parameter (`https://www.thingiverse.com/thing:42/files?fileId=1234`) or in
//! the record metadata under `fileId`.

use super::annotations::AnnotationCache;
use super::fetch::ObjectFetcher;
use super::pool::{ObjectJob, PartitionPlan, run_partition};
use super::{DownloadRequest, SourceDownloader};
use crate::error::{Error, Result};
use crate::types::{AnnotationTable, DownloadResultMap, ObjectRecord, Source};
use crate::utils::expand_home;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

const ANNOTATIONS_FILE: &str = "thingiverse.jsonl";
const DEFAULT_EXTENSION: &str = "stl";

/// Downloader for Thingiverse files
#[derive(Clone, Debug)]
pub struct ThingiverseDownloader {
    fetcher: ObjectFetcher,
    annotations: AnnotationCache,
    base_url: String,
}

impl ThingiverseDownloader {
    /// Create a downloader fetching files from `base_url`
    pub fn new(fetcher: ObjectFetcher, annotations: AnnotationCache, base_url: &str) -> Self {
        Self {
            fetcher,
            annotations,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Thingiverse file id of a record
    pub fn file_id(record: &ObjectRecord) -> Result<String> {
        let from_query = url::Url::parse(&record.file_identifier)
            .ok()
            .and_then(|url| {
                url.query_pairs()
                    .find(|(key, _)| key == "fileId")
                    .map(|(_, value)| value.into_owned())
            });

        let from_metadata = || match record.metadata.get("fileId") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };

        from_query
            .or_else(from_metadata)
            .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()))
            .ok_or_else(|| Error::InvalidIdentifier {
                origin: Source::Thingiverse,
                file_identifier: record.file_identifier.clone(),
                reason: "no fileId query parameter or metadata entry".into(),
            })
    }

    fn file_name(file_id: &str, record: &ObjectRecord) -> String {
        let extension = record.file_type.trim_start_matches('.').to_ascii_lowercase();
        let extension = if extension.is_empty() {
            DEFAULT_EXTENSION
        } else {
            &extension
        };
        format!("{file_id}.{extension}")
    }

    /// Where a retained file is stored
    pub fn object_path(download_dir: &Path, file_id: &str, record: &ObjectRecord) -> PathBuf {
        download_dir
            .join(Source::Thingiverse.as_str())
            .join("objects")
            .join(Self::file_name(file_id, record))
    }

    fn download_url(&self, file_id: &str) -> String {
        format!("{}/download:{}", self.base_url, file_id)
    }
}

#[async_trait]
impl SourceDownloader for ThingiverseDownloader {
    fn source(&self) -> Source {
        Source::Thingiverse
    }

    async fn get_annotations(
        &self,
        download_dir: &Path,
        refresh: bool,
    ) -> Result<AnnotationTable> {
        self.annotations
            .load(Source::Thingiverse, ANNOTATIONS_FILE, download_dir, refresh)
            .await
    }

    async fn get_alignment_annotations(
        &self,
        _download_dir: &Path,
        _refresh: bool,
    ) -> Result<AnnotationTable> {
        tracing::info!("thingiverse objects are not used for alignment");
        Ok(AnnotationTable::default())
    }

    async fn download_objects(&self, request: DownloadRequest<'_>) -> Result<DownloadResultMap> {
        let download_dir = request.download_dir.map(expand_home);

        let mut plan = PartitionPlan::default();
        for record in request.objects {
            let file_id = Self::file_id(record)?;
            plan.schedule(ObjectJob {
                record: record.clone(),
                url: self.download_url(&file_id),
                destination: download_dir
                    .as_deref()
                    .map(|dir| Self::object_path(dir, &file_id, record)),
                file_name: Self::file_name(&file_id, record),
            })
            .await?;
        }

        run_partition(
            Source::Thingiverse,
            &self.fetcher,
            plan,
            request.processes,
            request.handlers,
        )
        .await
    }
}
