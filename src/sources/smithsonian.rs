//! Smithsonian 3D objects
//!
//! The file identifier of a Smithsonian object is the direct URL of its GLB
//! file. Retained objects are stored under a stable UUID derived from that URL.

use super::annotations::AnnotationCache;
use super::fetch::ObjectFetcher;
use super::pool::{ObjectJob, PartitionPlan, run_partition};
use super::{DownloadRequest, SourceDownloader};
use crate::error::{Error, Result};
use crate::types::{AnnotationTable, DownloadResultMap, Source};
use crate::utils::{expand_home, uid_from_str};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

const ANNOTATIONS_FILE: &str = "smithsonian.jsonl";

/// Downloader for Smithsonian objects
#[derive(Clone, Debug)]
pub struct SmithsonianDownloader {
    fetcher: ObjectFetcher,
    annotations: AnnotationCache,
}

impl SmithsonianDownloader {
    /// Create a downloader sharing the given fetcher and annotation cache
    pub fn new(fetcher: ObjectFetcher, annotations: AnnotationCache) -> Self {
        Self {
            fetcher,
            annotations,
        }
    }

    /// Local file name of an object (`<uuid5(url)>.glb`)
    pub fn file_name(file_identifier: &str) -> String {
        format!("{}.glb", uid_from_str(file_identifier))
    }

    /// Where a retained object is stored
    pub fn object_path(download_dir: &Path, file_identifier: &str) -> PathBuf {
        download_dir
            .join(Source::Smithsonian.as_str())
            .join("objects")
            .join(Self::file_name(file_identifier))
    }
}

fn validate_url(file_identifier: &str) -> Result<()> {
    let invalid = |reason: String| Error::InvalidIdentifier {
        origin: Source::Smithsonian,
        file_identifier: file_identifier.to_string(),
        reason,
    };
    let url = url::Url::parse(file_identifier).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}

#[async_trait]
impl SourceDownloader for SmithsonianDownloader {
    fn source(&self) -> Source {
        Source::Smithsonian
    }

    async fn get_annotations(
        &self,
        download_dir: &Path,
        refresh: bool,
    ) -> Result<AnnotationTable> {
        self.annotations
            .load(Source::Smithsonian, ANNOTATIONS_FILE, download_dir, refresh)
            .await
    }

    async fn get_alignment_annotations(
        &self,
        _download_dir: &Path,
        _refresh: bool,
    ) -> Result<AnnotationTable> {
        tracing::info!("smithsonian objects are not used for alignment");
        Ok(AnnotationTable::default())
    }

    async fn download_objects(&self, request: DownloadRequest<'_>) -> Result<DownloadResultMap> {
        let download_dir = request.download_dir.map(expand_home);

        let mut plan = PartitionPlan::default();
        for record in request.objects {
            validate_url(&record.file_identifier)?;
            plan.schedule(ObjectJob {
                record: record.clone(),
                url: record.file_identifier.clone(),
                destination: download_dir
                    .as_deref()
                    .map(|dir| Self::object_path(dir, &record.file_identifier)),
                file_name: Self::file_name(&record.file_identifier),
            })
            .await?;
        }

        run_partition(
            Source::Smithsonian,
            &self.fetcher,
            plan,
            request.processes,
            request.handlers,
        )
        .await
    }
}
