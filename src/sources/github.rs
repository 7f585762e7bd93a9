//! GitHub repository files
//!
//! Identifiers are blob URLs pinned to a commit:
//! `https://github.com/<org>/<repo>/blob/<commit>/<path>`. Files are fetched
//! from the raw content host and laid out per repository under
//! `github/repos/<org>/<repo>/`. With an archive save format each repository
//! touched by a request is packed into `github/repos/<org>/<repo>.<ext>`
//! once its files have been handled, merging whatever an earlier request
//! already packed there.
//!
//! Recognized source option: `save_repo_format` (`"files"`, `"zip"`, `"tar"`
//! or `"tar.gz"`).

use super::annotations::AnnotationCache;
use super::archive::{ArchiveFormat, pack_repository, read_entries};
use super::fetch::ObjectFetcher;
use super::pool::{ObjectJob, PartitionPlan, run_partition};
use super::{DownloadRequest, SourceDownloader};
use crate::error::{Error, Result};
use crate::types::{AnnotationTable, DownloadResultMap, ObjectRecord, Source};
use crate::utils::{expand_home, join_relative};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

const ANNOTATIONS_FILE: &str = "github.jsonl";
const ALIGNMENT_FILE: &str = "alignment.jsonl";
const REPO_FORMAT_OPTION: &str = "save_repo_format";

/// How retained repository files are stored
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveRepoFormat {
    /// Plain files under the repository directory
    #[default]
    Files,
    /// One zip archive per repository
    Zip,
    /// One uncompressed tar archive per repository
    Tar,
    /// One gzip-compressed tar archive per repository
    #[serde(rename = "tar.gz")]
    TarGz,
}

impl SaveRepoFormat {
    fn archive_format(self) -> Option<ArchiveFormat> {
        match self {
            SaveRepoFormat::Files => None,
            SaveRepoFormat::Zip => Some(ArchiveFormat::Zip),
            SaveRepoFormat::Tar => Some(ArchiveFormat::Tar),
            SaveRepoFormat::TarGz => Some(ArchiveFormat::TarGz),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct RepoKey {
    org: String,
    repo: String,
}

impl RepoKey {
    fn dir(&self, download_dir: &Path) -> PathBuf {
        repos_dir(download_dir).join(&self.org).join(&self.repo)
    }

    fn archive(&self, download_dir: &Path, format: ArchiveFormat) -> PathBuf {
        repos_dir(download_dir)
            .join(&self.org)
            .join(format!("{}.{}", self.repo, format.extension()))
    }
}

fn repos_dir(download_dir: &Path) -> PathBuf {
    download_dir.join(Source::Github.as_str()).join("repos")
}

/// A file within a repository at a fixed commit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GithubFile {
    /// Organization or user owning the repository
    pub org: String,
    /// Repository name
    pub repo: String,
    /// Commit the file is pinned to
    pub commit: String,
    /// Path within the repository, `/`-separated
    pub path: String,
}

impl GithubFile {
    /// Parse a blob URL
    pub fn parse(file_identifier: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidIdentifier {
            origin: Source::Github,
            file_identifier: file_identifier.to_string(),
            reason: reason.to_string(),
        };

        let url = url::Url::parse(file_identifier).map_err(|e| invalid(&e.to_string()))?;
        if url.host_str() != Some("github.com") {
            return Err(invalid("expected a github.com URL"));
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|segment| !segment.is_empty()).collect())
            .unwrap_or_default();
        match segments.as_slice() {
            [org, repo, "blob", commit, path @ ..] if !path.is_empty() => Ok(Self {
                org: (*org).to_string(),
                repo: (*repo).to_string(),
                commit: (*commit).to_string(),
                path: path.join("/"),
            }),
            _ => Err(invalid(
                "expected https://github.com/<org>/<repo>/blob/<commit>/<path>",
            )),
        }
    }

    fn key(&self) -> RepoKey {
        RepoKey {
            org: self.org.clone(),
            repo: self.repo.clone(),
        }
    }

    /// Name of the file inside a packed repository
    fn entry_name(&self) -> String {
        self.path
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
            .collect::<Vec<_>>()
            .join("/")
    }

    fn file_name(&self) -> String {
        self.path
            .rsplit('/')
            .next()
            .unwrap_or(&self.path)
            .to_string()
    }
}

/// Downloader for GitHub repository files
#[derive(Clone, Debug)]
pub struct GithubDownloader {
    fetcher: ObjectFetcher,
    annotations: AnnotationCache,
    raw_base_url: String,
}

impl GithubDownloader {
    /// Create a downloader fetching raw contents from `raw_base_url`
    pub fn new(fetcher: ObjectFetcher, annotations: AnnotationCache, raw_base_url: &str) -> Self {
        Self {
            fetcher,
            annotations,
            raw_base_url: raw_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn raw_url(&self, file: &GithubFile) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.raw_base_url, file.org, file.repo, file.commit, file.path
        )
    }

    /// Where a retained file is stored with [`SaveRepoFormat::Files`]
    pub fn object_path(download_dir: &Path, file: &GithubFile) -> PathBuf {
        join_relative(&file.key().dir(download_dir), &file.path)
    }
}

// Handlers see the owning repository even when annotations omit it.
fn with_repo_metadata(record: &ObjectRecord, file: &GithubFile) -> ObjectRecord {
    let mut record = record.clone();
    record
        .metadata
        .entry("organization")
        .or_insert_with(|| Value::String(file.org.clone()));
    record
        .metadata
        .entry("repo")
        .or_insert_with(|| Value::String(file.repo.clone()));
    record
}

#[async_trait]
impl SourceDownloader for GithubDownloader {
    fn source(&self) -> Source {
        Source::Github
    }

    async fn get_annotations(
        &self,
        download_dir: &Path,
        refresh: bool,
    ) -> Result<AnnotationTable> {
        self.annotations
            .load(Source::Github, ANNOTATIONS_FILE, download_dir, refresh)
            .await
    }

    async fn get_alignment_annotations(
        &self,
        download_dir: &Path,
        refresh: bool,
    ) -> Result<AnnotationTable> {
        self.annotations
            .load(Source::Github, ALIGNMENT_FILE, download_dir, refresh)
            .await
    }

    async fn download_objects(&self, request: DownloadRequest<'_>) -> Result<DownloadResultMap> {
        let format = request
            .options
            .get::<SaveRepoFormat>(REPO_FORMAT_OPTION)?
            .unwrap_or_default();
        let download_dir = request.download_dir.map(expand_home);

        let files = request
            .objects
            .iter()
            .map(|record| GithubFile::parse(&record.file_identifier).map(|file| (record, file)))
            .collect::<Result<Vec<_>>>()?;

        let archive_format = format.archive_format();
        let mut plan = PartitionPlan::default();
        let mut repo_of: BTreeMap<String, RepoKey> = BTreeMap::new();
        let mut packed: BTreeMap<RepoKey, BTreeSet<String>> = BTreeMap::new();

        for (record, file) in &files {
            let key = file.key();

            if let (Some(archive_format), Some(dir)) = (archive_format, download_dir.as_deref()) {
                let archive = key.archive(dir, archive_format);
                if !packed.contains_key(&key) {
                    let entries = if tokio::fs::try_exists(&archive).await? {
                        read_entries(archive.clone(), archive_format).await?
                    } else {
                        BTreeSet::new()
                    };
                    packed.insert(key.clone(), entries);
                }
                if packed
                    .get(&key)
                    .is_some_and(|entries| entries.contains(&file.entry_name()))
                {
                    plan.cached.insert(record.file_identifier.clone(), archive);
                    continue;
                }
            }

            repo_of.insert(record.file_identifier.clone(), key);
            plan.schedule(ObjectJob {
                record: with_repo_metadata(record, file),
                url: self.raw_url(file),
                destination: download_dir
                    .as_deref()
                    .map(|dir| Self::object_path(dir, file)),
                file_name: file.file_name(),
            })
            .await?;
        }

        tracing::debug!(
            objects = files.len(),
            repos = files.iter().map(|(_, f)| f.key()).collect::<BTreeSet<_>>().len(),
            format = ?format,
            "github partition planned"
        );

        let mut results = run_partition(
            Source::Github,
            &self.fetcher,
            plan,
            request.processes,
            request.handlers,
        )
        .await?;

        let (Some(archive_format), Some(dir)) = (archive_format, download_dir.as_deref()) else {
            return Ok(results);
        };

        let touched: BTreeSet<&RepoKey> = results
            .keys()
            .filter_map(|id| repo_of.get(id))
            .collect();
        for key in touched {
            let repo_dir = key.dir(dir);
            if !tokio::fs::try_exists(&repo_dir).await? {
                continue;
            }
            let archive = key.archive(dir, archive_format);
            pack_repository(repo_dir, archive.clone(), archive_format).await?;
            for (id, path) in results.iter_mut() {
                if repo_of.get(id) == Some(key) {
                    *path = archive.clone();
                }
            }
        }

        Ok(results)
    }
}
