//! Sketchfab objects mirrored in the Objaverse 1.0 dataset
//!
//! A Sketchfab identifier is `https://sketchfab.com/3d-models/<uid>`. The
//! objects themselves are served from the Objaverse 1.0 mirror, located
//! through the gzipped `object-paths.json.gz` index (uid → relative path).
//! The same mirror publishes the full per-object Sketchfab metadata, sharded
//! by object directory, and the LVIS category assignments.

use super::annotations::AnnotationCache;
use super::fetch::{Fetched, ObjectFetcher};
use super::pool::{ObjectJob, PartitionPlan, run_partition};
use super::{DownloadRequest, SourceDownloader};
use crate::error::{Error, Result};
use crate::types::{AnnotationTable, DownloadResultMap, Source};
use crate::utils::{expand_home, join_relative};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

const ANNOTATIONS_FILE: &str = "sketchfab.jsonl";
const ALIGNMENT_FILE: &str = "alignment.jsonl";
const OBJECT_PATHS_FILE: &str = "object-paths.json.gz";
const LVIS_FILE: &str = "lvis-annotations.json.gz";
const METADATA_DIR: &str = "metadata";
/// Metadata shards are `000-000` through `000-159`
const METADATA_SHARDS: usize = 160;
const VERSIONED_DIR: &str = "hf-objaverse-v1";
const MODEL_URL_PREFIX: &str = "https://sketchfab.com/3d-models/";

/// Directory holding the object index when objects are not retained
const DEFAULT_INDEX_ROOT: &str = "~/.objaverse";

/// Downloader for Sketchfab objects
#[derive(Clone, Debug)]
pub struct SketchfabDownloader {
    fetcher: ObjectFetcher,
    annotations: AnnotationCache,
    base_url: String,
}

impl SketchfabDownloader {
    /// Create a downloader reading the Objaverse 1.0 mirror at `base_url`
    pub fn new(fetcher: ObjectFetcher, annotations: AnnotationCache, base_url: &str) -> Self {
        Self {
            fetcher,
            annotations,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Model uid of a file identifier (its last path segment)
    pub fn uid(file_identifier: &str) -> &str {
        file_identifier
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(file_identifier)
    }

    /// File identifier for a model uid
    pub fn file_identifier(uid: &str) -> String {
        format!("{MODEL_URL_PREFIX}{uid}")
    }

    /// Fetch `<base>/<remote>` into `local_path` unless already present, then
    /// decode it as gzipped JSON
    async fn cached_gz_json<T>(&self, remote: &str, local_path: PathBuf) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        if !tokio::fs::try_exists(&local_path).await? {
            let url = format!("{}/{}", self.base_url, remote);
            tracing::info!(url = %url, path = %local_path.display(), "downloading");
            if let Fetched::NotFound = self.fetcher.fetch_to(&url, &local_path).await? {
                return Err(Error::HttpStatus { url, status: 404 });
            }
        }

        tokio::task::spawn_blocking(move || read_gz_json(&local_path))
            .await
            .map_err(|e| Error::Other(format!("decode task failed: {e}")))?
    }

    /// uid → relative object path, downloaded once into `<root>/hf-objaverse-v1/`
    pub async fn object_paths(&self, root: &Path) -> Result<HashMap<String, String>> {
        let root = expand_home(root);
        let local_path = root.join(VERSIONED_DIR).join(OBJECT_PATHS_FILE);
        self.cached_gz_json(OBJECT_PATHS_FILE, local_path).await
    }

    /// Every uid in the object index, sorted
    pub async fn get_uids(&self, root: &Path) -> Result<Vec<String>> {
        let mut uids: Vec<String> = self.object_paths(root).await?.into_keys().collect();
        uids.sort();
        Ok(uids)
    }

    /// Full Sketchfab metadata keyed by uid
    ///
    /// With `uids` set, only the shards holding those objects are read and the
    /// result is restricted to them; uids absent from the object index are
    /// skipped. Without it every shard is read. Shards are cached under
    /// `<root>/hf-objaverse-v1/metadata/<shard>.json.gz` and fetched only when
    /// absent.
    pub async fn get_full_annotations(
        &self,
        uids: Option<&[String]>,
        root: &Path,
    ) -> Result<BTreeMap<String, Value>> {
        let root = expand_home(root);
        let shards: BTreeSet<String> = match uids {
            Some(uids) => {
                let object_paths = self.object_paths(&root).await?;
                uids.iter()
                    .filter_map(|uid| object_paths.get(uid).map(String::as_str).and_then(shard_of))
                    .collect()
            }
            None => all_shards().collect(),
        };
        let wanted: Option<BTreeSet<&str>> =
            uids.map(|uids| uids.iter().map(String::as_str).collect());

        let metadata_dir = root.join(VERSIONED_DIR).join(METADATA_DIR);
        let mut annotations = BTreeMap::new();
        for shard in &shards {
            let file = format!("{shard}.json.gz");
            let data: BTreeMap<String, Value> = self
                .cached_gz_json(&format!("{METADATA_DIR}/{file}"), metadata_dir.join(&file))
                .await?;
            annotations.extend(data.into_iter().filter(|(uid, _)| {
                wanted
                    .as_ref()
                    .is_none_or(|wanted| wanted.contains(uid.as_str()))
            }));
        }

        tracing::info!(
            shards = shards.len(),
            objects = annotations.len(),
            "loaded sketchfab metadata"
        );
        Ok(annotations)
    }

    /// LVIS category → uids, downloaded once into `<root>/hf-objaverse-v1/`
    pub async fn get_lvis_annotations(
        &self,
        root: &Path,
    ) -> Result<BTreeMap<String, Vec<String>>> {
        let local_path = expand_home(root).join(VERSIONED_DIR).join(LVIS_FILE);
        self.cached_gz_json(LVIS_FILE, local_path).await
    }
}

// "glbs/000-023/<uid>.glb" lives in shard "000-023"
fn shard_of(object_path: &str) -> Option<String> {
    object_path
        .trim_start_matches('/')
        .split('/')
        .nth(1)
        .map(str::to_string)
}

fn all_shards() -> impl Iterator<Item = String> {
    (0..METADATA_SHARDS).map(|i| format!("{:03}-{:03}", i / 1000, i % 1000))
}

fn read_gz_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = std::fs::File::open(path)?;
    let decoder = GzDecoder::new(std::io::BufReader::new(file));
    Ok(serde_json::from_reader(decoder)?)
}

#[async_trait]
impl SourceDownloader for SketchfabDownloader {
    fn source(&self) -> Source {
        Source::Sketchfab
    }

    async fn get_annotations(
        &self,
        download_dir: &Path,
        refresh: bool,
    ) -> Result<AnnotationTable> {
        self.annotations
            .load(Source::Sketchfab, ANNOTATIONS_FILE, download_dir, refresh)
            .await
    }

    async fn get_alignment_annotations(
        &self,
        download_dir: &Path,
        refresh: bool,
    ) -> Result<AnnotationTable> {
        self.annotations
            .load(Source::Sketchfab, ALIGNMENT_FILE, download_dir, refresh)
            .await
    }

    async fn download_objects(&self, request: DownloadRequest<'_>) -> Result<DownloadResultMap> {
        let download_dir = request.download_dir.map(expand_home);
        let index_root = download_dir
            .clone()
            .unwrap_or_else(|| expand_home(Path::new(DEFAULT_INDEX_ROOT)));
        let object_paths = self.object_paths(&index_root).await?;

        let mut plan = PartitionPlan::default();
        for record in request.objects {
            let uid = Self::uid(&record.file_identifier);
            let Some(relative) = object_paths.get(uid) else {
                plan.mark_missing(record);
                continue;
            };

            let file_name = relative.rsplit('/').next().unwrap_or(relative).to_string();
            let destination: Option<PathBuf> = download_dir
                .as_deref()
                .map(|dir| join_relative(&dir.join(VERSIONED_DIR), relative));
            plan.schedule(ObjectJob {
                record: record.clone(),
                url: format!("{}/{}", self.base_url, relative.trim_start_matches('/')),
                destination,
                file_name,
            })
            .await?;
        }

        run_partition(
            Source::Sketchfab,
            &self.fetcher,
            plan,
            request.processes,
            request.handlers,
        )
        .await
    }
}
