//! Shared test helpers: recording source downloaders and handler logs.

use crate::config::Config;
use crate::downloader::ObjaverseDownloader;
use crate::error::{Error, Result};
use crate::handlers::ObjectHandlers;
use crate::sources::{DownloadRequest, SourceDownloader, SourceTable};
use crate::types::{
    AnnotationTable, DownloadOutcome, DownloadResultMap, FoundObject, MissingObject,
    ModifiedObject, ObjectRecord, Source, SourceOptions,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What a recording source reports for an object
#[derive(Clone, Debug)]
pub(crate) enum Behavior {
    Found,
    Modified(String),
    Missing,
}

/// Arguments of one `download_objects` call
#[derive(Clone, Debug)]
pub(crate) struct RecordedCall {
    pub objects: AnnotationTable,
    pub download_dir: Option<PathBuf>,
    pub processes: usize,
    pub options: SourceOptions,
}

/// Source downloader that records its calls and reports scripted outcomes
pub(crate) struct RecordingSource {
    source: Source,
    annotations: Option<AnnotationTable>,
    alignment: AnnotationTable,
    behaviors: HashMap<String, Behavior>,
    failing: bool,
    calls: Mutex<Vec<RecordedCall>>,
    pub(crate) annotation_calls: AtomicUsize,
    pub(crate) alignment_calls: AtomicUsize,
}

impl RecordingSource {
    /// Source with two annotation rows (`<source>-0`, `<source>-1`), all objects found
    pub(crate) fn new(source: Source) -> Self {
        let annotations = (0..2)
            .map(|i| record(&format!("{source}-{i}"), source.as_str()))
            .collect();
        Self {
            source,
            annotations: Some(annotations),
            alignment: AnnotationTable::new(vec![record(
                &format!("{source}-aligned"),
                source.as_str(),
            )]),
            behaviors: HashMap::new(),
            failing: false,
            calls: Mutex::new(Vec::new()),
            annotation_calls: AtomicUsize::new(0),
            alignment_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_annotations(mut self, table: AnnotationTable) -> Self {
        self.annotations = Some(table);
        self
    }

    /// Annotation requests fail
    pub(crate) fn unavailable(mut self) -> Self {
        self.annotations = None;
        self
    }

    pub(crate) fn with_behavior(mut self, file_identifier: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(file_identifier.to_string(), behavior);
        self
    }

    /// Download requests fail with an HTTP 500
    pub(crate) fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn object_path(&self, root: &Path, file_identifier: &str) -> PathBuf {
        root.join(self.source.as_str())
            .join(file_identifier.replace(['/', ':'], "_"))
    }
}

#[async_trait]
impl SourceDownloader for RecordingSource {
    fn source(&self) -> Source {
        self.source
    }

    async fn get_annotations(
        &self,
        _download_dir: &Path,
        _refresh: bool,
    ) -> Result<AnnotationTable> {
        self.annotation_calls.fetch_add(1, Ordering::SeqCst);
        self.annotations.clone().ok_or_else(|| Error::HttpStatus {
            url: format!("https://annotations.test/{}", self.source),
            status: 503,
        })
    }

    async fn get_alignment_annotations(
        &self,
        _download_dir: &Path,
        _refresh: bool,
    ) -> Result<AnnotationTable> {
        self.alignment_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.alignment.clone())
    }

    async fn download_objects(&self, request: DownloadRequest<'_>) -> Result<DownloadResultMap> {
        self.calls.lock().unwrap().push(RecordedCall {
            objects: request.objects.clone(),
            download_dir: request.download_dir.map(Path::to_path_buf),
            processes: request.processes,
            options: request.options.clone(),
        });

        if self.failing {
            return Err(Error::HttpStatus {
                url: format!("https://{}.test/object", self.source),
                status: 500,
            });
        }

        let scratch = PathBuf::from("/scratch");
        let mut results = DownloadResultMap::new();
        for record in request.objects {
            let root = request.download_dir.unwrap_or(scratch.as_path());
            let local_path = self.object_path(root, &record.file_identifier);
            let outcome = match self
                .behaviors
                .get(&record.file_identifier)
                .unwrap_or(&Behavior::Found)
            {
                Behavior::Found => {
                    DownloadOutcome::classify(record, local_path, record.sha256.clone())
                }
                Behavior::Modified(new_sha) => {
                    DownloadOutcome::classify(record, local_path, new_sha.clone())
                }
                Behavior::Missing => DownloadOutcome::Missing(MissingObject::from_record(record)),
            };
            request.handlers.notify(&outcome);

            if let (Some(_), Some(path)) = (request.download_dir, outcome.local_path()) {
                results.insert(record.file_identifier.clone(), path.to_path_buf());
            }
        }
        Ok(results)
    }
}

/// One recording source per supported source
pub(crate) struct Fakes {
    sources: HashMap<Source, Arc<RecordingSource>>,
}

impl Fakes {
    pub(crate) fn new() -> Self {
        Self {
            sources: Source::ALL
                .into_iter()
                .map(|s| (s, Arc::new(RecordingSource::new(s))))
                .collect(),
        }
    }

    /// Replace the fake for one source
    pub(crate) fn with(mut self, fake: RecordingSource) -> Self {
        self.sources.insert(fake.source, Arc::new(fake));
        self
    }

    pub(crate) fn get(&self, source: Source) -> &Arc<RecordingSource> {
        &self.sources[&source]
    }

    pub(crate) fn table(&self) -> SourceTable {
        let slot = |s: Source| -> Arc<dyn SourceDownloader> { self.get(s).clone() };
        SourceTable::new(
            slot(Source::Github),
            slot(Source::Thingiverse),
            slot(Source::Smithsonian),
            slot(Source::Sketchfab),
        )
    }

    /// `download_objects` calls across all sources
    pub(crate) fn total_calls(&self) -> usize {
        self.sources.values().map(|s| s.calls().len()).sum()
    }
}

/// Helper to create a test ObjaverseDownloader backed by recording sources
pub(crate) fn create_test_downloader(fakes: &Fakes) -> ObjaverseDownloader {
    let mut config = Config::default();
    config.download.processes = Some(3);
    ObjaverseDownloader::with_sources(config, fakes.table())
}

pub(crate) fn record(file_identifier: &str, source: &str) -> ObjectRecord {
    ObjectRecord {
        file_identifier: file_identifier.to_string(),
        source: source.to_string(),
        sha256: format!("sha-{file_identifier}"),
        file_type: String::new(),
        license: String::new(),
        metadata: Default::default(),
    }
}

/// Table of `(file_identifier, source)` rows
pub(crate) fn table(rows: &[(&str, &str)]) -> AnnotationTable {
    rows.iter().map(|(id, source)| record(id, source)).collect()
}

/// Captures every handler invocation
#[derive(Clone, Default)]
pub(crate) struct HandlerLog {
    pub found: Arc<Mutex<Vec<FoundObject>>>,
    pub modified: Arc<Mutex<Vec<ModifiedObject>>>,
    pub missing: Arc<Mutex<Vec<MissingObject>>>,
}

impl HandlerLog {
    pub(crate) fn handlers(&self) -> ObjectHandlers {
        let (found, modified, missing) = (
            self.found.clone(),
            self.modified.clone(),
            self.missing.clone(),
        );
        ObjectHandlers::new()
            .on_found(move |o| found.lock().unwrap().push(o.clone()))
            .on_modified(move |o| modified.lock().unwrap().push(o.clone()))
            .on_missing(move |o| missing.lock().unwrap().push(o.clone()))
    }

    pub(crate) fn found_ids(&self) -> Vec<String> {
        self.found
            .lock()
            .unwrap()
            .iter()
            .map(|o| o.file_identifier.clone())
            .collect()
    }

    pub(crate) fn missing_ids(&self) -> Vec<String> {
        self.missing
            .lock()
            .unwrap()
            .iter()
            .map(|o| o.file_identifier.clone())
            .collect()
    }
}
