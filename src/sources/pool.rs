//! Bounded worker pool for one source partition
//!
//! Workers download and hash objects concurrently, then hand their outcome to
//! the orchestrating task over a channel. Only the orchestrating task calls the
//! lifecycle handlers, so handlers never run concurrently with each other.
//! Files fetched without a download directory live in a scratch directory that
//! is dropped right after the handler for that object returns.

use super::fetch::{Fetched, ObjectFetcher};
use crate::error::{Error, Result};
use crate::handlers::ObjectHandlers;
use crate::types::{DownloadOutcome, DownloadResultMap, MissingObject, ObjectRecord, Source};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

/// One object to fetch
#[derive(Clone, Debug)]
pub(crate) struct ObjectJob {
    pub record: ObjectRecord,
    pub url: String,
    /// Final location when retaining, `None` to fetch into a scratch directory
    pub destination: Option<PathBuf>,
    /// File name used inside the scratch directory
    pub file_name: String,
}

/// Work for one partition, split by what needs doing
#[derive(Debug, Default)]
pub(crate) struct PartitionPlan {
    pub jobs: Vec<ObjectJob>,
    /// Objects already present at their destination
    pub cached: DownloadResultMap,
    /// Objects known to be missing without contacting the remote
    pub missing: Vec<MissingObject>,
}

impl PartitionPlan {
    /// Queue a job, or record it as cached when its destination already exists
    pub async fn schedule(&mut self, job: ObjectJob) -> Result<()> {
        if let Some(destination) = &job.destination {
            if tokio::fs::try_exists(destination).await? {
                self.cached
                    .insert(job.record.file_identifier.clone(), destination.clone());
                return Ok(());
            }
        }
        self.jobs.push(job);
        Ok(())
    }

    /// Record an object as missing
    pub fn mark_missing(&mut self, record: &ObjectRecord) {
        self.missing.push(MissingObject::from_record(record));
    }
}

struct Delivered {
    outcome: DownloadOutcome,
    retained: bool,
    // dropped after the handler ran
    _scratch: Option<TempDir>,
}

#[derive(Default)]
struct OutcomeCounts {
    found: usize,
    modified: usize,
    missing: usize,
}

impl OutcomeCounts {
    fn record(&mut self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Found(_) => self.found += 1,
            DownloadOutcome::Modified(_) => self.modified += 1,
            DownloadOutcome::Missing(_) => self.missing += 1,
        }
    }
}

/// Run a partition plan with at most `processes` concurrent downloads
///
/// Returns identifier → path for cached objects and for retained Found and
/// Modified downloads. The first worker error aborts the remaining workers and
/// is returned.
pub(crate) async fn run_partition(
    source: Source,
    fetcher: &ObjectFetcher,
    plan: PartitionPlan,
    processes: usize,
    handlers: &ObjectHandlers,
) -> Result<DownloadResultMap> {
    let PartitionPlan {
        jobs,
        cached,
        missing,
    } = plan;
    let mut results = cached;
    let mut counts = OutcomeCounts::default();

    if !results.is_empty() {
        tracing::info!(source = %source, objects = results.len(), "found objects already downloaded");
    }

    for object in missing {
        tracing::warn!(source = %source, file_identifier = %object.file_identifier, "object not found at source");
        let outcome = DownloadOutcome::Missing(object);
        counts.record(&outcome);
        handlers.notify(&outcome);
    }

    if jobs.is_empty() {
        return Ok(results);
    }

    let processes = processes.max(1);
    tracing::info!(
        source = %source,
        objects = jobs.len(),
        workers = processes,
        "downloading objects"
    );

    let limit = Arc::new(Semaphore::new(processes));
    let (tx, mut rx) = mpsc::channel::<Delivered>(processes);
    let mut workers = JoinSet::new();

    for job in jobs {
        let fetcher = fetcher.clone();
        let limit = limit.clone();
        let tx = tx.clone();
        workers.spawn(async move {
            let _permit = limit
                .acquire_owned()
                .await
                .map_err(|_| Error::Other("worker pool closed".into()))?;
            let delivered = fetch_job(&fetcher, job).await?;
            // the receiver is only gone once the partition has already failed
            tx.send(delivered).await.ok();
            Ok::<(), Error>(())
        });
    }
    drop(tx);

    loop {
        tokio::select! {
            Some(delivered) = rx.recv() => {
                counts.record(&delivered.outcome);
                handlers.notify(&delivered.outcome);
                if let (true, Some(path)) = (delivered.retained, delivered.outcome.local_path()) {
                    results.insert(
                        delivered.outcome.file_identifier().to_string(),
                        path.to_path_buf(),
                    );
                }
            }
            Some(joined) = workers.join_next() => {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!(source = %source, error = %e, "partition download failed");
                        workers.abort_all();
                        return Err(e);
                    }
                    Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                    Err(e) => {
                        workers.abort_all();
                        return Err(Error::Other(format!("download worker failed: {e}")));
                    }
                }
            }
            else => break,
        }
    }

    tracing::info!(
        source = %source,
        found = counts.found,
        modified = counts.modified,
        missing = counts.missing,
        retained = results.len(),
        "partition finished"
    );

    Ok(results)
}

async fn fetch_job(fetcher: &ObjectFetcher, job: ObjectJob) -> Result<Delivered> {
    let (path, scratch) = match &job.destination {
        Some(destination) => (destination.clone(), None),
        None => {
            let scratch = tempfile::Builder::new().prefix("objaverse-").tempdir()?;
            (scratch.path().join(&job.file_name), Some(scratch))
        }
    };

    let outcome = match fetcher.fetch_to(&job.url, &path).await? {
        Fetched::NotFound => DownloadOutcome::Missing(MissingObject::from_record(&job.record)),
        Fetched::Downloaded { sha256, .. } => DownloadOutcome::classify(&job.record, path, sha256),
    };

    Ok(Delivered {
        outcome,
        retained: job.destination.is_some(),
        _scratch: scratch,
    })
}
