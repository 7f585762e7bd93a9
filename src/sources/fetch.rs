//! HTTP object retrieval with integrity hashing

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::retry::download_with_retry;
use crate::utils::{hex_digest, partial_path};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Result of fetching a remote file
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fetched {
    /// Body written to the target path
    Downloaded {
        /// SHA-256 of the body, lowercase hex
        sha256: String,
        /// Number of bytes written
        bytes: u64,
    },
    /// Remote answered 404 or 410
    NotFound,
}

/// Streams remote files to disk, hashing them on the way
///
/// Transient faults are retried according to the [`RetryConfig`]; a clean
/// "not found" is reported as [`Fetched::NotFound`] and never retried.
#[derive(Clone, Debug)]
pub struct ObjectFetcher {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl ObjectFetcher {
    /// Create a fetcher around a configured client
    pub fn new(client: reqwest::Client, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    /// Download `url` into `path`
    ///
    /// The body is written to `<path>.tmp` and renamed once complete, so an
    /// interrupted download never leaves a file at `path`.
    pub async fn fetch_to(&self, url: &str, path: &Path) -> Result<Fetched> {
        download_with_retry(&self.retry, || self.fetch_once(url, path)).await
    }

    async fn fetch_once(&self, url: &str, path: &Path) -> Result<Fetched> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            tracing::warn!(url = %url, status = status.as_u16(), "object not found");
            return Ok(Fetched::NotFound);
        }
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = partial_path(path);
        match stream_to_file(response, &tmp).await {
            Ok((sha256, bytes)) => {
                tokio::fs::rename(&tmp, path).await?;
                tracing::debug!(url = %url, path = %path.display(), bytes, "object downloaded");
                Ok(Fetched::Downloaded { sha256, bytes })
            }
            Err(e) => {
                tokio::fs::remove_file(&tmp).await.ok();
                Err(e)
            }
        }
    }
}

async fn stream_to_file(mut response: reqwest::Response, tmp: &Path) -> Result<(String, u64)> {
    let mut file = tokio::fs::File::create(tmp).await?;
    let mut hasher = Sha256::new();
    let mut bytes = 0u64;

    while let Some(chunk) = response.chunk().await? {
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
        bytes += chunk.len() as u64;
    }
    file.flush().await?;

    Ok((hex_digest(hasher), bytes))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::bytes_sha256;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(max_attempts: u32) -> ObjectFetcher {
        ObjectFetcher::new(
            reqwest::Client::new(),
            RetryConfig {
                max_attempts,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                backoff_multiplier: 2.0,
                jitter: false,
            },
        )
    }

    #[tokio::test]
    async fn downloads_and_hashes_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chair.glb"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"glTF-chair".to_vec()))
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("objects/chair.glb");
        let fetched = fetcher(0)
            .fetch_to(&format!("{}/chair.glb", server.uri()), &target)
            .await
            .unwrap();

        assert_eq!(
            fetched,
            Fetched::Downloaded {
                sha256: bytes_sha256(b"glTF-chair"),
                bytes: 10,
            }
        );
        assert_eq!(std::fs::read(&target).unwrap(), b"glTF-chair");
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn not_found_and_gone_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/deleted.glb"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.glb"))
            .respond_with(ResponseTemplate::new(410))
            .expect(1)
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let fetcher = fetcher(3);
        for name in ["deleted.glb", "gone.glb"] {
            let target = temp_dir.path().join(name);
            let fetched = fetcher
                .fetch_to(&format!("{}/{}", server.uri(), name), &target)
                .await
                .unwrap();
            assert_eq!(fetched, Fetched::NotFound);
            assert!(!target.exists());
        }
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky.glb"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let err = fetcher(2)
            .fetch_to(
                &format!("{}/flaky.glb", server.uri()),
                &temp_dir.path().join("flaky.glb"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn transient_failure_recovers_on_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy.glb"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/busy.glb"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"glTF".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("busy.glb");
        let fetched = fetcher(1)
            .fetch_to(&format!("{}/busy.glb", server.uri()), &target)
            .await
            .unwrap();

        assert!(matches!(fetched, Fetched::Downloaded { bytes: 4, .. }));
        assert_eq!(std::fs::read(&target).unwrap(), b"glTF");
    }

    #[tokio::test]
    async fn client_errors_fail_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/private.glb"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let err = fetcher(5)
            .fetch_to(
                &format!("{}/private.glb", server.uri()),
                &temp_dir.path().join("private.glb"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::HttpStatus { status: 403, .. }));
    }
}
