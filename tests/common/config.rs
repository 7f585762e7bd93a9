//! Test configuration pointing every endpoint at a mock server

use objaverse_dl::config::{EndpointConfig, RetryConfig};
use objaverse_dl::{Config, ObjaverseDownloader};
use std::time::Duration;
use wiremock::MockServer;

/// Path prefixes the mock server uses for each endpoint
pub const ANNOTATIONS_PREFIX: &str = "/annotations";
pub const GITHUB_RAW_PREFIX: &str = "/raw";
pub const HUGGINGFACE_PREFIX: &str = "/hf";
pub const THINGIVERSE_PREFIX: &str = "/thingiverse";

/// Config with all endpoints on `server` and fast retries
pub fn test_config(server: &MockServer) -> Config {
    let base = server.uri();
    let mut config = Config::default();
    config.endpoints = EndpointConfig {
        annotations_base_url: format!("{base}{ANNOTATIONS_PREFIX}"),
        github_raw_base_url: format!("{base}{GITHUB_RAW_PREFIX}"),
        huggingface_base_url: format!("{base}{HUGGINGFACE_PREFIX}"),
        thingiverse_base_url: format!("{base}{THINGIVERSE_PREFIX}"),
    };
    config.retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config.download.processes = Some(4);
    config
}

/// Downloader wired to `server`
pub fn test_downloader(server: &MockServer) -> ObjaverseDownloader {
    ObjaverseDownloader::new(test_config(server)).unwrap()
}
