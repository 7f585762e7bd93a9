//! Configuration types for objaverse-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Download behavior configuration (directories, concurrency)
///
/// Used as a nested sub-config within [`Config`]. These are defaults for the
/// CLI and for callers that do not pass explicit values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root directory for objects and cached annotation tables (default: "~/.objaverse")
    ///
    /// `None` means downloaded objects are discarded after the handlers ran.
    #[serde(default = "default_download_dir")]
    pub download_dir: Option<PathBuf>,

    /// Worker pool size per source (None = available parallelism)
    #[serde(default)]
    pub processes: Option<usize>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            processes: None,
        }
    }
}

impl DownloadConfig {
    /// Worker count to use, falling back to the host's available parallelism
    pub fn effective_processes(&self) -> usize {
        resolve_processes(self.processes)
    }
}

/// Remote endpoints for objects and annotation tables
///
/// Overridable so mirrors (and mock servers in tests) can stand in for the
/// public hosts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL for per-source annotation tables (`<base>/<source>/<file>`)
    #[serde(default = "default_annotations_base_url")]
    pub annotations_base_url: String,

    /// Base URL serving raw github file contents
    #[serde(default = "default_github_raw_base_url")]
    pub github_raw_base_url: String,

    /// Base URL of the Objaverse 1.0 dataset holding sketchfab objects
    #[serde(default = "default_huggingface_base_url")]
    pub huggingface_base_url: String,

    /// Base URL for thingiverse file downloads
    #[serde(default = "default_thingiverse_base_url")]
    pub thingiverse_base_url: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            annotations_base_url: default_annotations_base_url(),
            github_raw_base_url: default_github_raw_base_url(),
            huggingface_base_url: default_huggingface_base_url(),
            thingiverse_base_url: default_thingiverse_base_url(),
        }
    }
}

/// HTTP client settings shared by all source downloaders
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Whole-request timeout (default: 300 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Connection establishment timeout (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    /// Build a reqwest client from these settings
    pub fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(Error::Network)
    }
}

/// Retry configuration for transient failures inside a source downloader
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for ObjaverseDownloader
///
/// Every section has defaults, so an empty JSON object is a valid config file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download directory and worker pool defaults
    #[serde(default)]
    pub download: DownloadConfig,

    /// Remote hosts for objects and annotations
    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Retry policy for transient download faults
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load a configuration from a JSON file and validate it
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check semantic constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.download.processes == Some(0) {
            return Err(Error::config("processes", "must be at least 1"));
        }
        for (key, value) in [
            ("annotations_base_url", &self.endpoints.annotations_base_url),
            ("github_raw_base_url", &self.endpoints.github_raw_base_url),
            ("huggingface_base_url", &self.endpoints.huggingface_base_url),
            ("thingiverse_base_url", &self.endpoints.thingiverse_base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| Error::config(key, format!("invalid URL {value:?}: {e}")))?;
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "backoff_multiplier",
                "must be greater than or equal to 1.0",
            ));
        }
        Ok(())
    }

    /// Download directory with `~` expanded
    pub fn download_dir(&self) -> Option<PathBuf> {
        self.download
            .download_dir
            .as_deref()
            .map(crate::utils::expand_home)
    }
}

/// Resolve an optional worker count to a concrete one (at least 1)
pub fn resolve_processes(processes: Option<usize>) -> usize {
    processes
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
        .max(1)
}

fn default_download_dir() -> Option<PathBuf> {
    Some(PathBuf::from("~/.objaverse"))
}

fn default_annotations_base_url() -> String {
    "https://huggingface.co/datasets/allenai/objaverse-xl/resolve/main".to_string()
}

fn default_github_raw_base_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}

fn default_huggingface_base_url() -> String {
    "https://huggingface.co/datasets/allenai/objaverse/resolve/main".to_string()
}

fn default_thingiverse_base_url() -> String {
    "https://www.thingiverse.com".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("objaverse-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Durations are stored as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(
            config.download.download_dir,
            Some(PathBuf::from("~/.objaverse"))
        );
        assert_eq!(config.download.processes, None);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.http.timeout, Duration::from_secs(300));
        assert!(config.endpoints.github_raw_base_url.contains("githubusercontent"));
        config.validate().unwrap();
    }

    #[test]
    fn null_download_dir_disables_retention() {
        let config: Config =
            serde_json::from_str(r#"{"download": {"download_dir": null, "processes": 4}}"#)
                .unwrap();
        assert_eq!(config.download_dir(), None);
        assert_eq!(config.download.effective_processes(), 4);
    }

    #[test]
    fn durations_are_seconds() {
        let config: Config =
            serde_json::from_str(r#"{"http": {"timeout": 12}, "retry": {"initial_delay": 2}}"#)
                .unwrap();
        assert_eq!(config.http.timeout, Duration::from_secs(12));
        assert_eq!(config.retry.initial_delay, Duration::from_secs(2));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["http"]["timeout"], 12);
    }

    #[test]
    fn validate_rejects_zero_processes() {
        let mut config = Config::default();
        config.download.processes = Some(0);
        match config.validate().unwrap_err() {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("processes")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validate_rejects_bad_urls() {
        let mut config = Config::default();
        config.endpoints.thingiverse_base_url = "not a url".into();
        match config.validate().unwrap_err() {
            Error::Config { key, .. } => {
                assert_eq!(key.as_deref(), Some("thingiverse_base_url"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolve_processes_is_at_least_one() {
        assert_eq!(resolve_processes(Some(0)), 1);
        assert_eq!(resolve_processes(Some(6)), 6);
        assert!(resolve_processes(None) >= 1);
    }

    #[test]
    fn from_file_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"download": {"processes": 2}}"#).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.download.processes, Some(2));

        std::fs::write(&path, r#"{"download": {"processes": 0}}"#).unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(Error::Config { .. })
        ));
    }
}
