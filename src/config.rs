//! Configuration types for auditfeed-dl

use crate::error::{Error, Result};
use crate::fetcher::sink::OutputSink;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Default API root of the management activity feed
pub const DEFAULT_BASE_URL: &str = "https://manage.office.com/api/v1.0";

/// Token scope requested for every feed call
pub const MGMT_SCOPE: &str = "https://manage.office.com/.default";

/// Remote feed settings (tenant, endpoint, content type, HTTP client)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Tenant GUID the feed is scoped to
    #[serde(default)]
    pub tenant_id: String,

    /// API root, without the tenant segment (default: [`DEFAULT_BASE_URL`])
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Content type to list and fetch (default: "DLP.All")
    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Per-request timeout (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            base_url: default_base_url(),
            content_type: default_content_type(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Where fetched records go
///
/// Exactly one of the two destinations is active per run. Leaving both unset
/// selects per-blob files under `audit-out`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for per-blob JSON files
    #[serde(default)]
    pub out_dir: Option<PathBuf>,

    /// Write newline-delimited JSON to stdout instead of files
    #[serde(default)]
    pub stdout: bool,
}

impl OutputConfig {
    /// Fail if the output destination is ambiguous
    pub fn validate(&self) -> Result<()> {
        if self.stdout && self.out_dir.is_some() {
            return Err(Error::config(
                "both an output directory and stream output were requested; pick one",
                "output",
            ));
        }
        Ok(())
    }

    /// Directory that file output would use
    pub fn resolved_dir(&self) -> PathBuf {
        self.out_dir.clone().unwrap_or_else(default_out_dir)
    }

    /// Build the sink selected by this configuration
    pub fn build_sink(&self) -> Result<OutputSink> {
        self.validate()?;
        if self.stdout {
            Ok(OutputSink::stream(tokio::io::stdout()))
        } else {
            Ok(OutputSink::files(self.resolved_dir()))
        }
    }
}

/// Fetch pool settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of blobs fetched in parallel (default: 4)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Retry configuration for transient failures
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

impl RetryConfig {
    /// No retries at all; the first failure is final
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// Main configuration for [`AuditFetcher`](crate::AuditFetcher)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote feed settings
    #[serde(default)]
    pub feed: FeedConfig,

    /// Output destination
    #[serde(default)]
    pub output: OutputConfig,

    /// Fetch pool settings
    #[serde(default)]
    pub pool: PoolConfig,

    /// Retry policy for blob fetches
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Check the settings that would otherwise fail mid-run
    pub fn validate(&self) -> Result<()> {
        if self.feed.tenant_id.trim().is_empty() {
            return Err(Error::config("tenant id is required", "feed.tenant_id"));
        }
        if url::Url::parse(&self.feed.base_url).is_err() {
            return Err(Error::config(
                format!("base url {:?} is not an absolute URL", self.feed.base_url),
                "feed.base_url",
            ));
        }
        if self.pool.concurrency == 0 {
            return Err(Error::config(
                "concurrency must be a positive integer",
                "pool.concurrency",
            ));
        }
        self.output.validate()
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_content_type() -> String {
    "DLP.All".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    concat!("auditfeed-dl/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("audit-out")
}

fn default_concurrency() -> usize {
    4
}

fn default_event_capacity() -> usize {
    1000
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

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
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
