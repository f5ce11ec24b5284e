use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for the collector
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Site root that relative links are resolved against
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// First page of the crawl (absolute, or a path relative to `base_url`)
    #[serde(rename = "start-url", default = "default_start_url")]
    pub start_url: String,

    /// Restrict region index extraction to one region slug (e.g. "asia")
    #[serde(default)]
    pub region: Option<String>,

    /// Global bound on concurrent HTTP requests
    #[serde(
        rename = "max-concurrent-requests",
        default = "default_max_concurrent_requests"
    )]
    pub max_concurrent_requests: u32,

    /// Attempts per URL, including the first one
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay of the exponential backoff (milliseconds)
    #[serde(rename = "retry-base-delay-ms", default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Upper bound of the uniform jitter added to each backoff (milliseconds)
    #[serde(rename = "retry-jitter-ms", default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,

    /// Total request timeout, connect through the end of the body (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Connection establishment timeout (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Longest server-requested `Retry-After` wait honoured (seconds)
    #[serde(rename = "max-retry-after-secs", default = "default_max_retry_after_secs")]
    pub max_retry_after_secs: u64,
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Persistence queue and writer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WriterConfig {
    /// Accepted records per committed transaction
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Capacity of the bounded persistence channel
    #[serde(rename = "queue-capacity", default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_start_url() -> String {
    "/area".to_string()
}

fn default_max_concurrent_requests() -> u32 {
    200
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_jitter_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_retry_after_secs() -> u64 {
    60
}

fn default_batch_size() -> usize {
    100
}

fn default_queue_capacity() -> usize {
    1024
}
