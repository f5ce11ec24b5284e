//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the collector, including:
//! - Building the HTTP client with user agent, headers and a total timeout
//! - A global bound on in-flight requests
//! - Retry with exponential backoff and jitter, honouring `Retry-After`
//! - Classification into transient and permanent failures
//! - Abandoning requests and backoff sleeps on shutdown

use crate::config::{CrawlerConfig, UserAgentConfig};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Terminal outcome of a failed fetch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Timeouts, 5xx, 429 and transport errors, still failing after the last attempt
    #[error("{url}: gave up after {attempts} attempts: {reason}")]
    Transient {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// A 4xx other than 429; never retried
    #[error("{url}: HTTP {status}")]
    Permanent { url: String, status: u16 },

    /// Shutdown was requested before the fetch completed
    #[error("{url}: cancelled")]
    Cancelled { url: String },
}

/// Retry schedule for one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    pub base_delay: Duration,

    /// Upper bound of the uniform jitter added to each backoff
    pub jitter: Duration,

    /// Longest `Retry-After` honoured; longer requests are cut to this
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            jitter: Duration::from_secs(1),
            max_retry_after: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            jitter: Duration::from_millis(config.retry_jitter_ms),
            max_retry_after: Duration::from_secs(config.max_retry_after_secs),
        }
    }

    /// Delay after the failed attempt `attempt` (0-based): `base * 2^attempt + jitter`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        exponential.saturating_add(Duration::from_millis(jitter))
    }

    /// Delay after the failed attempt `attempt`, preferring the server's
    /// `Retry-After` up to `max_retry_after`
    pub fn retry_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(requested) => requested.min(self.max_retry_after),
            None => self.backoff(attempt),
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// The `timeout` bounds the whole request, connect through the last byte of
/// the body; `connect_timeout` only bounds connection setup.
///
/// # Example
///
/// ```no_run
/// use flyteam_collector::config::parse_config;
/// use flyteam_collector::crawler::build_http_client;
///
/// let config = parse_config(&std::fs::read_to_string("collector.toml").unwrap()).unwrap();
/// let client = build_http_client(&config.user_agent, &config.crawler).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    crawler: &CrawlerConfig,
) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("text/html"));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("ja,en-US;q=0.9,en;q=0.8"),
    );

    Client::builder()
        .user_agent(user_agent.header_value())
        .default_headers(headers)
        .timeout(crawler.request_timeout())
        .connect_timeout(crawler.connect_timeout())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Outcome of a single attempt
enum Attempt {
    Body(String),
    Retry {
        reason: String,
        retry_after: Option<Duration>,
    },
    Permanent(StatusCode),
    Cancelled,
}

/// Fetcher shared by all crawl tasks
///
/// Holds the global permit set: at most `max_concurrent` requests are on the
/// wire at once. A permit covers one attempt and is released while backing
/// off, so sleeping tasks never hold capacity.
#[derive(Debug, Clone)]
pub struct RetryingFetcher {
    client: Client,
    permits: Arc<Semaphore>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryingFetcher {
    pub fn new(
        client: Client,
        max_concurrent: usize,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            policy,
            cancel,
        }
    }

    /// Fetches `url`, retrying transient failures
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx | Return body |
    /// | HTTP 429 | Wait `Retry-After` seconds if given, else back off |
    /// | HTTP 5xx | Back off and retry |
    /// | Timeout / transport error | Back off and retry |
    /// | Other 4xx | Permanent, no retry |
    /// | Shutdown | Cancelled, immediately |
    pub async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let mut last_reason = String::new();

        for attempt in 0..self.policy.max_attempts {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled(url));
            }

            match self.attempt(url).await {
                Attempt::Body(body) => {
                    if attempt > 0 {
                        tracing::debug!(url = %url, attempt, "Fetched after retry");
                    }
                    return Ok(body);
                }
                Attempt::Permanent(status) => {
                    return Err(FetchError::Permanent {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                Attempt::Cancelled => return Err(self.cancelled(url)),
                Attempt::Retry {
                    reason,
                    retry_after,
                } => {
                    last_reason = reason;

                    // No sleep after the final attempt
                    if attempt + 1 >= self.policy.max_attempts {
                        break;
                    }

                    if let Some(requested) =
                        retry_after.filter(|r| *r > self.policy.max_retry_after)
                    {
                        tracing::warn!(
                            url = %url,
                            requested_secs = requested.as_secs(),
                            max_secs = self.policy.max_retry_after.as_secs(),
                            "Retry-After too long, clamping"
                        );
                    }
                    let delay = self.policy.retry_delay(attempt, retry_after);
                    tracing::debug!(
                        url = %url,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        reason = %last_reason,
                        "Retrying"
                    );

                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(self.cancelled(url)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        Err(FetchError::Transient {
            url: url.to_string(),
            attempts: self.policy.max_attempts,
            reason: last_reason,
        })
    }

    async fn attempt(&self, url: &Url) -> Attempt {
        let _permit = tokio::select! {
            _ = self.cancel.cancelled() => return Attempt::Cancelled,
            permit = self.permits.acquire() => match permit {
                Ok(permit) => permit,
                // The semaphore is never closed while the fetcher lives
                Err(_) => return Attempt::Cancelled,
            },
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Attempt::Cancelled,
            attempt = self.request(url) => attempt,
        }
    }

    async fn request(&self, url: &Url) -> Attempt {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                return Attempt::Retry {
                    reason: describe(&e),
                    retry_after: None,
                }
            }
        };

        let status = response.status();

        if status.is_success() {
            return match response.text().await {
                Ok(body) => Attempt::Body(body),
                Err(e) => Attempt::Retry {
                    reason: describe(&e),
                    retry_after: None,
                },
            };
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Attempt::Retry {
                reason: format!("HTTP {}", status.as_u16()),
                retry_after: retry_after(&response),
            };
        }

        if status.is_server_error() {
            return Attempt::Retry {
                reason: format!("HTTP {}", status.as_u16()),
                retry_after: None,
            };
        }

        Attempt::Permanent(status)
    }

    fn cancelled(&self, url: &Url) -> FetchError {
        FetchError::Cancelled {
            url: url.to_string(),
        }
    }
}

/// Parses a delay-seconds `Retry-After` header; HTTP-date values are ignored
fn retry_after(response: &Response) -> Option<Duration> {
    parse_retry_after(response.headers().get(RETRY_AFTER)?.to_str().ok()?)
}

fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        "connection failed".to_string()
    } else {
        e.to_string()
    }
}
