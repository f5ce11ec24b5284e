//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates:
//! - Claiming pages from the frontier, at most N in flight
//! - Fetching, extracting, and forwarding records to the persistence queue
//! - Feeding discovered links back into the frontier
//! - Draining in-flight work on shutdown before the writer's final commit
//!
//! The coordinator never touches the store; its only route to persistence is
//! the [`WriterHandle`].

use crate::config::Config;
use crate::crawler::extractor::extract;
use crate::crawler::fetcher::{build_http_client, FetchError, RetryPolicy, RetryingFetcher};
use crate::crawler::frontier::Frontier;
use crate::storage::{open_storage, spawn_writer, StorageError, WriterHandle, WriterStats};
use crate::url::{resolve_start_url, CrawlTarget, PageKind};
use crate::ConfigError;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{self, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Detail pages between progress log lines
const PROGRESS_INTERVAL: u64 = 100;

/// How one crawl task ended
#[derive(Debug)]
enum TaskOutcome {
    Done {
        kind: PageKind,
        rejected: usize,
    },
    Failed(FetchError),
    Cancelled,
    QueueClosed,
}

/// A page given up on, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    pub url: String,
    pub reason: String,
}

impl fmt::Display for PageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.url, self.reason)
    }
}

impl From<FetchError> for PageFailure {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::Transient {
                url,
                attempts,
                reason,
            } => PageFailure {
                url,
                reason: format!("gave up after {} attempts: {}", attempts, reason),
            },
            FetchError::Permanent { url, status } => PageFailure {
                url,
                reason: format!("HTTP {}", status),
            },
            FetchError::Cancelled { url } => PageFailure {
                url,
                reason: "cancelled".to_string(),
            },
        }
    }
}

/// What the coordinator observed during a run
#[derive(Debug, Clone, Default)]
pub struct CrawlReport {
    /// Pages fetched and extracted
    pub pages_fetched: u64,

    /// Aircraft detail pages among them
    pub details_fetched: u64,

    /// URLs given up on, with the reason
    pub failed: Vec<PageFailure>,

    /// Records dropped by validation
    pub rejected: u64,

    /// Shutdown was requested before the frontier ran dry
    pub interrupted: bool,
}

/// End-of-run summary combining crawl and writer results
#[derive(Debug)]
pub struct CrawlSummary {
    pub report: CrawlReport,
    pub writer: WriterStats,

    /// Store error that stopped the writer, and with it the crawl
    pub writer_error: Option<StorageError>,

    pub elapsed: Duration,
}

/// State shared by every crawl task
struct TaskContext {
    fetcher: RetryingFetcher,
    frontier: Arc<Frontier>,
    writer: WriterHandle,
    region: Option<String>,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    ctx: Arc<TaskContext>,
    cancel: CancellationToken,
    max_in_flight: usize,
}

impl Coordinator {
    /// Creates a new coordinator
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Shared retrying fetcher (owns the global permit set)
    /// * `frontier` - Frontier, usually seeded with the start page
    /// * `writer` - Producer side of the persistence queue
    /// * `cancel` - Shutdown signal
    /// * `region` - Optional region filter for the region index
    /// * `max_in_flight` - Cap on concurrently running crawl tasks
    pub fn new(
        fetcher: RetryingFetcher,
        frontier: Arc<Frontier>,
        writer: WriterHandle,
        cancel: CancellationToken,
        region: Option<String>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            ctx: Arc::new(TaskContext {
                fetcher,
                frontier,
                writer,
                region,
            }),
            cancel,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Runs the crawl until the frontier is exhausted or shutdown is requested
    ///
    /// On shutdown no further pages are claimed and in-flight tasks are
    /// drained before returning. The end-of-stream sentinel is the caller's
    /// responsibility.
    pub async fn run(self) -> CrawlReport {
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<task::Id, CrawlTarget> = HashMap::new();
        let mut report = CrawlReport::default();
        let start_time = Instant::now();

        loop {
            if !self.cancel.is_cancelled() {
                while tasks.len() < self.max_in_flight {
                    let Some(target) = self.ctx.frontier.next_unclaimed() else {
                        break;
                    };
                    tracing::debug!(url = %target.url, kind = %target.kind, "Claimed");
                    let handle = tasks.spawn(crawl_page(Arc::clone(&self.ctx), target.clone()));
                    in_flight.insert(handle.id(), target);
                }
            }

            let Some(joined) = tasks.join_next_with_id().await else {
                break;
            };

            let outcome = match joined {
                Ok((id, outcome)) => {
                    in_flight.remove(&id);
                    outcome
                }
                Err(e) => {
                    let target = in_flight.remove(&e.id());
                    record_lost_task(&self.ctx.frontier, target, &e, &mut report);
                    continue;
                }
            };

            match outcome {
                TaskOutcome::Done { kind, rejected } => {
                    report.pages_fetched += 1;
                    report.rejected += rejected as u64;
                    if kind != PageKind::AircraftDetail {
                        continue;
                    }

                    report.details_fetched += 1;
                    if report.details_fetched % PROGRESS_INTERVAL == 0 {
                        let rate = report.pages_fetched as f64 / start_time.elapsed().as_secs_f64();
                        tracing::info!(
                            pages = report.pages_fetched,
                            details = report.details_fetched,
                            pending = self.ctx.frontier.pending(),
                            in_flight = tasks.len(),
                            "Progress: {:.2} pages/sec",
                            rate
                        );
                    }
                }
                TaskOutcome::Failed(e) => {
                    tracing::warn!(error = %e, "Page failed, skipping");
                    report.failed.push(e.into());
                }
                TaskOutcome::Cancelled => {}
                TaskOutcome::QueueClosed => {
                    if !self.cancel.is_cancelled() {
                        tracing::error!("Persistence queue closed, stopping crawl");
                        self.cancel.cancel();
                    }
                }
            }
        }

        report.interrupted = self.cancel.is_cancelled();

        tracing::info!(
            pages = report.pages_fetched,
            failed = report.failed.len(),
            rejected = report.rejected,
            interrupted = report.interrupted,
            "Crawl loop finished in {:?}",
            start_time.elapsed()
        );

        report
    }
}

/// Marks the page of a task that panicked as failed so it shows up in the report
fn record_lost_task(
    frontier: &Frontier,
    target: Option<CrawlTarget>,
    error: &JoinError,
    report: &mut CrawlReport,
) {
    let reason = if error.is_panic() {
        "crawl task panicked"
    } else {
        "crawl task aborted"
    };

    let Some(target) = target else {
        tracing::error!(error = %error, "{} for an untracked page", reason);
        return;
    };

    tracing::error!(url = %target.url, error = %error, "{}", reason);
    frontier.mark_failed(&target.url);
    report.failed.push(PageFailure {
        url: target.url.to_string(),
        reason: reason.to_string(),
    });
}

/// Fetches one page, forwards its records and feeds its links back
async fn crawl_page(ctx: Arc<TaskContext>, target: CrawlTarget) -> TaskOutcome {
    let body = match ctx.fetcher.fetch(&target.url).await {
        Ok(body) => body,
        Err(FetchError::Cancelled { .. }) => return TaskOutcome::Cancelled,
        Err(e) => {
            ctx.frontier.mark_failed(&target.url);
            return TaskOutcome::Failed(e);
        }
    };

    let extraction = extract(&body, &target, ctx.region.as_deref());

    for error in &extraction.rejected {
        tracing::debug!(url = %target.url, error = %error, "Dropped invalid record");
    }

    for record in extraction.records {
        if ctx.writer.send(record).await.is_err() {
            return TaskOutcome::QueueClosed;
        }
    }

    for link in extraction.links {
        ctx.frontier.discover(link);
    }

    ctx.frontier.mark_done(&target.url);

    TaskOutcome::Done {
        kind: target.kind,
        rejected: extraction.rejected.len(),
    }
}

/// Runs a complete crawl from configuration
///
/// Opens the store, starts the single writer, crawls from the configured
/// start page until done or `cancel` fires, then sends the end-of-stream
/// sentinel and waits for the writer's final commit. A store failure ends the
/// crawl early; it is returned in [`CrawlSummary::writer_error`] next to the
/// report of everything done up to that point.
pub async fn run_crawl(
    config: &Config,
    cancel: CancellationToken,
) -> crate::Result<CrawlSummary> {
    let start_time = Instant::now();
    let seed = resolve_start_url(&config.crawler.base_url, &config.crawler.start_url)
        .ok_or_else(|| ConfigError::InvalidUrl(config.crawler.start_url.clone()))?;

    let store = open_storage(Path::new(&config.output.database_path))?;
    let (writer, writer_task) = spawn_writer(
        store.into_connection(),
        config.writer.batch_size,
        config.writer.queue_capacity,
    );

    let client = build_http_client(&config.user_agent, &config.crawler)?;
    let max_concurrent = config.crawler.max_concurrent_requests as usize;
    let fetcher = RetryingFetcher::new(
        client,
        max_concurrent,
        RetryPolicy::from_config(&config.crawler),
        cancel.clone(),
    );

    tracing::info!(start = %seed.url, kind = %seed.kind, "Starting crawl");

    let coordinator = Coordinator::new(
        fetcher,
        Arc::new(Frontier::with_seed(seed)),
        writer.clone(),
        cancel,
        config.crawler.region.clone(),
        max_concurrent,
    );
    let report = coordinator.run().await;

    if writer.finish().await.is_err() {
        tracing::warn!("Writer already stopped before end-of-stream");
    }
    drop(writer);

    let outcome = writer_task.outcome().await;

    Ok(CrawlSummary {
        report,
        writer: outcome.stats,
        writer_error: outcome.error,
        elapsed: start_time.elapsed(),
    })
}
