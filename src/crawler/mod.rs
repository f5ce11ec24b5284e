//! Crawler module for page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry logic and a global concurrency bound
//! - Page-kind specific record and link extraction
//! - The frontier of discovered and claimed pages
//! - Overall crawl coordination

mod coordinator;
mod extractor;
mod fetcher;
mod frontier;

pub use coordinator::{run_crawl, Coordinator, CrawlReport, CrawlSummary, PageFailure};
pub use extractor::{extract, Extraction};
pub use fetcher::{build_http_client, FetchError, RetryPolicy, RetryingFetcher};
pub use frontier::{Frontier, FrontierCounts};
