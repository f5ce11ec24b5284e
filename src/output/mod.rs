//! Output module for reporting crawl results
//!
//! This module handles:
//! - Printing the end-of-run summary
//! - Loading and printing live and archived row counts from the store

pub mod stats;
mod summary;

pub use stats::{load_statistics, print_statistics, StoreStatistics};
pub use summary::{format_summary, print_summary};
