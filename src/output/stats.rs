//! Statistics generation from the collector database
//!
//! This module provides functionality for extracting and displaying
//! row counts from the storage layer.

use crate::storage::{RecordCounts, Repository, StorageResult};

/// Store statistics summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStatistics {
    /// Rows in the live tables
    pub live: RecordCounts,

    /// Rows in the archive tables
    pub archived: RecordCounts,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `repo` - The repository to query
pub fn load_statistics(repo: &dyn Repository) -> StorageResult<StoreStatistics> {
    Ok(StoreStatistics {
        live: repo.count_records()?,
        archived: repo.count_archived()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &StoreStatistics) {
    println!("=== Store Statistics ===\n");

    println!("{:<12} {:>10} {:>10}", "", "live", "archived");
    for (label, live, archived) in [
        ("Aircraft", stats.live.aircrafts, stats.archived.aircrafts),
        ("Histories", stats.live.histories, stats.archived.histories),
        ("Aliases", stats.live.aliases, stats.archived.aliases),
    ] {
        println!("{:<12} {:>10} {:>10}", label, live, archived);
    }
    println!(
        "{:<12} {:>10} {:>10}",
        "Total",
        stats.live.total(),
        stats.archived.total()
    );

    if stats.live.aircrafts > 0 {
        let per_aircraft = stats.live.histories as f64 / stats.live.aircrafts as f64;
        println!("\nHistories per aircraft: {:.2}", per_aircraft);
    }
}
