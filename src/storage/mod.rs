//! Storage module for persisting collected records
//!
//! This module handles all database operations for the collector, including:
//! - SQLite database initialization and schema management
//! - Idempotent upserts of aircraft, operating histories and alias links
//! - Archive-then-delete moves into the archive tables
//! - The persistence queue and its single writer

mod schema;
mod sqlite;
mod traits;
mod writer;

pub use sqlite::{init_database, SqliteStore};
pub use traits::{
    ArchiveTarget, RecordCounts, Repository, StorageError, StorageResult,
};
pub use writer::{
    spawn_writer, WriteCommand, WriterHandle, WriterOutcome, WriterStats, WriterTask,
};

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_storage(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::open(path)
}
