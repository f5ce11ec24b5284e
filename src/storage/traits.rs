//! Storage traits and error types
//!
//! This module defines the repository interface executed by the writer and
//! the associated error types.

use crate::model::{Aircraft, AircraftAlias, AircraftHistory, Record};
use std::fmt;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Persistence queue closed")]
    ChannelClosed,

    #[error("Writer task failed: {0}")]
    WriterJoin(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Logical entity to move from a live table into its archive table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveTarget {
    /// The aircraft row plus every history and alias row it owns
    Aircraft { registration: String },

    /// One operating period, by its unique key
    History {
        registration: String,
        operator_slug: String,
        term_start: String,
    },

    /// One directed alias link
    Alias { base: String, alias: String },
}

impl fmt::Display for ArchiveTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aircraft { registration } => write!(f, "aircraft {}", registration),
            Self::History {
                registration,
                operator_slug,
                term_start,
            } => write!(
                f,
                "history {}/{}/{}",
                registration, operator_slug, term_start
            ),
            Self::Alias { base, alias } => write!(f, "alias {} -> {}", base, alias),
        }
    }
}

/// Row counts of the three record tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub aircrafts: u64,
    pub histories: u64,
    pub aliases: u64,
}

impl RecordCounts {
    pub fn total(&self) -> u64 {
        self.aircrafts + self.histories + self.aliases
    }
}

/// Repository over the collector's data model
///
/// Upserts are idempotent: applying the same input twice leaves the store
/// exactly as applying it once. Each returns the number of rows it changed.
/// Only the writer calls the mutating methods.
pub trait Repository {
    // ===== Upserts =====

    /// Inserts an aircraft or fills in serial/hex on an existing one
    ///
    /// Known serial and hex values are never overwritten with `None`.
    fn upsert_aircraft(&self, aircraft: &Aircraft) -> StorageResult<usize>;

    /// Inserts an operating period or overwrites its mutable fields
    fn upsert_history(&self, history: &AircraftHistory) -> StorageResult<usize>;

    /// Inserts an alias link; an existing `(base, alias)` is left untouched
    fn upsert_alias(&self, alias: &AircraftAlias) -> StorageResult<usize>;

    /// Dispatches a record to the matching upsert
    fn upsert_record(&self, record: &Record) -> StorageResult<usize> {
        match record {
            Record::Aircraft(aircraft) => self.upsert_aircraft(aircraft),
            Record::History(history) => self.upsert_history(history),
            Record::Alias(alias) => self.upsert_alias(alias),
        }
    }

    // ===== Archival =====

    /// Copies the targeted rows into their archive tables and deletes them
    ///
    /// Both steps succeed together or not at all. Returns the number of live
    /// rows moved; a missing key moves nothing.
    fn archive_and_delete(&self, target: &ArchiveTarget) -> StorageResult<usize>;

    // ===== Reads =====

    fn get_aircraft(&self, registration: &str) -> StorageResult<Option<Aircraft>>;

    fn get_histories(&self, registration: &str) -> StorageResult<Vec<AircraftHistory>>;

    fn get_aliases(&self, base_registration: &str) -> StorageResult<Vec<AircraftAlias>>;

    /// Counts rows in the live tables
    fn count_records(&self) -> StorageResult<RecordCounts>;

    /// Counts rows in the archive tables
    fn count_archived(&self) -> StorageResult<RecordCounts>;
}
