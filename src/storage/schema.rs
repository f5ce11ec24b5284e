//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the collector database:
//! three live tables and one archive table per live table.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Aircraft master records
CREATE TABLE IF NOT EXISTS aircrafts (
    registration_number TEXT PRIMARY KEY,
    serial_number       TEXT,
    hex_code            TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

-- Operating periods, one per (registration, operator, start)
CREATE TABLE IF NOT EXISTS aircraft_histories (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    registration_number TEXT NOT NULL
        REFERENCES aircrafts(registration_number) ON DELETE CASCADE,
    airline_slug        TEXT NOT NULL DEFAULT '',
    airline_name        TEXT,
    model               TEXT,
    operating_status    TEXT,
    term_start          TEXT NOT NULL CHECK (term_start <> ''),
    term_end            TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    UNIQUE(registration_number, airline_slug, term_start)
);

-- Directed alias links; the alias side may not have been crawled yet
CREATE TABLE IF NOT EXISTS aircraft_aliases (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    base_registration   TEXT NOT NULL
        REFERENCES aircrafts(registration_number) ON DELETE CASCADE,
    alias_registration  TEXT NOT NULL CHECK (alias_registration <> base_registration),
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    UNIQUE(base_registration, alias_registration)
);

CREATE INDEX IF NOT EXISTS idx_histories_reg ON aircraft_histories(registration_number);
CREATE INDEX IF NOT EXISTS idx_aliases_base ON aircraft_aliases(base_registration);
CREATE INDEX IF NOT EXISTS idx_aliases_alias ON aircraft_aliases(alias_registration);

-- Archive tables: write-once copies of removed rows, keyed by a surrogate
-- that is never reused
CREATE TABLE IF NOT EXISTS aircrafts_archive (
    archive_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    registration_number TEXT NOT NULL,
    serial_number       TEXT,
    hex_code            TEXT,
    created_at          TEXT,
    updated_at          TEXT,
    archived_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS aircraft_histories_archive (
    archive_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    original_id         INTEGER NOT NULL,
    registration_number TEXT,
    airline_slug        TEXT,
    airline_name        TEXT,
    model               TEXT,
    operating_status    TEXT,
    term_start          TEXT,
    term_end            TEXT,
    created_at          TEXT,
    updated_at          TEXT,
    archived_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS aircraft_aliases_archive (
    archive_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    original_id         INTEGER NOT NULL,
    base_registration   TEXT,
    alias_registration  TEXT,
    created_at          TEXT,
    updated_at          TEXT,
    archived_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_aircrafts_archive_reg
    ON aircrafts_archive(registration_number);
CREATE INDEX IF NOT EXISTS idx_histories_archive_reg
    ON aircraft_histories_archive(registration_number);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
