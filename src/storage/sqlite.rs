//! SQLite storage implementation
//!
//! This module provides the SQLite implementation of the `Repository` trait.
//! The trait is implemented directly on `rusqlite::Connection`, so it is
//! equally usable on a `Transaction` or `Savepoint` through deref.

use crate::model::{Aircraft, AircraftAlias, AircraftHistory};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    ArchiveTarget, RecordCounts, Repository, StorageError, StorageResult,
};
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;

/// SQLite storage backend
///
/// Owns one connection. During a crawl that connection is handed to the
/// writer, which is then the only code touching the store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = init_database(path)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Gives up the connection, typically to the writer
    pub fn into_connection(self) -> Connection {
        self.conn
    }
}

/// Opens a connection with the write-ahead journal and relaxed syncing,
/// and creates the schema if it is missing
pub fn init_database(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    // journal_mode returns a row, so it cannot go through execute_batch
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.execute_batch(
        "
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
    ",
    )?;

    initialize_schema(&conn)?;

    Ok(conn)
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Maps constraint failures to their own variant; everything else stays SQLite
fn classify(err: rusqlite::Error) -> StorageError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, ref msg)
            if e.code == ErrorCode::ConstraintViolation =>
        {
            StorageError::ConstraintViolation(msg.clone().unwrap_or_else(|| e.to_string()))
        }
        other => StorageError::Sqlite(other),
    }
}

/// Runs `f` inside a named savepoint, rolling back to it on error
fn in_savepoint<T>(
    conn: &Connection,
    name: &str,
    f: impl FnOnce(&Connection) -> StorageResult<T>,
) -> StorageResult<T> {
    conn.execute_batch(&format!("SAVEPOINT {}", name))?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {}", name))?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) =
                conn.execute_batch(&format!("ROLLBACK TO {0}; RELEASE {0}", name))
            {
                tracing::error!(error = %rollback, "Failed to roll back savepoint {}", name);
            }
            Err(e)
        }
    }
}

fn archive_histories_where(
    conn: &Connection,
    condition: &str,
    args: &[&dyn rusqlite::ToSql],
    archived_at: &str,
) -> StorageResult<usize> {
    let mut params: Vec<&dyn rusqlite::ToSql> = args.to_vec();
    params.push(&archived_at);
    let at = params.len();

    conn.execute(
        &format!(
            "INSERT INTO aircraft_histories_archive (
                original_id, registration_number, airline_slug, airline_name,
                model, operating_status, term_start, term_end,
                created_at, updated_at, archived_at
            )
            SELECT id, registration_number, airline_slug, airline_name,
                   model, operating_status, term_start, term_end,
                   created_at, updated_at, ?{}
            FROM aircraft_histories WHERE {}",
            at, condition
        ),
        params.as_slice(),
    )?;
    Ok(conn.execute(
        &format!("DELETE FROM aircraft_histories WHERE {}", condition),
        args,
    )?)
}

fn archive_aliases_where(
    conn: &Connection,
    condition: &str,
    args: &[&dyn rusqlite::ToSql],
    archived_at: &str,
) -> StorageResult<usize> {
    let mut params: Vec<&dyn rusqlite::ToSql> = args.to_vec();
    params.push(&archived_at);
    let at = params.len();

    conn.execute(
        &format!(
            "INSERT INTO aircraft_aliases_archive (
                original_id, base_registration, alias_registration,
                created_at, updated_at, archived_at
            )
            SELECT id, base_registration, alias_registration,
                   created_at, updated_at, ?{}
            FROM aircraft_aliases WHERE {}",
            at, condition
        ),
        params.as_slice(),
    )?;
    Ok(conn.execute(
        &format!("DELETE FROM aircraft_aliases WHERE {}", condition),
        args,
    )?)
}

fn archive_aircraft_row(
    conn: &Connection,
    registration: &str,
    archived_at: &str,
) -> StorageResult<usize> {
    conn.execute(
        "INSERT INTO aircrafts_archive (
            registration_number, serial_number, hex_code,
            created_at, updated_at, archived_at
        )
        SELECT registration_number, serial_number, hex_code,
               created_at, updated_at, ?2
        FROM aircrafts WHERE registration_number = ?1",
        params![registration, archived_at],
    )?;
    Ok(conn.execute(
        "DELETE FROM aircrafts WHERE registration_number = ?1",
        params![registration],
    )?)
}

fn count(conn: &Connection, table: &str) -> StorageResult<u64> {
    let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(n as u64)
}

impl Repository for Connection {
    // ===== Upserts =====

    fn upsert_aircraft(&self, aircraft: &Aircraft) -> StorageResult<usize> {
        self.execute(
            "INSERT INTO aircrafts (registration_number, serial_number, hex_code, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(registration_number) DO UPDATE SET
                serial_number = COALESCE(excluded.serial_number, aircrafts.serial_number),
                hex_code      = COALESCE(excluded.hex_code, aircrafts.hex_code),
                updated_at    = excluded.updated_at
             WHERE COALESCE(excluded.serial_number, aircrafts.serial_number) IS NOT aircrafts.serial_number
                OR COALESCE(excluded.hex_code, aircrafts.hex_code) IS NOT aircrafts.hex_code",
            params![
                aircraft.registration,
                aircraft.serial_number,
                aircraft.hex_code,
                now()
            ],
        )
        .map_err(classify)
    }

    fn upsert_history(&self, history: &AircraftHistory) -> StorageResult<usize> {
        self.execute(
            "INSERT INTO aircraft_histories (
                registration_number, airline_slug, airline_name, model,
                operating_status, term_start, term_end, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(registration_number, airline_slug, term_start) DO UPDATE SET
                airline_name     = excluded.airline_name,
                model            = excluded.model,
                operating_status = excluded.operating_status,
                term_end         = excluded.term_end,
                updated_at       = excluded.updated_at
             WHERE aircraft_histories.airline_name IS NOT excluded.airline_name
                OR aircraft_histories.model IS NOT excluded.model
                OR aircraft_histories.operating_status IS NOT excluded.operating_status
                OR aircraft_histories.term_end IS NOT excluded.term_end",
            params![
                history.registration,
                history.operator_slug,
                history.operator_name,
                history.model,
                history.status,
                history.term_start,
                history.term_end,
                now()
            ],
        )
        .map_err(classify)
    }

    fn upsert_alias(&self, alias: &AircraftAlias) -> StorageResult<usize> {
        self.execute(
            "INSERT INTO aircraft_aliases (base_registration, alias_registration, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(base_registration, alias_registration) DO NOTHING",
            params![alias.base_registration, alias.alias_registration, now()],
        )
        .map_err(classify)
    }

    // ===== Archival =====

    fn archive_and_delete(&self, target: &ArchiveTarget) -> StorageResult<usize> {
        let archived_at = now();

        in_savepoint(self, "archive_move", |conn| match target {
            ArchiveTarget::Aircraft { registration } => {
                // Children first, so the cascade has nothing left to drop
                let histories = archive_histories_where(
                    conn,
                    "registration_number = ?1",
                    params![registration],
                    &archived_at,
                )?;
                let aliases = archive_aliases_where(
                    conn,
                    "base_registration = ?1",
                    params![registration],
                    &archived_at,
                )?;
                let aircraft = archive_aircraft_row(conn, registration, &archived_at)?;
                Ok(histories + aliases + aircraft)
            }
            ArchiveTarget::History {
                registration,
                operator_slug,
                term_start,
            } => archive_histories_where(
                conn,
                "registration_number = ?1 AND airline_slug = ?2 AND term_start = ?3",
                params![registration, operator_slug, term_start],
                &archived_at,
            ),
            ArchiveTarget::Alias { base, alias } => archive_aliases_where(
                conn,
                "base_registration = ?1 AND alias_registration = ?2",
                params![base, alias],
                &archived_at,
            ),
        })
    }

    // ===== Reads =====

    fn get_aircraft(&self, registration: &str) -> StorageResult<Option<Aircraft>> {
        let aircraft = self
            .query_row(
                "SELECT registration_number, serial_number, hex_code
                 FROM aircrafts WHERE registration_number = ?1",
                params![registration],
                |row| {
                    Ok(Aircraft {
                        registration: row.get(0)?,
                        serial_number: row.get(1)?,
                        hex_code: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(aircraft)
    }

    fn get_histories(&self, registration: &str) -> StorageResult<Vec<AircraftHistory>> {
        let mut stmt = self.prepare(
            "SELECT registration_number, airline_slug, airline_name, model,
                    operating_status, term_start, term_end
             FROM aircraft_histories WHERE registration_number = ?1
             ORDER BY term_start, airline_slug",
        )?;

        let rows = stmt.query_map(params![registration], |row| {
            Ok(AircraftHistory {
                registration: row.get(0)?,
                operator_slug: row.get(1)?,
                operator_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                model: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                status: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                term_start: row.get(5)?,
                term_end: row.get(6)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn get_aliases(&self, base_registration: &str) -> StorageResult<Vec<AircraftAlias>> {
        let mut stmt = self.prepare(
            "SELECT base_registration, alias_registration
             FROM aircraft_aliases WHERE base_registration = ?1
             ORDER BY alias_registration",
        )?;

        let rows = stmt.query_map(params![base_registration], |row| {
            Ok(AircraftAlias {
                base_registration: row.get(0)?,
                alias_registration: row.get(1)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn count_records(&self) -> StorageResult<RecordCounts> {
        Ok(RecordCounts {
            aircrafts: count(self, "aircrafts")?,
            histories: count(self, "aircraft_histories")?,
            aliases: count(self, "aircraft_aliases")?,
        })
    }

    fn count_archived(&self) -> StorageResult<RecordCounts> {
        Ok(RecordCounts {
            aircrafts: count(self, "aircrafts_archive")?,
            histories: count(self, "aircraft_histories_archive")?,
            aliases: count(self, "aircraft_aliases_archive")?,
        })
    }
}
