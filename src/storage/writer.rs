//! Persistence queue and its single writer
//!
//! ```text
//! crawl task ─┐
//! crawl task ─┼─▶ bounded mpsc ─▶ writer (one blocking thread) ─▶ SQLite
//! crawl task ─┘
//! ```
//!
//! Every store mutation of a run goes through this queue. The writer owns the
//! only write connection, applies commands in arrival order, and commits every
//! `batch_size` accepted commands. Each command runs in its own savepoint, so a
//! failing command leaves nothing behind; the already accepted part of the
//! batch is then committed and the writer stops with the error. Its stats up
//! to that point are reported alongside the error.

use crate::model::Record;
use crate::storage::traits::{ArchiveTarget, RecordCounts, Repository, StorageError, StorageResult};
use rusqlite::Connection;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A command for the writer
#[derive(Debug)]
pub enum WriteCommand {
    /// Upsert one record
    Record(Record),

    /// Move rows into the archive tables
    Archive(ArchiveTarget),

    /// End of stream: commit the partial batch and exit
    Finish,
}

/// What the writer did over its lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Records accepted, by kind (no-op upserts included)
    pub records: RecordCounts,

    /// Live rows moved into archive tables
    pub archived_rows: u64,

    /// Commits that contained at least one command
    pub batches: u64,
}

/// How the writer ended: what it did, and the store error that stopped it
#[derive(Debug, Default)]
pub struct WriterOutcome {
    pub stats: WriterStats,
    pub error: Option<StorageError>,
}

impl WriterOutcome {
    pub fn into_result(self) -> StorageResult<WriterStats> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.stats),
        }
    }
}

/// Cloneable producer side of the persistence queue
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriteCommand>,
}

impl WriterHandle {
    /// Enqueues a record, waiting while the queue is full
    pub async fn send(&self, record: Record) -> StorageResult<()> {
        self.command(WriteCommand::Record(record)).await
    }

    pub async fn archive(&self, target: ArchiveTarget) -> StorageResult<()> {
        self.command(WriteCommand::Archive(target)).await
    }

    /// Sends the end-of-stream sentinel
    pub async fn finish(&self) -> StorageResult<()> {
        self.command(WriteCommand::Finish).await
    }

    async fn command(&self, command: WriteCommand) -> StorageResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| StorageError::ChannelClosed)
    }
}

/// The running writer task
pub struct WriterTask {
    handle: JoinHandle<WriterOutcome>,
}

impl WriterTask {
    /// Waits for the writer to exit, keeping its stats even if it failed
    pub async fn outcome(self) -> WriterOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => WriterOutcome {
                stats: WriterStats::default(),
                error: Some(StorageError::WriterJoin(e.to_string())),
            },
        }
    }

    /// Waits for the writer to exit
    pub async fn join(self) -> StorageResult<WriterStats> {
        self.outcome().await.into_result()
    }
}

/// Starts the writer on a dedicated blocking thread
///
/// # Arguments
///
/// * `conn` - The connection the writer will own exclusively
/// * `batch_size` - Accepted commands per commit (at least 1)
/// * `queue_capacity` - Bound of the persistence queue
pub fn spawn_writer(
    conn: Connection,
    batch_size: usize,
    queue_capacity: usize,
) -> (WriterHandle, WriterTask) {
    let (tx, rx) = mpsc::channel(queue_capacity.max(1));
    let batch_size = batch_size.max(1);

    let handle = tokio::task::spawn_blocking(move || run_writer(conn, rx, batch_size));

    (WriterHandle { tx }, WriterTask { handle })
}

fn run_writer(
    conn: Connection,
    mut rx: mpsc::Receiver<WriteCommand>,
    batch_size: usize,
) -> WriterOutcome {
    let mut stats = WriterStats::default();

    tracing::debug!(batch_size, "Writer started");

    let error = drain_queue(&conn, &mut rx, batch_size, &mut stats).err();
    if error.is_none() {
        tracing::info!(
            aircrafts = stats.records.aircrafts,
            histories = stats.records.histories,
            aliases = stats.records.aliases,
            archived = stats.archived_rows,
            batches = stats.batches,
            "Writer finished"
        );
    }

    WriterOutcome { stats, error }
}

fn drain_queue(
    conn: &Connection,
    rx: &mut mpsc::Receiver<WriteCommand>,
    batch_size: usize,
    stats: &mut WriterStats,
) -> StorageResult<()> {
    let mut pending = 0usize;
    let mut tx = conn.unchecked_transaction()?;

    loop {
        let command = match rx.blocking_recv() {
            Some(WriteCommand::Finish) => break,
            Some(command) => command,
            None => {
                tracing::warn!("Persistence queue closed without end-of-stream");
                break;
            }
        };

        let sp = tx.savepoint()?;
        let outcome = match &command {
            WriteCommand::Record(record) => sp.upsert_record(record),
            WriteCommand::Archive(target) => sp.archive_and_delete(target),
            WriteCommand::Finish => Ok(0),
        };

        match outcome {
            Ok(changed) => {
                sp.commit()?;
                pending += 1;
                tally(stats, &command, changed);
            }
            Err(e) => {
                // Dropping the savepoint rolls the command back
                drop(sp);
                tracing::error!(error = %e, ?command, "Store rejected command, stopping writer");
                if pending > 0 {
                    match tx.commit() {
                        Ok(()) => stats.batches += 1,
                        Err(commit) => {
                            tracing::error!(error = %commit, "Failed to commit accepted batch")
                        }
                    }
                }
                return Err(e);
            }
        }

        if pending >= batch_size {
            tx.commit()?;
            stats.batches += 1;
            tracing::debug!(commands = pending, batches = stats.batches, "Committed batch");
            pending = 0;
            tx = conn.unchecked_transaction()?;
        }
    }

    if pending > 0 {
        tx.commit()?;
        stats.batches += 1;
        tracing::debug!(commands = pending, "Committed final batch");
    }

    Ok(())
}

fn tally(stats: &mut WriterStats, command: &WriteCommand, changed: usize) {
    match command {
        WriteCommand::Record(Record::Aircraft(_)) => stats.records.aircrafts += 1,
        WriteCommand::Record(Record::History(_)) => stats.records.histories += 1,
        WriteCommand::Record(Record::Alias(_)) => stats.records.aliases += 1,
        WriteCommand::Archive(_) => stats.archived_rows += changed as u64,
        WriteCommand::Finish => {}
    }
}
