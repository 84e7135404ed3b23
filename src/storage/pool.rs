//! Connection pool enforcing spec §4.2's concurrency discipline: many
//! concurrent readers, a single serialized writer, transactional writes.
//!
//! Grounded in the reader/writer split used by `n01e0-dimpact`'s
//! `cache.rs` (a long-lived write connection plus short-lived read-only
//! connections pulled from a bounded pool) and the teacher's use of
//! `crossbeam-channel` as a work/resource queue elsewhere in the codebase.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

use super::error::{StorageError, StorageResult};
use super::schema;

const READ_CACHE_BYTES: i64 = 64 * 1024 * 1024;
const DEFAULT_READER_POOL_SIZE: usize = 4;

pub struct Pool {
    db_path: PathBuf,
    writer: Mutex<Connection>,
    readers_tx: Sender<Connection>,
    readers_rx: Receiver<Connection>,
}

/// A borrowed read-only connection, returned to the pool on drop.
pub struct PooledReader<'p> {
    pool: &'p Pool,
    conn: Option<Connection>,
}

impl std::ops::Deref for PooledReader<'_> {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection taken")
    }
}

impl Drop for PooledReader<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = self.pool.readers_tx.send(conn);
        }
    }
}

impl Pool {
    pub fn open(db_path: &Path) -> StorageResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer = Connection::open(db_path)?;
        configure_connection(&writer)?;
        schema::migrate(&writer)?;

        let (tx, rx) = crossbeam_channel::bounded(DEFAULT_READER_POOL_SIZE);
        for _ in 0..DEFAULT_READER_POOL_SIZE {
            let reader = open_reader(db_path)?;
            tx.send(reader)
                .map_err(|_| StorageError::IntegrityCheck("reader pool init failed".into()))?;
        }

        Ok(Self {
            db_path: db_path.to_path_buf(),
            writer: Mutex::new(writer),
            readers_tx: tx,
            readers_rx: rx,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Runs `f` inside a `BEGIN IMMEDIATE` transaction on the single
    /// writer connection. Spec §4.2: "writes are transactional"; a panic
    /// or error inside `f` rolls the transaction back, leaving the prior
    /// state observable.
    pub fn with_writer<T>(
        &self,
        f: impl FnOnce(&Connection) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let conn = self.writer.lock();
        conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(&conn) {
            Ok(value) => {
                conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(err) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(err)
            }
        }
    }

    /// Borrows a pooled read-only connection, blocking until one is free.
    pub fn reader(&self) -> StorageResult<PooledReader<'_>> {
        let conn = self
            .readers_rx
            .recv()
            .map_err(|_| StorageError::PoolExhausted)?;
        Ok(PooledReader {
            pool: self,
            conn: Some(conn),
        })
    }

    pub fn integrity_check(&self) -> StorageResult<()> {
        let reader = self.reader()?;
        let result: String = reader.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if result != "ok" {
            return Err(StorageError::IntegrityCheck(result));
        }
        Ok(())
    }
}

fn configure_connection(conn: &Connection) -> StorageResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "cache_size", -(READ_CACHE_BYTES / 1024))?;
    Ok(())
}

fn open_reader(db_path: &Path) -> StorageResult<Connection> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.pragma_update(None, "query_only", "ON")?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_schema_and_passes_integrity_check() {
        let dir = tempdir().unwrap();
        let pool = Pool::open(&dir.path().join("index.db")).unwrap();
        pool.integrity_check().unwrap();
    }

    #[test]
    fn writer_transaction_rolls_back_on_error() {
        let dir = tempdir().unwrap();
        let pool = Pool::open(&dir.path().join("index.db")).unwrap();

        let result: StorageResult<()> = pool.with_writer(|conn| {
            conn.execute(
                "INSERT INTO cache_metadata(key, value) VALUES ('k', 'v')",
                [],
            )?;
            Err(StorageError::IntegrityCheck("forced failure".into()))
        });
        assert!(result.is_err());

        let reader = pool.reader().unwrap();
        let count: i64 = reader
            .query_row("SELECT COUNT(*) FROM cache_metadata", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
