//! Storage backend (C2, spec §4.2): a single embedded SQLite database per
//! project identity, schema-versioned, with concurrent readers and a
//! serialized writer.

pub mod call_sites;
pub mod dependency_graph;
pub mod error;
pub mod file_metadata;
pub mod fts;
pub mod header_tracker;
pub mod metadata;
pub mod parse_errors;
pub mod pool;
pub mod schema;
pub mod symbols;

use std::path::Path;

use error::StorageResult;
use pool::Pool;

pub struct Store {
    pool: Pool,
}

impl Store {
    pub fn open(db_path: &Path) -> StorageResult<Self> {
        Ok(Self {
            pool: Pool::open(db_path)?,
        })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Deletes every trace of `path`: symbols, call sites, dependency
    /// edges, owned tracker rows, and its file-metadata row, in one
    /// transaction (spec §4.9 step 5).
    pub fn remove_file(&self, path: &str) -> StorageResult<()> {
        self.pool.with_writer(|conn| {
            if let Some(file_id) = file_metadata::lookup_file_id(conn, path)? {
                symbols::delete_by_file(conn, file_id)?;
                call_sites::delete_by_file(conn, file_id)?;
            }
            dependency_graph::delete_by_source(conn, path)?;
            header_tracker::clear_owned_by(conn, path)?;
            file_metadata::delete(conn, path)?;
            Ok(())
        })
    }

    /// Wipes every file-scoped table, leaving schema and cache metadata
    /// keys behind: used by a `force_full` refresh (spec §6
    /// `refresh_project`) to make the next scan report the whole tree as
    /// newly added.
    pub fn clear_all(&self) -> StorageResult<()> {
        self.pool.with_writer(|conn| {
            conn.execute_batch(
                "DELETE FROM symbols;
                 DELETE FROM call_sites;
                 DELETE FROM dependency_edges;
                 DELETE FROM header_tracker;
                 DELETE FROM parse_errors;
                 DELETE FROM file_metadata;
                 DELETE FROM files;",
            )?;
            metadata::set(conn, metadata::KEY_LAST_COMPILE_COMMANDS_HASH, "")?;
            metadata::reset_updates_since_vacuum(conn)?;
            Ok(())
        })
    }

    /// Opportunistic compaction after N bulk updates (spec §4.2 "Vacuum").
    pub fn maybe_vacuum(&self, threshold: u64) -> StorageResult<bool> {
        let ran = self.pool.with_writer(|conn| {
            let updates: u64 = metadata::get(conn, metadata::KEY_UPDATES_SINCE_VACUUM)?
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            if updates < threshold {
                return Ok(false);
            }
            conn.execute_batch("PRAGMA incremental_vacuum")?;
            metadata::reset_updates_since_vacuum(conn)?;
            Ok(true)
        })?;
        Ok(ran)
    }

    pub fn indexed_file_count(&self) -> StorageResult<i64> {
        let reader = self.pool.reader()?;
        reader
            .query_row("SELECT COUNT(*) FROM file_metadata", [], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn symbol_count(&self) -> StorageResult<i64> {
        let reader = self.pool.reader()?;
        reader
            .query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))
            .map_err(Into::into)
    }
}
