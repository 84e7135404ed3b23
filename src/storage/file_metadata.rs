//! File identity (`files`) and per-file indexing metadata (`file_metadata`),
//! spec §3 "File metadata". Keyed externally by path; `files.id` is the
//! internal surrogate other tables join against.

use rusqlite::{params, Connection, OptionalExtension};

use super::error::StorageResult;
use crate::types::FileId;

#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub path: String,
    pub file_id: FileId,
    pub content_hash: String,
    pub args_hash: Option<String>,
    pub indexed_at: i64,
    pub symbol_count: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub retry_count: i64,
}

/// Returns the surrogate id for `path`, creating the `files` row if this
/// is the first time the path has been seen.
pub fn get_or_create_file_id(conn: &Connection, path: &str) -> StorageResult<FileId> {
    conn.execute(
        "INSERT INTO files(path) VALUES (?1) ON CONFLICT(path) DO NOTHING",
        params![path],
    )?;
    let id: i64 = conn.query_row("SELECT id FROM files WHERE path = ?1", params![path], |row| {
        row.get(0)
    })?;
    Ok(FileId(id))
}

/// Reverse of `get_or_create_file_id`: the path a surrogate id was
/// assigned to, for presenting query results (spec §4.10) in terms of
/// the paths callers gave us rather than internal ids.
pub fn path_for_id(conn: &Connection, file: FileId) -> StorageResult<Option<String>> {
    conn.query_row(
        "SELECT path FROM files WHERE id = ?1",
        params![file.value()],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

pub fn lookup_file_id(conn: &Connection, path: &str) -> StorageResult<Option<FileId>> {
    let id: Option<i64> = conn
        .query_row("SELECT id FROM files WHERE path = ?1", params![path], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(id.map(FileId))
}

#[allow(clippy::too_many_arguments)]
pub fn upsert(
    conn: &Connection,
    path: &str,
    file_id: FileId,
    content_hash: &str,
    args_hash: Option<&str>,
    indexed_at: i64,
    symbol_count: i64,
    success: bool,
    error_message: Option<&str>,
    retry_count: i64,
) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO file_metadata
            (path, file_id, content_hash, args_hash, indexed_at, symbol_count, success, error_message, retry_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(path) DO UPDATE SET
            content_hash = excluded.content_hash,
            args_hash = excluded.args_hash,
            indexed_at = excluded.indexed_at,
            symbol_count = excluded.symbol_count,
            success = excluded.success,
            error_message = excluded.error_message,
            retry_count = excluded.retry_count",
        params![
            path,
            file_id.value(),
            content_hash,
            args_hash,
            indexed_at,
            symbol_count,
            success as i64,
            error_message,
            retry_count,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, path: &str) -> StorageResult<Option<FileMetadata>> {
    conn.query_row(
        "SELECT path, file_id, content_hash, args_hash, indexed_at, symbol_count, success, error_message, retry_count
         FROM file_metadata WHERE path = ?1",
        params![path],
        |row| {
            Ok(FileMetadata {
                path: row.get(0)?,
                file_id: FileId(row.get(1)?),
                content_hash: row.get(2)?,
                args_hash: row.get(3)?,
                indexed_at: row.get(4)?,
                symbol_count: row.get(5)?,
                success: row.get::<_, i64>(6)? != 0,
                error_message: row.get(7)?,
                retry_count: row.get(8)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

pub fn all(conn: &Connection) -> StorageResult<Vec<FileMetadata>> {
    let mut stmt = conn.prepare(
        "SELECT path, file_id, content_hash, args_hash, indexed_at, symbol_count, success, error_message, retry_count
         FROM file_metadata",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(FileMetadata {
            path: row.get(0)?,
            file_id: FileId(row.get(1)?),
            content_hash: row.get(2)?,
            args_hash: row.get(3)?,
            indexed_at: row.get(4)?,
            symbol_count: row.get(5)?,
            success: row.get::<_, i64>(6)? != 0,
            error_message: row.get(7)?,
            retry_count: row.get(8)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub fn delete(conn: &Connection, path: &str) -> StorageResult<()> {
    conn.execute("DELETE FROM file_metadata WHERE path = ?1", params![path])?;
    conn.execute("DELETE FROM files WHERE path = ?1", params![path])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::pool::Pool;
    use tempfile::tempdir;

    #[test]
    fn get_or_create_file_id_is_idempotent() {
        let dir = tempdir().unwrap();
        let pool = Pool::open(&dir.path().join("index.db")).unwrap();
        pool.with_writer(|conn| {
            let a = get_or_create_file_id(conn, "/a.cpp")?;
            let b = get_or_create_file_id(conn, "/a.cpp")?;
            assert_eq!(a, b);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let pool = Pool::open(&dir.path().join("index.db")).unwrap();
        pool.with_writer(|conn| {
            let id = get_or_create_file_id(conn, "/a.cpp")?;
            upsert(conn, "/a.cpp", id, "hash1", Some("argshash"), 100, 3, true, None, 0)?;
            let meta = get(conn, "/a.cpp")?.unwrap();
            assert_eq!(meta.content_hash, "hash1");
            assert_eq!(meta.symbol_count, 3);
            Ok(())
        })
        .unwrap();
    }
}
