//! First-win header ownership protocol (spec §4.5).

use rusqlite::{params, OptionalExtension};

use super::error::StorageResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerEntry {
    pub path: String,
    pub processed_by: String,
    pub file_hash: String,
    pub compile_commands_hash: Option<String>,
    pub processed_at: i64,
}

pub fn lookup(conn: &rusqlite::Connection, header: &str) -> StorageResult<Option<TrackerEntry>> {
    conn.query_row(
        "SELECT path, processed_by, file_hash, compile_commands_hash, processed_at
         FROM header_tracker WHERE path = ?1",
        params![header],
        |row| {
            Ok(TrackerEntry {
                path: row.get(0)?,
                processed_by: row.get(1)?,
                file_hash: row.get(2)?,
                compile_commands_hash: row.get(3)?,
                processed_at: row.get(4)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

/// Attempts to claim `header` for `owner`. Returns `true` if the claim
/// succeeded (the caller should emit the header's symbols); `false` if
/// another translation unit already owns it (the caller must suppress
/// emission, per spec §4.5 step 3).
///
/// Must be called with the write lock held (inside `Pool::with_writer`):
/// the spec requires first-win to be resolved "at apply-time under the
/// write lock" (§4.9), not based on a stale dispatch-time snapshot.
pub fn try_claim(
    conn: &rusqlite::Connection,
    header: &str,
    owner: &str,
    file_hash: &str,
    compile_commands_hash: Option<&str>,
    now: i64,
) -> StorageResult<bool> {
    let changed = conn.execute(
        "INSERT INTO header_tracker (path, processed_by, file_hash, compile_commands_hash, processed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(path) DO NOTHING",
        params![header, owner, file_hash, compile_commands_hash, now],
    )?;
    Ok(changed == 1)
}

/// Invalidates the tracker row for `header` (content change), allowing
/// the next translation unit to claim it.
pub fn invalidate(conn: &rusqlite::Connection, header: &str) -> StorageResult<()> {
    conn.execute("DELETE FROM header_tracker WHERE path = ?1", params![header])?;
    Ok(())
}

/// Clears every tracker row, used when `compile_commands` changes
/// globally (spec §4.9 step 1).
pub fn clear_all(conn: &rusqlite::Connection) -> StorageResult<()> {
    conn.execute("DELETE FROM header_tracker", [])?;
    Ok(())
}

/// Clears rows owned by `owner`, called before that file is re-parsed so
/// another translation unit may claim the headers it used to own (spec
/// §4.5 invalidation rule 3).
pub fn clear_owned_by(conn: &rusqlite::Connection, owner: &str) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM header_tracker WHERE processed_by = ?1",
        params![owner],
    )?;
    Ok(())
}

pub fn all_headers(conn: &rusqlite::Connection) -> StorageResult<Vec<TrackerEntry>> {
    let mut stmt = conn.prepare(
        "SELECT path, processed_by, file_hash, compile_commands_hash, processed_at FROM header_tracker",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(TrackerEntry {
            path: row.get(0)?,
            processed_by: row.get(1)?,
            file_hash: row.get(2)?,
            compile_commands_hash: row.get(3)?,
            processed_at: row.get(4)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::pool::Pool;
    use tempfile::tempdir;

    #[test]
    fn second_claim_is_suppressed() {
        let dir = tempdir().unwrap();
        let pool = Pool::open(&dir.path().join("index.db")).unwrap();
        pool.with_writer(|conn| {
            let first = try_claim(conn, "/utils.h", "/main.cpp", "h1", None, 1)?;
            let second = try_claim(conn, "/utils.h", "/utils.cpp", "h1", None, 2)?;
            assert!(first);
            assert!(!second);
            let entry = lookup(conn, "/utils.h")?.unwrap();
            assert_eq!(entry.processed_by, "/main.cpp");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn invalidate_allows_reclaim() {
        let dir = tempdir().unwrap();
        let pool = Pool::open(&dir.path().join("index.db")).unwrap();
        pool.with_writer(|conn| {
            try_claim(conn, "/utils.h", "/main.cpp", "h1", None, 1)?;
            invalidate(conn, "/utils.h")?;
            let reclaimed = try_claim(conn, "/utils.h", "/utils.cpp", "h2", None, 2)?;
            assert!(reclaimed);
            Ok(())
        })
        .unwrap();
    }
}
