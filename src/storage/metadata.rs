//! Cache-wide key/value metadata (spec §3 "Cache metadata"): schema
//! version lives in `PRAGMA user_version` (see `schema.rs`); this table
//! holds the remaining keys (`include_dependencies`, `indexed_file_count`,
//! last vacuum time, last `compile_commands` hash), mirroring the
//! teacher's `storage/metadata.rs` `IndexMetadata` bookkeeping idea but
//! as a generic KV table rather than a single JSON blob.

use rusqlite::{params, OptionalExtension};

use super::error::StorageResult;

pub const KEY_LAST_COMPILE_COMMANDS_HASH: &str = "last_compile_commands_hash";
pub const KEY_LAST_VACUUM_AT: &str = "last_vacuum_at";
pub const KEY_INDEXED_FILE_COUNT: &str = "indexed_file_count";
pub const KEY_INCLUDE_DEPENDENCIES: &str = "include_dependencies";
pub const KEY_UPDATES_SINCE_VACUUM: &str = "updates_since_vacuum";
pub const KEY_LAST_REFRESH_AT: &str = "last_refresh_at";

pub fn get(conn: &rusqlite::Connection, key: &str) -> StorageResult<Option<String>> {
    conn.query_row(
        "SELECT value FROM cache_metadata WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

pub fn set(conn: &rusqlite::Connection, key: &str, value: &str) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO cache_metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn increment_updates_since_vacuum(conn: &rusqlite::Connection) -> StorageResult<u64> {
    let current: u64 = get(conn, KEY_UPDATES_SINCE_VACUUM)?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let next = current + 1;
    set(conn, KEY_UPDATES_SINCE_VACUUM, &next.to_string())?;
    Ok(next)
}

pub fn reset_updates_since_vacuum(conn: &rusqlite::Connection) -> StorageResult<()> {
    set(conn, KEY_UPDATES_SINCE_VACUUM, "0")
}
