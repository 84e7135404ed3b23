//! Append-only parse-error log (spec §3 "Parse error record", §7).

use rusqlite::params;

use super::error::StorageResult;

pub struct ParseErrorRecord<'a> {
    pub file: &'a str,
    pub error_kind: &'a str,
    pub message: &'a str,
    pub stacktrace: Option<&'a str>,
    pub file_hash: Option<&'a str>,
    pub args_hash: Option<&'a str>,
    pub retry_count: i64,
    pub timestamp: i64,
}

pub fn append(conn: &rusqlite::Connection, record: &ParseErrorRecord<'_>) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO parse_errors (file, error_kind, message, stacktrace, file_hash, args_hash, retry_count, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.file,
            record.error_kind,
            record.message,
            record.stacktrace,
            record.file_hash,
            record.args_hash,
            record.retry_count,
            record.timestamp,
        ],
    )?;
    Ok(())
}

pub fn for_file(conn: &rusqlite::Connection, file: &str) -> StorageResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT message FROM parse_errors WHERE file = ?1 ORDER BY id DESC",
    )?;
    let rows = stmt.query_map(params![file], |row| row.get::<_, String>(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}
