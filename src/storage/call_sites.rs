//! Call-site records (spec §3): purely additive per file, wholly replaced
//! on that file's re-parse. No uniqueness constraint on the tuple.

use rusqlite::params;

use super::error::StorageResult;
use crate::symbol::CallSite;
use crate::types::{FileId, SymbolId};

pub fn delete_by_file(conn: &rusqlite::Connection, file: FileId) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM call_sites WHERE file_id = ?1",
        params![file.value()],
    )?;
    Ok(())
}

pub fn insert(conn: &rusqlite::Connection, call: &CallSite) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO call_sites (caller_id, callee_id, file_id, line, column)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            call.caller_id.as_str(),
            call.callee_id.as_str(),
            call.file.value(),
            call.line,
            call.column,
        ],
    )?;
    Ok(())
}

pub fn callers_of(
    conn: &rusqlite::Connection,
    callee: &SymbolId,
) -> StorageResult<Vec<SymbolId>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT caller_id FROM call_sites WHERE callee_id = ?1",
    )?;
    let rows = stmt.query_map(params![callee.as_str()], |row| {
        row.get::<_, String>(0)
    })?;
    rows.map(|r| r.map(SymbolId::new).map_err(Into::into))
        .collect()
}

pub fn callees_of(
    conn: &rusqlite::Connection,
    caller: &SymbolId,
) -> StorageResult<Vec<SymbolId>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT callee_id FROM call_sites WHERE caller_id = ?1",
    )?;
    let rows = stmt.query_map(params![caller.as_str()], |row| {
        row.get::<_, String>(0)
    })?;
    rows.map(|r| r.map(SymbolId::new).map_err(Into::into))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file_metadata::get_or_create_file_id;
    use crate::storage::pool::Pool;
    use tempfile::tempdir;

    #[test]
    fn callers_and_callees_are_queryable_after_insert() {
        let dir = tempdir().unwrap();
        let pool = Pool::open(&dir.path().join("index.db")).unwrap();
        pool.with_writer(|conn| {
            let file = get_or_create_file_id(conn, "/a.cpp")?;
            insert(
                conn,
                &CallSite {
                    caller_id: SymbolId::new("c:@F@main#"),
                    callee_id: SymbolId::new("c:@F@helper#"),
                    file,
                    line: 10,
                    column: Some(4),
                },
            )?;
            let callers = callers_of(conn, &SymbolId::new("c:@F@helper#"))?;
            assert_eq!(callers, vec![SymbolId::new("c:@F@main#")]);
            let callees = callees_of(conn, &SymbolId::new("c:@F@main#"))?;
            assert_eq!(callees, vec![SymbolId::new("c:@F@helper#")]);
            Ok(())
        })
        .unwrap();
    }
}
