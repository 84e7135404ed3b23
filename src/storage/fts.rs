//! Full-text symbol search over `symbols_fts` (spec §4.2, §4.10).
//!
//! The virtual table and its sync triggers live in `schema.rs`; this
//! module only issues the `MATCH` queries used when a search pattern is
//! not anchored (anchored patterns go through `regex` in `query.rs`).

use rusqlite::params;

use super::error::StorageResult;
use super::symbols::row_to_symbol;
use crate::symbol::Symbol;

/// Escapes an FTS5 MATCH query: wraps the term in double quotes and
/// doubles any embedded quote, then appends a prefix wildcard so partial
/// identifiers match.
fn fts_query(pattern: &str) -> String {
    let escaped = pattern.replace('"', "\"\"");
    format!("\"{escaped}\"*")
}

pub fn search(
    conn: &rusqlite::Connection,
    pattern: &str,
    limit: i64,
) -> StorageResult<Vec<Symbol>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, s.qualified_name, s.kind, s.file_id, s.line, s.column,
                s.start_line, s.end_line, s.declaration_file_id, s.declaration_start_line,
                s.declaration_end_line, s.signature, s.is_project, s.namespace, s.access,
                s.parent_class, s.base_classes, s.is_definition, s.brief_doc, s.full_doc,
                s.created_at, s.updated_at
         FROM symbols_fts
         JOIN symbols s ON s.rowid = symbols_fts.rowid
         WHERE symbols_fts MATCH ?1
         ORDER BY rank
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![fts_query(pattern), limit], row_to_symbol)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file_metadata::get_or_create_file_id;
    use crate::storage::pool::Pool;
    use crate::storage::symbols::upsert_definition_wins;
    use crate::types::{Access, FileId, Position, SymbolId, SymbolKind};
    use tempfile::tempdir;

    fn sample(id: &str, name: &str, file: FileId) -> Symbol {
        Symbol {
            id: SymbolId::new(id),
            name: name.to_string(),
            qualified_name: format!("ns::{name}"),
            kind: SymbolKind::Function,
            file,
            position: Position::new(1, 1),
            start_line: 1,
            end_line: 1,
            declaration_file: None,
            declaration_start_line: None,
            declaration_end_line: None,
            signature: format!("void {name}()"),
            is_project: true,
            namespace: Some("ns".into()),
            access: Access::Unspecified,
            parent_class: None,
            base_classes: Vec::new(),
            is_definition: true,
            brief_doc: None,
            full_doc: None,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn search_finds_inserted_symbols_by_prefix() {
        let dir = tempdir().unwrap();
        let pool = Pool::open(&dir.path().join("index.db")).unwrap();
        pool.with_writer(|conn| {
            let file = get_or_create_file_id(conn, "/utils.cpp")?;
            upsert_definition_wins(conn, &sample("c:@F@calculate_sum#", "calculate_sum", file), 1)?;
            upsert_definition_wins(conn, &sample("c:@F@print_message#", "print_message", file), 1)?;

            let results = search(conn, "calc", 10)?;
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].name, "calculate_sum");
            Ok(())
        })
        .unwrap();
    }
}
