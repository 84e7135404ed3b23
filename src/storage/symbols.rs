//! Symbol table CRUD enforcing the definition-wins invariant (spec §3).

use rusqlite::{params, Connection, OptionalExtension};

use super::error::StorageResult;
use crate::symbol::Symbol;
use crate::types::{Access, FileId, Position, SymbolId, SymbolKind};

/// Deletes every symbol record whose `file_id` is `file`. Part of the
/// atomic per-file replacement transaction (spec §4.2).
pub fn delete_by_file(conn: &Connection, file: FileId) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM symbols WHERE file_id = ?1",
        params![file.value()],
    )?;
    Ok(())
}

/// Inserts `symbol`, applying the definition-wins merge if a record with
/// the same id already exists (possibly emitted by a *different* file,
/// e.g. a declaration in a header and a definition in a source file).
///
/// `created_at` is carried over from any existing record with the same id
/// rather than reset to `now`, so reindexing an unchanged project is
/// bit-equal modulo `updated_at` (spec §8 invariant 5).
pub fn upsert_definition_wins(conn: &Connection, symbol: &Symbol, now: i64) -> StorageResult<()> {
    let existing = get(conn, &symbol.id)?;
    let should_write = match &existing {
        Some(current) => symbol.wins_over(current),
        None => true,
    };
    if !should_write {
        return Ok(());
    }
    let mut to_write = symbol.clone();
    to_write.created_at = existing.map(|e| e.created_at).unwrap_or(now);
    to_write.updated_at = now;
    insert_or_replace(conn, &to_write)
}

fn insert_or_replace(conn: &Connection, symbol: &Symbol) -> StorageResult<()> {
    let base_classes_json = serde_json::to_string(&symbol.base_classes)
        .unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "INSERT INTO symbols
            (id, name, qualified_name, kind, file_id, line, column, start_line, end_line,
             declaration_file_id, declaration_start_line, declaration_end_line, signature,
             is_project, namespace, access, parent_class, base_classes, is_definition,
             brief_doc, full_doc, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            qualified_name = excluded.qualified_name,
            kind = excluded.kind,
            file_id = excluded.file_id,
            line = excluded.line,
            column = excluded.column,
            start_line = excluded.start_line,
            end_line = excluded.end_line,
            declaration_file_id = excluded.declaration_file_id,
            declaration_start_line = excluded.declaration_start_line,
            declaration_end_line = excluded.declaration_end_line,
            signature = excluded.signature,
            is_project = excluded.is_project,
            namespace = excluded.namespace,
            access = excluded.access,
            parent_class = excluded.parent_class,
            base_classes = excluded.base_classes,
            is_definition = excluded.is_definition,
            brief_doc = excluded.brief_doc,
            full_doc = excluded.full_doc,
            updated_at = excluded.updated_at",
        params![
            symbol.id.as_str(),
            symbol.name,
            symbol.qualified_name,
            symbol.kind.as_str(),
            symbol.file.value(),
            symbol.position.line,
            symbol.position.column,
            symbol.start_line,
            symbol.end_line,
            symbol.declaration_file.map(FileId::value),
            symbol.declaration_start_line,
            symbol.declaration_end_line,
            symbol.signature,
            symbol.is_project as i64,
            symbol.namespace,
            symbol.access.as_str(),
            symbol.parent_class,
            base_classes_json,
            symbol.is_definition as i64,
            symbol.brief_doc,
            symbol.full_doc,
            symbol.created_at,
            symbol.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &SymbolId) -> StorageResult<Option<Symbol>> {
    conn.query_row(
        "SELECT id, name, qualified_name, kind, file_id, line, column, start_line, end_line,
                declaration_file_id, declaration_start_line, declaration_end_line, signature,
                is_project, namespace, access, parent_class, base_classes, is_definition,
                brief_doc, full_doc, created_at, updated_at
         FROM symbols WHERE id = ?1",
        params![id.as_str()],
        row_to_symbol,
    )
    .optional()
    .map_err(Into::into)
}

/// Every symbol in the index, for the regex path of `search_symbols` and
/// other full-scan query operations (spec §4.10). The symbol table is
/// expected to fit comfortably in memory for the codebases this crate
/// targets; callers needing scale should prefer `fts::search`.
pub fn all(conn: &Connection) -> StorageResult<Vec<Symbol>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, qualified_name, kind, file_id, line, column, start_line, end_line,
                declaration_file_id, declaration_start_line, declaration_end_line, signature,
                is_project, namespace, access, parent_class, base_classes, is_definition,
                brief_doc, full_doc, created_at, updated_at
         FROM symbols",
    )?;
    let rows = stmt.query_map([], row_to_symbol)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Symbols declared under `file` (spec §4.10 `find_in_file`).
pub fn by_file(conn: &Connection, file: FileId) -> StorageResult<Vec<Symbol>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, qualified_name, kind, file_id, line, column, start_line, end_line,
                declaration_file_id, declaration_start_line, declaration_end_line, signature,
                is_project, namespace, access, parent_class, base_classes, is_definition,
                brief_doc, full_doc, created_at, updated_at
         FROM symbols WHERE file_id = ?1",
    )?;
    let rows = stmt.query_map(params![file.value()], row_to_symbol)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Members (methods, fields, nested declarations) of class/struct
/// `parent`, by exact name match against `symbols.parent_class` (spec
/// §4.10 `class_info`).
pub fn by_parent_class(conn: &Connection, parent: &str) -> StorageResult<Vec<Symbol>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, qualified_name, kind, file_id, line, column, start_line, end_line,
                declaration_file_id, declaration_start_line, declaration_end_line, signature,
                is_project, namespace, access, parent_class, base_classes, is_definition,
                brief_doc, full_doc, created_at, updated_at
         FROM symbols WHERE parent_class = ?1",
    )?;
    let rows = stmt.query_map(params![parent], row_to_symbol)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Exact matches on `name` or `qualified_name` (spec §4.10's lookups that
/// take a plain identifier rather than a search pattern: `class_info`,
/// `function_signatures`, `find_callers`/`find_callees`'s name resolution).
pub fn by_name(conn: &Connection, name: &str) -> StorageResult<Vec<Symbol>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, qualified_name, kind, file_id, line, column, start_line, end_line,
                declaration_file_id, declaration_start_line, declaration_end_line, signature,
                is_project, namespace, access, parent_class, base_classes, is_definition,
                brief_doc, full_doc, created_at, updated_at
         FROM symbols WHERE name = ?1 OR qualified_name = ?1",
    )?;
    let rows = stmt.query_map(params![name], row_to_symbol)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Classes/structs whose recorded `base_classes` contains `name` (spec
/// §4.10 `class_hierarchy`'s derived lookup). The column is a JSON array,
/// so the SQL `LIKE` is a cheap pre-filter and membership is confirmed by
/// decoding each candidate row's JSON before it's returned — a
/// substring match on `"name"` can't tell `Base` from `BaseExtended`
/// without it. Base-specifiers that name a template parameter rather
/// than a concrete type are never recorded here in the first place (see
/// `parsing::cursor::base_classes`), which is what keeps a
/// `template<typename Base> class Adapter : public Base` from showing up
/// as a derivative of an unrelated `struct Base`.
pub fn by_base_class(conn: &Connection, name: &str) -> StorageResult<Vec<Symbol>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, qualified_name, kind, file_id, line, column, start_line, end_line,
                declaration_file_id, declaration_start_line, declaration_end_line, signature,
                is_project, namespace, access, parent_class, base_classes, is_definition,
                brief_doc, full_doc, created_at, updated_at
         FROM symbols WHERE base_classes LIKE ?1",
    )?;
    let like_pattern = format!("%\"{name}\"%");
    let rows = stmt.query_map(params![like_pattern], row_to_symbol)?;
    rows.collect::<Result<Vec<_>, _>>()
        .map(|symbols: Vec<Symbol>| {
            symbols
                .into_iter()
                .filter(|s| s.base_classes.iter().any(|b| b == name))
                .collect()
        })
        .map_err(Into::into)
}

pub fn row_to_symbol(row: &rusqlite::Row<'_>) -> rusqlite::Result<Symbol> {
    let base_classes_json: String = row.get(17)?;
    let base_classes: Vec<String> = serde_json::from_str(&base_classes_json).unwrap_or_default();
    let kind_str: String = row.get(3)?;
    let access_str: String = row.get(15)?;
    Ok(Symbol {
        id: SymbolId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        qualified_name: row.get(2)?,
        kind: SymbolKind::from_str(&kind_str).unwrap_or(SymbolKind::Function),
        file: FileId(row.get(4)?),
        position: Position::new(row.get(5)?, row.get(6)?),
        start_line: row.get(7)?,
        end_line: row.get(8)?,
        declaration_file: row.get::<_, Option<i64>>(9)?.map(FileId),
        declaration_start_line: row.get(10)?,
        declaration_end_line: row.get(11)?,
        signature: row.get(12)?,
        is_project: row.get::<_, i64>(13)? != 0,
        namespace: row.get(14)?,
        access: Access::from_str(&access_str),
        parent_class: row.get(16)?,
        base_classes,
        is_definition: row.get::<_, i64>(18)? != 0,
        brief_doc: row.get(19)?,
        full_doc: row.get(20)?,
        created_at: row.get(21)?,
        updated_at: row.get(22)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::pool::Pool;
    use crate::storage::file_metadata::get_or_create_file_id;
    use tempfile::tempdir;

    fn sample(id: &str, file: FileId, is_definition: bool) -> Symbol {
        Symbol {
            id: SymbolId::new(id),
            name: "foo".into(),
            qualified_name: "ns::foo".into(),
            kind: SymbolKind::Function,
            file,
            position: Position::new(1, 1),
            start_line: 1,
            end_line: 1,
            declaration_file: None,
            declaration_start_line: None,
            declaration_end_line: None,
            signature: "void foo()".into(),
            is_project: true,
            namespace: Some("ns".into()),
            access: Access::Unspecified,
            parent_class: None,
            base_classes: Vec::new(),
            is_definition,
            brief_doc: None,
            full_doc: None,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn definition_overwrites_prior_declaration() {
        let dir = tempdir().unwrap();
        let pool = Pool::open(&dir.path().join("index.db")).unwrap();
        pool.with_writer(|conn| {
            let header = get_or_create_file_id(conn, "/a.h")?;
            let source = get_or_create_file_id(conn, "/a.cpp")?;
            upsert_definition_wins(conn, &sample("c:@F@foo#", header, false), 1)?;
            upsert_definition_wins(conn, &sample("c:@F@foo#", source, true), 2)?;
            let stored = get(conn, &SymbolId::new("c:@F@foo#"))?.unwrap();
            assert!(stored.is_definition);
            assert_eq!(stored.file, source);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn declaration_does_not_overwrite_existing_definition() {
        let dir = tempdir().unwrap();
        let pool = Pool::open(&dir.path().join("index.db")).unwrap();
        pool.with_writer(|conn| {
            let header = get_or_create_file_id(conn, "/a.h")?;
            let source = get_or_create_file_id(conn, "/a.cpp")?;
            upsert_definition_wins(conn, &sample("c:@F@foo#", source, true), 1)?;
            upsert_definition_wins(conn, &sample("c:@F@foo#", header, false), 2)?;
            let stored = get(conn, &SymbolId::new("c:@F@foo#"))?.unwrap();
            assert!(stored.is_definition);
            assert_eq!(stored.file, source);
            Ok(())
        })
        .unwrap();
    }
}
