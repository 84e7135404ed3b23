//! Schema version table and forward-only migrations (spec §4.2).
//!
//! Grounded in the teacher's corpus-sibling `n01e0-dimpact`'s `cache.rs`,
//! which keeps a `PRAGMA user_version`-backed schema number and applies
//! numbered migrations in order on open.

use rusqlite::Connection;

use super::error::{StorageError, StorageResult};

/// Bump when a migration is added; `migrate` applies every migration
/// between the stored version (exclusive) and this one (inclusive).
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

pub fn migrate(conn: &Connection) -> StorageResult<()> {
    let stored: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if stored > CURRENT_SCHEMA_VERSION {
        return Err(StorageError::Migration {
            version: stored,
            message: format!(
                "on-disk schema version {stored} is newer than supported version {CURRENT_SCHEMA_VERSION}"
            ),
        });
    }

    for version in (stored + 1)..=CURRENT_SCHEMA_VERSION {
        apply_migration(conn, version)?;
        conn.pragma_update(None, "user_version", version)?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: i64) -> StorageResult<()> {
    match version {
        1 => migration_001_initial_schema(conn),
        other => Err(StorageError::Migration {
            version: other,
            message: "no such migration".to_string(),
        }),
    }
}

fn migration_001_initial_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id   INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS file_metadata (
            path            TEXT PRIMARY KEY,
            file_id         INTEGER NOT NULL REFERENCES files(id),
            content_hash    TEXT NOT NULL,
            args_hash       TEXT,
            indexed_at      INTEGER NOT NULL,
            symbol_count    INTEGER NOT NULL DEFAULT 0,
            success         INTEGER NOT NULL DEFAULT 1,
            error_message   TEXT,
            retry_count     INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS symbols (
            id                       TEXT PRIMARY KEY,
            name                     TEXT NOT NULL,
            qualified_name           TEXT NOT NULL,
            kind                     TEXT NOT NULL,
            file_id                  INTEGER NOT NULL REFERENCES files(id),
            line                     INTEGER NOT NULL,
            column                   INTEGER NOT NULL,
            start_line               INTEGER NOT NULL,
            end_line                 INTEGER NOT NULL,
            declaration_file_id      INTEGER REFERENCES files(id),
            declaration_start_line   INTEGER,
            declaration_end_line     INTEGER,
            signature                TEXT NOT NULL DEFAULT '',
            is_project               INTEGER NOT NULL DEFAULT 1,
            namespace                TEXT,
            access                   TEXT NOT NULL DEFAULT 'unspecified',
            parent_class             TEXT,
            base_classes             TEXT NOT NULL DEFAULT '[]',
            is_definition            INTEGER NOT NULL DEFAULT 0,
            brief_doc                TEXT,
            full_doc                 TEXT,
            created_at               INTEGER NOT NULL,
            updated_at               INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_symbols_file_id ON symbols(file_id);
        CREATE INDEX IF NOT EXISTS idx_symbols_parent_class ON symbols(parent_class);
        CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);

        CREATE TABLE IF NOT EXISTS call_sites (
            caller_id  TEXT NOT NULL,
            callee_id  TEXT NOT NULL,
            file_id    INTEGER NOT NULL REFERENCES files(id),
            line       INTEGER NOT NULL,
            column     INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_call_sites_caller ON call_sites(caller_id);
        CREATE INDEX IF NOT EXISTS idx_call_sites_callee ON call_sites(callee_id);
        CREATE INDEX IF NOT EXISTS idx_call_sites_file ON call_sites(file_id);

        CREATE TABLE IF NOT EXISTS header_tracker (
            path                  TEXT PRIMARY KEY,
            processed_by          TEXT NOT NULL,
            file_hash             TEXT NOT NULL,
            compile_commands_hash TEXT,
            processed_at          INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_header_tracker_owner ON header_tracker(processed_by);

        CREATE TABLE IF NOT EXISTS dependency_edges (
            source_file    TEXT NOT NULL,
            included_file  TEXT NOT NULL,
            is_direct      INTEGER NOT NULL,
            include_depth  INTEGER NOT NULL,
            detected_at    INTEGER NOT NULL,
            UNIQUE(source_file, included_file)
        );
        CREATE INDEX IF NOT EXISTS idx_dependency_edges_source ON dependency_edges(source_file);
        CREATE INDEX IF NOT EXISTS idx_dependency_edges_included ON dependency_edges(included_file);

        CREATE TABLE IF NOT EXISTS parse_errors (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            file         TEXT NOT NULL,
            error_kind   TEXT NOT NULL,
            message      TEXT NOT NULL,
            stacktrace   TEXT,
            file_hash    TEXT,
            args_hash    TEXT,
            retry_count  INTEGER NOT NULL DEFAULT 0,
            timestamp    INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_parse_errors_file ON parse_errors(file);

        CREATE TABLE IF NOT EXISTS cache_metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS symbols_fts USING fts5(
            name,
            qualified_name,
            content='symbols',
            content_rowid='rowid'
        );

        CREATE TRIGGER IF NOT EXISTS symbols_fts_ai AFTER INSERT ON symbols BEGIN
            INSERT INTO symbols_fts(rowid, name, qualified_name)
            VALUES (new.rowid, new.name, new.qualified_name);
        END;

        CREATE TRIGGER IF NOT EXISTS symbols_fts_ad AFTER DELETE ON symbols BEGIN
            INSERT INTO symbols_fts(symbols_fts, rowid, name, qualified_name)
            VALUES ('delete', old.rowid, old.name, old.qualified_name);
        END;

        CREATE TRIGGER IF NOT EXISTS symbols_fts_au AFTER UPDATE ON symbols BEGIN
            INSERT INTO symbols_fts(symbols_fts, rowid, name, qualified_name)
            VALUES ('delete', old.rowid, old.name, old.qualified_name);
            INSERT INTO symbols_fts(rowid, name, qualified_name)
            VALUES (new.rowid, new.name, new.qualified_name);
        END;
        "#,
    )?;
    Ok(())
}
