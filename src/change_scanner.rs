//! Change Scanner (C8, spec §4.8): compares the current on-disk state to
//! the stored metadata and produces a changeset, without ever rebuilding
//! or clearing that metadata first — the changeset is always a diff
//! against whatever `file_metadata`/`header_tracker` rows already exist
//! (spec §9 Open Question, resolved in `SPEC_FULL.md` §9: a cache-resume
//! on process restart must never misreport an unchanged tree as
//! "all files added").

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::compile_commands::CompileCommands;
use crate::config::IndexingConfig;
use crate::scanner::{hash_file, FileScanner};
use crate::storage::pool::Pool;
use crate::storage::{file_metadata, header_tracker, metadata};

#[derive(Debug, Clone, Default)]
pub struct Changeset {
    pub compile_commands_changed: bool,
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub modified_headers: Vec<String>,
    pub removed: Vec<PathBuf>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        !self.compile_commands_changed
            && self.added.is_empty()
            && self.modified.is_empty()
            && self.modified_headers.is_empty()
            && self.removed.is_empty()
    }
}

/// Computes the changeset described by spec §4.8, reading storage state
/// through a pooled reader connection (never the write connection) and a
/// fresh `FileScanner` pass over `source_root`.
pub fn scan(
    pool: &Pool,
    source_root: &Path,
    indexing: &IndexingConfig,
    compile_commands_path: &Path,
) -> crate::error::IndexResult<Changeset> {
    let scanned = FileScanner::new(source_root, indexing).scan()?;
    let scanned_hashes: std::collections::HashMap<PathBuf, String> = scanned
        .iter()
        .map(|f| (f.path.clone(), f.content_hash.clone()))
        .collect();

    let reader = pool.reader()?;

    let compile_commands_changed = {
        let current_hash = CompileCommands::file_hash(compile_commands_path);
        let stored_hash = metadata::get(&reader, metadata::KEY_LAST_COMPILE_COMMANDS_HASH)?;
        current_hash != stored_hash
    };

    let existing = file_metadata::all(&reader)?;
    let existing_paths: HashSet<PathBuf> =
        existing.iter().map(|m| PathBuf::from(&m.path)).collect();

    let mut added = Vec::new();
    let mut modified = Vec::new();
    for (path, hash) in &scanned_hashes {
        match existing.iter().find(|m| Path::new(&m.path) == path.as_path()) {
            None => added.push(path.clone()),
            Some(meta) if &meta.content_hash != hash => modified.push(path.clone()),
            Some(_) => {}
        }
    }

    let removed: Vec<PathBuf> = existing_paths
        .into_iter()
        .filter(|p| !scanned_hashes.contains_key(p))
        .collect();

    let mut modified_headers = Vec::new();
    for entry in header_tracker::all_headers(&reader)? {
        let header_path = Path::new(&entry.path);
        let current_hash = hash_file(header_path).ok();
        if current_hash.as_deref() != Some(entry.file_hash.as_str()) {
            modified_headers.push(entry.path);
        }
    }

    Ok(Changeset {
        compile_commands_changed,
        added,
        modified,
        modified_headers,
        removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pool_at(dir: &Path) -> Pool {
        Pool::open(&dir.join("index.db")).unwrap()
    }

    #[test]
    fn unchanged_tree_yields_an_empty_changeset() {
        let project = tempdir().unwrap();
        let cache = tempdir().unwrap();
        std::fs::write(project.path().join("a.cpp"), "int x;").unwrap();

        let pool = pool_at(cache.path());
        let indexing = IndexingConfig::default();
        let compile_commands = project.path().join("compile_commands.json");

        let hash = hash_file(&project.path().join("a.cpp")).unwrap();
        pool.with_writer(|conn| {
            let id = file_metadata::get_or_create_file_id(
                conn,
                project.path().join("a.cpp").to_str().unwrap(),
            )?;
            file_metadata::upsert(
                conn,
                project.path().join("a.cpp").to_str().unwrap(),
                id,
                &hash,
                None,
                1,
                0,
                true,
                None,
                0,
            )
        })
        .unwrap();

        let changeset = scan(&pool, project.path(), &indexing, &compile_commands).unwrap();
        assert!(changeset.is_empty());
    }

    #[test]
    fn new_file_on_disk_is_reported_as_added() {
        let project = tempdir().unwrap();
        let cache = tempdir().unwrap();
        std::fs::write(project.path().join("a.cpp"), "int x;").unwrap();

        let pool = pool_at(cache.path());
        let indexing = IndexingConfig::default();
        let compile_commands = project.path().join("compile_commands.json");

        let changeset = scan(&pool, project.path(), &indexing, &compile_commands).unwrap();
        assert_eq!(changeset.added.len(), 1);
        assert!(changeset.modified.is_empty());
    }

    #[test]
    fn removed_file_is_reported() {
        let project = tempdir().unwrap();
        let cache = tempdir().unwrap();
        let stale_path = project.path().join("gone.cpp");

        let pool = pool_at(cache.path());
        let indexing = IndexingConfig::default();
        let compile_commands = project.path().join("compile_commands.json");

        pool.with_writer(|conn| {
            let id = file_metadata::get_or_create_file_id(conn, stale_path.to_str().unwrap())?;
            file_metadata::upsert(conn, stale_path.to_str().unwrap(), id, "deadbeef", None, 1, 0, true, None, 0)
        })
        .unwrap();

        let changeset = scan(&pool, project.path(), &indexing, &compile_commands).unwrap();
        assert_eq!(changeset.removed, vec![stale_path]);
    }
}
