//! Persistent file-to-file include graph (spec §4.7).
//!
//! Unlike the teacher's in-memory `petgraph`-backed `DependencyGraph`
//! (`storage/graph.rs`, which models symbol-to-symbol relationships and
//! does not survive a restart), this graph must be durable, so edges
//! live in the `dependency_edges` table and transitive closure is a
//! worklist traversal over SQL reverse-lookup queries, tracking a
//! visited set to terminate in the presence of cycles (spec §9).

use rusqlite::params;
use std::collections::{HashSet, VecDeque};

use super::error::StorageResult;

pub struct IncludeEdge {
    pub included_file: String,
    pub is_direct: bool,
    pub include_depth: i64,
}

/// Replaces every edge whose `source_file` is `source` in one statement
/// group (delete then insert), per spec §4.7 "Update".
pub fn update(
    conn: &rusqlite::Connection,
    source: &str,
    includes: &[IncludeEdge],
    now: i64,
) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM dependency_edges WHERE source_file = ?1",
        params![source],
    )?;

    let mut seen = HashSet::new();
    for edge in includes {
        if !seen.insert(edge.included_file.clone()) {
            continue;
        }
        conn.execute(
            "INSERT INTO dependency_edges (source_file, included_file, is_direct, include_depth, detected_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(source_file, included_file) DO UPDATE SET
                is_direct = excluded.is_direct,
                include_depth = excluded.include_depth,
                detected_at = excluded.detected_at",
            params![source, edge.included_file, edge.is_direct as i64, edge.include_depth, now],
        )?;
    }
    Ok(())
}

pub fn delete_by_source(conn: &rusqlite::Connection, source: &str) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM dependency_edges WHERE source_file = ?1",
        params![source],
    )?;
    Ok(())
}

/// Direct reverse lookup: source files that directly include `header`.
pub fn find_dependents(conn: &rusqlite::Connection, header: &str) -> StorageResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT source_file FROM dependency_edges WHERE included_file = ?1",
    )?;
    let rows = stmt.query_map(params![header], |row| row.get::<_, String>(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Transitive closure of `find_dependents`, via worklist traversal with a
/// visited set so cyclic includes terminate (spec §4.7, §9).
pub fn find_transitive_dependents(
    conn: &rusqlite::Connection,
    header: &str,
) -> StorageResult<HashSet<String>> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(header.to_string());

    while let Some(current) = queue.pop_front() {
        for dependent in find_dependents(conn, &current)? {
            if visited.insert(dependent.clone()) {
                queue.push_back(dependent);
            }
        }
    }

    Ok(visited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::pool::Pool;
    use tempfile::tempdir;

    #[test]
    fn transitive_dependents_follows_chains_and_terminates_on_cycles() {
        let dir = tempdir().unwrap();
        let pool = Pool::open(&dir.path().join("index.db")).unwrap();
        pool.with_writer(|conn| {
            update(
                conn,
                "/b.cpp",
                &[IncludeEdge {
                    included_file: "/a.h".into(),
                    is_direct: true,
                    include_depth: 1,
                }],
                1,
            )?;
            update(
                conn,
                "/c.cpp",
                &[IncludeEdge {
                    included_file: "/b.cpp".into(),
                    is_direct: true,
                    include_depth: 1,
                }],
                1,
            )?;
            // introduce a cycle: a.h "includes" c.cpp (contrived but must not loop forever)
            update(
                conn,
                "/a.h",
                &[IncludeEdge {
                    included_file: "/c.cpp".into(),
                    is_direct: true,
                    include_depth: 1,
                }],
                1,
            )?;

            let deps = find_transitive_dependents(conn, "/a.h")?;
            assert!(deps.contains("/b.cpp"));
            assert!(deps.contains("/c.cpp"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn update_deduplicates_repeated_included_files() {
        let dir = tempdir().unwrap();
        let pool = Pool::open(&dir.path().join("index.db")).unwrap();
        pool.with_writer(|conn| {
            update(
                conn,
                "/main.cpp",
                &[
                    IncludeEdge {
                        included_file: "/a.h".into(),
                        is_direct: true,
                        include_depth: 1,
                    },
                    IncludeEdge {
                        included_file: "/a.h".into(),
                        is_direct: true,
                        include_depth: 1,
                    },
                ],
                1,
            )?;
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM dependency_edges WHERE source_file = '/main.cpp'",
                [],
                |row| row.get(0),
            )?;
            assert_eq!(count, 1);
            Ok(())
        })
        .unwrap();
    }
}
