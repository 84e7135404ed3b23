//! Query Layer (C10, spec §4.10): read-only operations over the store,
//! gated by the lifecycle so a caller never observes a result from a
//! cache that hasn't finished its first index. Every operation here must
//! keep working while a refresh is in flight (spec §5): it only ever
//! touches pooled read connections, never the write lock.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;

use crate::error::IndexResult;
use crate::identity::ProjectIdentity;
use crate::lifecycle::Lifecycle;
use crate::storage::{call_sites, file_metadata, fts, metadata, symbols, Store};
use crate::symbol::Symbol;
use crate::types::{SymbolId, SymbolKind};

const DEFAULT_SEARCH_LIMIT: i64 = 200;
/// Characters that mark a pattern as "clearly a regex" rather than a bare
/// identifier fragment, per spec §4.10 "regex if anchored, otherwise
/// full-text": anchors, alternation, character classes, and quantifiers
/// all signal intent a plain-substring FTS match can't honor.
const REGEX_HINT_CHARS: &[char] = &['^', '$', '|', '[', '(', '*', '+', '?', '\\'];

fn looks_like_regex(pattern: &str) -> bool {
    pattern.chars().any(|c| REGEX_HINT_CHARS.contains(&c))
}

fn compile_pattern(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|_| {
        Regex::new(&regex::escape(pattern)).expect("escaped pattern is always valid regex")
    })
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub class: Symbol,
    pub methods: Vec<Symbol>,
    pub fields: Vec<Symbol>,
}

#[derive(Debug, Clone)]
pub struct ClassHierarchy {
    pub bases: Vec<String>,
    pub derived: Vec<Symbol>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ServerStatus {
    pub state: String,
    pub indexed_file_count: i64,
    pub symbol_count: i64,
    pub cache_dir: String,
    pub last_refresh: Option<i64>,
}

/// Holds what every query operation needs to turn a caller's request into
/// rows: the store for pooled reads, the lifecycle to gate on, and enough
/// identity/config to report `server_status` without a round trip.
pub struct QueryLayer {
    store: Arc<Store>,
    lifecycle: Arc<Lifecycle>,
    identity: ProjectIdentity,
    cache_root: PathBuf,
}

impl QueryLayer {
    pub fn new(
        store: Arc<Store>,
        lifecycle: Arc<Lifecycle>,
        identity: ProjectIdentity,
        cache_root: PathBuf,
    ) -> Self {
        Self {
            store,
            lifecycle,
            identity,
            cache_root,
        }
    }

    fn resolve_file(&self, file: &str) -> IndexResult<Option<crate::types::FileId>> {
        let reader = self.store.pool().reader()?;
        Ok(file_metadata::lookup_file_id(&reader, file)?)
    }

    /// Resolves an internal `FileId` back to the path it was assigned at
    /// scan time. `FileId` only exists to make joins cheap (`types::FileId`
    /// doc comment) and must never leak past this point: every external
    /// surface (MCP responses, CLI output) resolves through here instead of
    /// serializing the id directly.
    pub fn resolve_path(&self, file: crate::types::FileId) -> IndexResult<Option<String>> {
        let reader = self.store.pool().reader()?;
        Ok(file_metadata::path_for_id(&reader, file)?)
    }

    /// `pattern` is treated as a regex when it contains characters a bare
    /// identifier fragment never would; otherwise it's routed through
    /// FTS5's prefix match.
    pub fn search_symbols(
        &self,
        pattern: &str,
        kinds: Option<&[SymbolKind]>,
        project_only: bool,
        file: Option<&str>,
    ) -> IndexResult<Vec<Symbol>> {
        self.lifecycle.require_ready_for_query()?;
        let reader = self.store.pool().reader()?;

        let mut matches = if looks_like_regex(pattern) {
            let re = compile_pattern(pattern);
            symbols::all(&reader)?
                .into_iter()
                .filter(|s| re.is_match(&s.name) || re.is_match(&s.qualified_name))
                .collect::<Vec<_>>()
        } else {
            fts::search(&reader, pattern, DEFAULT_SEARCH_LIMIT)?
        };

        if let Some(kinds) = kinds {
            matches.retain(|s| kinds.contains(&s.kind));
        }
        if project_only {
            matches.retain(|s| s.is_project);
        }
        if let Some(file) = file {
            let file_id = file_metadata::lookup_file_id(&reader, file)?;
            match file_id {
                Some(id) => matches.retain(|s| s.file == id),
                None => matches.clear(),
            }
        }
        Ok(matches)
    }

    /// `{methods, fields, bases, file, line-ranges, brief, doc}` for the
    /// class/struct named or qualified-named `name` (spec §4.10). Prefers
    /// a definition over a bare forward declaration when both exist.
    pub fn class_info(&self, name: &str) -> IndexResult<Option<ClassInfo>> {
        self.lifecycle.require_ready_for_query()?;
        let reader = self.store.pool().reader()?;

        let candidates: Vec<Symbol> = symbols::by_name(&reader, name)?
            .into_iter()
            .filter(|s| matches!(s.kind, SymbolKind::Class | SymbolKind::Struct))
            .collect();
        let class = match pick_best_definition(candidates) {
            Some(c) => c,
            None => return Ok(None),
        };

        let members = symbols::by_parent_class(&reader, &class.name)?;
        let (methods, fields) = members.into_iter().partition(|s: &Symbol| {
            matches!(s.kind, SymbolKind::Method | SymbolKind::Function)
        });

        Ok(Some(ClassInfo {
            class,
            methods,
            fields,
        }))
    }

    /// `[signature, file, line]` for every function/method named `name`,
    /// optionally narrowed to members of `class` (spec §4.10).
    pub fn function_signatures(&self, name: &str, class: Option<&str>) -> IndexResult<Vec<Symbol>> {
        self.lifecycle.require_ready_for_query()?;
        let reader = self.store.pool().reader()?;

        let mut matches: Vec<Symbol> = symbols::by_name(&reader, name)?
            .into_iter()
            .filter(|s| matches!(s.kind, SymbolKind::Function | SymbolKind::Method))
            .collect();
        if let Some(class) = class {
            matches.retain(|s| s.parent_class.as_deref() == Some(class));
        }
        Ok(matches)
    }

    /// `{bases, derived[]}`: `bases` from `name`'s own recorded
    /// `base_classes`; `derived` from every class/struct whose
    /// `base_classes` names `name` (template-parameter false positives are
    /// filtered upstream in `parsing::cursor::base_classes` and again by
    /// `storage::symbols::by_base_class`'s exact-element check).
    pub fn class_hierarchy(&self, name: &str) -> IndexResult<ClassHierarchy> {
        self.lifecycle.require_ready_for_query()?;
        let reader = self.store.pool().reader()?;

        let class_candidates: Vec<Symbol> = symbols::by_name(&reader, name)?
            .into_iter()
            .filter(|s| matches!(s.kind, SymbolKind::Class | SymbolKind::Struct))
            .collect();
        let bases = pick_best_definition(class_candidates)
            .map(|s| s.base_classes)
            .unwrap_or_default();

        let derived = symbols::by_base_class(&reader, name)?
            .into_iter()
            .filter(|s| matches!(s.kind, SymbolKind::Class | SymbolKind::Struct))
            .collect();

        Ok(ClassHierarchy { bases, derived })
    }

    /// Every symbol with a call site naming `function` as `callee_id`
    /// (spec §4.10 `find_callers`). A name may resolve to more than one
    /// USR (overloads, or same name in different namespaces); callers of
    /// every match are combined.
    pub fn find_callers(&self, function: &str) -> IndexResult<Vec<Symbol>> {
        self.lifecycle.require_ready_for_query()?;
        let reader = self.store.pool().reader()?;
        let callees = resolve_function_ids(&reader, function)?;

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for callee in &callees {
            for caller_id in call_sites::callers_of(&reader, callee)? {
                if seen.insert(caller_id.clone()) {
                    if let Some(symbol) = symbols::get(&reader, &caller_id)? {
                        out.push(symbol);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Every symbol `function` calls (spec §4.10 `find_callees`).
    pub fn find_callees(&self, function: &str) -> IndexResult<Vec<Symbol>> {
        self.lifecycle.require_ready_for_query()?;
        let reader = self.store.pool().reader()?;
        let callers = resolve_function_ids(&reader, function)?;

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for caller in &callers {
            for callee_id in call_sites::callees_of(&reader, caller)? {
                if seen.insert(callee_id.clone()) {
                    if let Some(symbol) = symbols::get(&reader, &callee_id)? {
                        out.push(symbol);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Bounded BFS on the call-site forward-edge set from `from` to `to`
    /// (spec §4.10 `call_path`), stopping at `max_depth` hops. Returns the
    /// shortest path found as the sole element of the outer vec, or an
    /// empty vec when no path within `max_depth` exists.
    pub fn call_path(&self, from: &str, to: &str, max_depth: usize) -> IndexResult<Vec<Vec<Symbol>>> {
        self.lifecycle.require_ready_for_query()?;
        let reader = self.store.pool().reader()?;

        let starts = resolve_function_ids(&reader, from)?;
        let targets: std::collections::HashSet<SymbolId> =
            resolve_function_ids(&reader, to)?.into_iter().collect();
        if starts.is_empty() || targets.is_empty() {
            return Ok(Vec::new());
        }

        let mut visited: std::collections::HashSet<SymbolId> = std::collections::HashSet::new();
        let mut predecessor: HashMap<SymbolId, SymbolId> = HashMap::new();
        let mut queue: VecDeque<(SymbolId, usize)> = VecDeque::new();
        for start in &starts {
            if visited.insert(start.clone()) {
                queue.push_back((start.clone(), 0));
            }
        }

        let mut found: Option<SymbolId> = None;
        'bfs: while let Some((current, depth)) = queue.pop_front() {
            if targets.contains(&current) {
                found = Some(current);
                break 'bfs;
            }
            if depth >= max_depth {
                continue;
            }
            for next in call_sites::callees_of(&reader, &current)? {
                if visited.insert(next.clone()) {
                    predecessor.insert(next.clone(), current.clone());
                    queue.push_back((next, depth + 1));
                }
            }
        }

        let Some(end) = found else {
            return Ok(Vec::new());
        };

        let mut chain = vec![end.clone()];
        let mut cursor = end;
        while let Some(prev) = predecessor.get(&cursor) {
            chain.push(prev.clone());
            cursor = prev.clone();
        }
        chain.reverse();

        let mut path = Vec::with_capacity(chain.len());
        for id in chain {
            if let Some(symbol) = symbols::get(&reader, &id)? {
                path.push(symbol);
            }
        }
        Ok(vec![path])
    }

    /// Symbols declared in `file` whose name matches `pattern` (spec
    /// §4.10 `find_in_file`), using the same regex-or-literal heuristic as
    /// `search_symbols` but scanning only that file's rows.
    pub fn find_in_file(&self, file: &str, pattern: &str) -> IndexResult<Vec<Symbol>> {
        self.lifecycle.require_ready_for_query()?;
        let reader = self.store.pool().reader()?;

        let file_id = match file_metadata::lookup_file_id(&reader, file)? {
            Some(id) => id,
            None => return Ok(Vec::new()),
        };
        let candidates = symbols::by_file(&reader, file_id)?;
        if pattern.is_empty() {
            return Ok(candidates);
        }

        let matches = if looks_like_regex(pattern) {
            let re = compile_pattern(pattern);
            candidates
                .into_iter()
                .filter(|s| re.is_match(&s.name) || re.is_match(&s.qualified_name))
                .collect()
        } else {
            let needle = pattern.to_lowercase();
            candidates
                .into_iter()
                .filter(|s| s.name.to_lowercase().contains(&needle))
                .collect()
        };
        Ok(matches)
    }

    /// `{state, indexed_file_count, symbol_count, cache_dir, last_refresh}`
    /// (spec §4.10 `server_status`). Unlike every other operation here,
    /// this one is never gated on lifecycle readiness — it's the one
    /// query a client can always make, specifically to learn whether the
    /// others would currently succeed.
    pub fn server_status(&self) -> IndexResult<ServerStatus> {
        let reader = self.store.pool().reader()?;
        let last_refresh = metadata::get(&reader, metadata::KEY_LAST_REFRESH_AT)?
            .and_then(|v| v.parse::<i64>().ok());
        drop(reader);

        Ok(ServerStatus {
            state: format!("{:?}", self.lifecycle.current()),
            indexed_file_count: self.store.indexed_file_count()?,
            symbol_count: self.store.symbol_count()?,
            cache_dir: self
                .identity
                .cache_dir(&self.cache_root)
                .display()
                .to_string(),
            last_refresh,
        })
    }
}

/// Resolves a caller-supplied function name to every USR it could refer
/// to — there may be more than one overload or same-named function in
/// different namespaces, and a caller asking "who calls `foo`" wants all
/// of them, not an arbitrary first match.
fn resolve_function_ids(
    reader: &rusqlite::Connection,
    name: &str,
) -> IndexResult<Vec<SymbolId>> {
    Ok(symbols::by_name(reader, name)?
        .into_iter()
        .filter(|s| matches!(s.kind, SymbolKind::Function | SymbolKind::Method))
        .map(|s| s.id)
        .collect())
}

/// Among several same-named candidates, prefers one that's a definition;
/// falls back to the first declaration if none is defined.
fn pick_best_definition(candidates: Vec<Symbol>) -> Option<Symbol> {
    let mut iter = candidates.into_iter();
    let first = iter.next()?;
    if first.is_definition {
        return Some(first);
    }
    let mut best = first;
    for candidate in iter {
        if candidate.is_definition {
            return Some(candidate);
        }
        best = candidate;
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file_metadata::get_or_create_file_id;
    use crate::storage::symbols::upsert_definition_wins;
    use crate::types::{Access, FileId, Position};
    use tempfile::tempdir;

    fn sample(id: &str, name: &str, kind: SymbolKind, file: FileId) -> Symbol {
        Symbol {
            id: SymbolId::new(id),
            name: name.to_string(),
            qualified_name: format!("ns::{name}"),
            kind,
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

    fn ready_layer(cache: &std::path::Path, project: &std::path::Path) -> QueryLayer {
        let identity = ProjectIdentity::resolve(project, None).unwrap();
        let db_path = identity.cache_dir(cache).join("index.db");
        let store = Arc::new(Store::open(&db_path).unwrap());
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.transition(crate::lifecycle::State::Initializing).unwrap();
        lifecycle.transition(crate::lifecycle::State::Indexed).unwrap();
        QueryLayer::new(store, lifecycle, identity, cache.to_path_buf())
    }

    #[test]
    fn queries_fail_fast_before_the_index_is_ready() {
        let project = tempdir().unwrap();
        let cache = tempdir().unwrap();
        let identity = ProjectIdentity::resolve(project.path(), None).unwrap();
        let db_path = identity.cache_dir(cache.path()).join("index.db");
        let store = Arc::new(Store::open(&db_path).unwrap());
        let lifecycle = Arc::new(Lifecycle::new());
        let layer = QueryLayer::new(store, lifecycle, identity, cache.path().to_path_buf());

        assert!(layer.search_symbols("foo", None, false, None).is_err());
        assert!(layer.server_status().is_ok());
    }

    #[test]
    fn find_callers_and_callees_round_trip() {
        let project = tempdir().unwrap();
        let cache = tempdir().unwrap();
        let layer = ready_layer(cache.path(), project.path());

        layer
            .store
            .pool()
            .with_writer(|conn| {
                let file = get_or_create_file_id(conn, "/a.cpp")?;
                upsert_definition_wins(conn, &sample("c:@F@main#", "main", SymbolKind::Function, file), 1)?;
                upsert_definition_wins(conn, &sample("c:@F@helper#", "helper", SymbolKind::Function, file), 1)?;
                call_sites::insert(
                    conn,
                    &crate::symbol::CallSite {
                        caller_id: SymbolId::new("c:@F@main#"),
                        callee_id: SymbolId::new("c:@F@helper#"),
                        file,
                        line: 5,
                        column: None,
                    },
                )
            })
            .unwrap();

        let callers = layer.find_callers("helper").unwrap();
        assert_eq!(callers.len(), 1);
        assert_eq!(callers[0].name, "main");

        let callees = layer.find_callees("main").unwrap();
        assert_eq!(callees.len(), 1);
        assert_eq!(callees[0].name, "helper");
    }

    #[test]
    fn class_hierarchy_ignores_template_type_parameters() {
        let project = tempdir().unwrap();
        let cache = tempdir().unwrap();
        let layer = ready_layer(cache.path(), project.path());

        layer
            .store
            .pool()
            .with_writer(|conn| {
                let file = get_or_create_file_id(conn, "/a.cpp")?;
                let base = sample("c:@S@Base", "Base", SymbolKind::Struct, file);
                upsert_definition_wins(conn, &base, 1)?;
                let mut derived = sample("c:@S@Derived", "Derived", SymbolKind::Struct, file);
                derived.base_classes = vec!["Base".to_string()];
                upsert_definition_wins(conn, &derived, 1)?;
                Ok(())
            })
            .unwrap();

        let hierarchy = layer.class_hierarchy("Base").unwrap();
        assert_eq!(hierarchy.derived.len(), 1);
        assert_eq!(hierarchy.derived[0].name, "Derived");
    }

    #[test]
    fn call_path_finds_a_two_hop_chain() {
        let project = tempdir().unwrap();
        let cache = tempdir().unwrap();
        let layer = ready_layer(cache.path(), project.path());

        layer
            .store
            .pool()
            .with_writer(|conn| {
                let file = get_or_create_file_id(conn, "/a.cpp")?;
                for (id, name) in [("c:@F@a#", "a"), ("c:@F@b#", "b"), ("c:@F@c#", "c")] {
                    upsert_definition_wins(conn, &sample(id, name, SymbolKind::Function, file), 1)?;
                }
                call_sites::insert(
                    conn,
                    &crate::symbol::CallSite {
                        caller_id: SymbolId::new("c:@F@a#"),
                        callee_id: SymbolId::new("c:@F@b#"),
                        file,
                        line: 1,
                        column: None,
                    },
                )?;
                call_sites::insert(
                    conn,
                    &crate::symbol::CallSite {
                        caller_id: SymbolId::new("c:@F@b#"),
                        callee_id: SymbolId::new("c:@F@c#"),
                        file,
                        line: 2,
                        column: None,
                    },
                )
            })
            .unwrap();

        let paths = layer.call_path("a", "c", 5).unwrap();
        assert_eq!(paths.len(), 1);
        let names: Vec<&str> = paths[0].iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let unreachable = layer.call_path("a", "c", 1).unwrap();
        assert!(unreachable.is_empty());
    }
}
