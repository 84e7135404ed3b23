//! Per-process `libclang` binding (spec §4.6): one `Clang` + `Index`
//! instance per worker process, created once and reused across every task
//! that process handles (spec §9 "globals replaced by explicit context" —
//! the global lives in `OnceLock`, not module-level `static mut`, and is
//! never observed across a fork/spawn boundary because each worker is its
//! own freshly exec'd process).

use clang::{Clang, Entity, EntityKind, Index};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::entity_kind::{classify, is_call_site};
use super::{cursor, IncludeEdgeOut, ParseErrorOut, ParseTask, ParsedBatch, ParsedFileGroup};
use crate::scanner::hash_file;
use crate::symbol::{RawCallSite, RawSymbol};
use crate::types::SymbolId;

static CLANG: OnceLock<Clang> = OnceLock::new();

/// Lazily performs the one-time, process-wide `Clang::new()` call. Calling
/// this more than once in the same process is a no-op (idempotent per
/// spec §4.6); calling it in two different worker processes is expected
/// and always independently succeeds.
fn clang_instance() -> &'static Clang {
    CLANG.get_or_init(|| Clang::new().expect("libclang failed to load in worker process"))
}

pub struct ParseWorker {
    index: Index<'static>,
}

impl ParseWorker {
    pub fn new() -> Self {
        super::apply_library_discovery();
        let clang = clang_instance();
        let index = Index::new(clang, true, false);
        Self { index }
    }

    /// Parses one translation unit and returns every symbol, call site,
    /// include edge, and header group it produced. Parse failures are
    /// returned as `Err` so the caller can record a `PARSE_FAILURE`
    /// without touching this file's prior successful snapshot.
    pub fn parse(&self, task: &ParseTask) -> Result<ParsedBatch, String> {
        let parser_args: Vec<&str> = task.args.iter().map(String::as_str).collect();
        let tu = self
            .index
            .parser(&task.file)
            .arguments(&parser_args)
            .detailed_preprocessing_record(true)
            .skip_function_bodies(false)
            .parse()
            .map_err(|e| format!("{e:?}"))?;

        let mut ctx = WalkContext::new(&task.file, &task.project_root);
        walk(tu.get_entity(), None, &mut ctx);

        let errors = tu
            .get_diagnostics()
            .into_iter()
            .filter_map(|d| {
                use clang::diagnostic::Severity;
                match d.get_severity() {
                    Severity::Error | Severity::Fatal => Some(ParseErrorOut {
                        error_kind: "PARSE_FAILURE".to_string(),
                        message: d.get_text(),
                        stacktrace: None,
                    }),
                    _ => None,
                }
            })
            .collect();

        let tu_group = ctx.tu_group(&task.file);
        let header_groups = ctx.header_groups();

        Ok(ParsedBatch {
            tu: tu_group,
            headers: header_groups,
            includes: ctx.includes,
            errors,
        })
    }
}

impl Default for ParseWorker {
    fn default() -> Self {
        Self::new()
    }
}

struct WalkContext<'a> {
    tu_path: &'a Path,
    project_root: &'a Path,
    tu_symbols: Vec<RawSymbol>,
    tu_calls: Vec<RawCallSite>,
    headers: HashMap<PathBuf, (Vec<RawSymbol>, Vec<RawCallSite>)>,
    includes: Vec<IncludeEdgeOut>,
}

impl<'a> WalkContext<'a> {
    fn new(tu_path: &'a Path, project_root: &'a Path) -> Self {
        Self {
            tu_path,
            project_root,
            tu_symbols: Vec::new(),
            tu_calls: Vec::new(),
            headers: HashMap::new(),
            includes: Vec::new(),
        }
    }

    fn record_symbol(&mut self, file: &Path, symbol: RawSymbol) {
        if file == self.tu_path {
            self.tu_symbols.push(symbol);
        } else {
            self.headers.entry(file.to_path_buf()).or_default().0.push(symbol);
        }
    }

    fn record_call(&mut self, file: &Path, call: RawCallSite) {
        if file == self.tu_path {
            self.tu_calls.push(call);
        } else {
            self.headers.entry(file.to_path_buf()).or_default().1.push(call);
        }
    }

    fn tu_group(&self, path: &Path) -> ParsedFileGroup {
        ParsedFileGroup {
            file: path.to_path_buf(),
            content_hash: hash_file(path).unwrap_or_default(),
            symbols: self.tu_symbols.clone(),
            call_sites: self.tu_calls.clone(),
        }
    }

    fn header_groups(&self) -> Vec<ParsedFileGroup> {
        self.headers
            .iter()
            .map(|(path, (symbols, calls))| ParsedFileGroup {
                file: path.clone(),
                content_hash: hash_file(path).unwrap_or_default(),
                symbols: symbols.clone(),
                call_sites: calls.clone(),
            })
            .collect()
    }
}

fn file_of(entity: &Entity<'_>) -> Option<PathBuf> {
    let location = entity.get_location()?;
    let file = location.get_file_location().file?;
    Some(file.get_path())
}

fn walk(entity: Entity<'_>, current_function: Option<SymbolId>, ctx: &mut WalkContext<'_>) {
    if entity.get_kind() == EntityKind::InclusionDirective {
        if let (Some(source_file), Some(included_file)) = (file_of(&entity), entity.get_file()) {
            ctx.includes.push(IncludeEdgeOut {
                source_file,
                included_file: included_file.get_path(),
                is_direct: true,
                depth: 1,
            });
        }
        return;
    }

    let category = classify(&entity);
    let mut next_function = current_function.clone();

    if let Some(kind) = category.to_symbol_kind() {
        if let (Some(usr), Some(file)) = (entity.get_usr(), file_of(&entity)) {
            let is_project = file.starts_with(ctx.project_root);
            let (brief_doc, full_doc) = cursor::documentation(&entity);
            let (start_line, end_line) = cursor::line_range(&entity);
            let declaration = cursor::declaration_site(&entity).and_then(|(_, start, end)| {
                let canonical = entity.get_canonical_entity();
                file_of(&canonical).map(|decl_file| (decl_file, start, end))
            });

            let symbol = RawSymbol {
                id: SymbolId::new(usr.0),
                name: entity.get_name().unwrap_or_default(),
                qualified_name: cursor::qualified_name(&entity),
                kind,
                file: file.clone(),
                position: cursor::position(&entity),
                start_line,
                end_line,
                declaration_file: declaration.as_ref().map(|(f, _, _)| f.clone()),
                declaration_start_line: declaration.as_ref().map(|(_, s, _)| *s),
                declaration_end_line: declaration.as_ref().map(|(_, _, e)| *e),
                signature: cursor::signature(&entity),
                is_project,
                namespace: cursor::namespace(&entity),
                access: cursor::access(&entity),
                parent_class: cursor::parent_class(&entity),
                base_classes: cursor::base_classes(&entity),
                is_definition: cursor::is_definition(&entity),
                brief_doc,
                full_doc,
            };

            if matches!(kind, crate::types::SymbolKind::Function | crate::types::SymbolKind::Method) {
                next_function = Some(symbol.id.clone());
            }

            ctx.record_symbol(&file, symbol);
        }
    }

    if is_call_site(&entity) {
        if let (Some(caller), Some(callee_entity), Some(file)) =
            (current_function.clone(), entity.get_reference(), file_of(&entity))
        {
            if let Some(callee_usr) = callee_entity.get_usr() {
                let position = cursor::position(&entity);
                ctx.record_call(
                    &file,
                    RawCallSite {
                        caller_id: caller,
                        callee_id: SymbolId::new(callee_usr.0),
                        file,
                        line: position.line,
                        column: Some(position.column),
                    },
                );
            }
        }
    }

    for child in entity.get_children() {
        walk(child, next_function.clone(), ctx);
    }
}

