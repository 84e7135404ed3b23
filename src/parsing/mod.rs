//! Parse Worker (C6, spec §4.6): parses one translation unit with
//! `libclang` (via the `clang` crate) and emits symbols, call sites,
//! include edges and per-header groups ready for the coordinator to apply.

pub mod cursor;
pub mod entity_kind;
pub mod worker;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::symbol::{RawCallSite, RawSymbol};

/// One file's worth of parse output: either the translation unit itself or
/// one header it claimed first-win ownership of (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParsedFileGroup {
    pub file: PathBuf,
    pub content_hash: String,
    pub symbols: Vec<RawSymbol>,
    pub call_sites: Vec<RawCallSite>,
}

/// One `#include` edge discovered anywhere in the translation unit.
/// `source_file` is whichever file physically contains the directive, so
/// the coordinator can group edges by file before calling
/// [`crate::storage::dependency_graph::update`] once per file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncludeEdgeOut {
    pub source_file: PathBuf,
    pub included_file: PathBuf,
    pub is_direct: bool,
    pub depth: i64,
}

/// A single parse-error occurrence (spec §3 "Parse error record"), emitted
/// by the worker without aborting the rest of the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseErrorOut {
    pub error_kind: String,
    pub message: String,
    pub stacktrace: Option<String>,
}

/// The full result of parsing one translation unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedBatch {
    pub tu: ParsedFileGroup,
    pub headers: Vec<ParsedFileGroup>,
    pub includes: Vec<IncludeEdgeOut>,
    pub errors: Vec<ParseErrorOut>,
}

/// `(file, args)` sent to a worker process (spec §4.6). `project_root` lets
/// the worker compute each symbol's `is_project` flag without a second
/// round trip to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseTask {
    pub file: PathBuf,
    pub args: Vec<String>,
    pub project_root: PathBuf,
}

/// Discovers the libclang shared library to load, per spec §6:
/// `PARSER_LIBRARY_PATH` overrides discovery; otherwise the crate lets
/// `clang-sys`'s own ordered search (system SDK, common package-manager
/// prefixes, vendored fallback) run unmodified.
pub fn discover_library_path() -> Option<String> {
    std::env::var("PARSER_LIBRARY_PATH").ok()
}

/// Applies the discovery policy by setting the environment variable
/// `clang-sys` itself consults (`LIBCLANG_PATH`) before any `Clang::new()`
/// call in this process. Idempotent: safe to call more than once.
pub fn apply_library_discovery() {
    if std::env::var_os("LIBCLANG_PATH").is_some() {
        return;
    }
    if let Some(path) = discover_library_path() {
        // SAFETY: called once at worker-process startup, before any other
        // thread in this process reads the environment.
        unsafe {
            std::env::set_var("LIBCLANG_PATH", path);
        }
    }
}
