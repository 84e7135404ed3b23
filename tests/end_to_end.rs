//! End-to-end scenarios from the indexer's spec: a small on-disk C/C++
//! fixture tree is indexed through the real `cxindex` binary (re-exec'd
//! as a worker via `--worker`, never forked), then the coordinator and
//! query layer are driven the same way a CLI or MCP caller would.
//!
//! These exercise `libclang` through the real `clang` crate bindings, so
//! they require a discoverable libclang at test time (the same
//! requirement the binary itself has in production).

use std::path::Path;
use std::sync::Arc;

use cxindex::config::Settings;
use cxindex::coordinator::Coordinator;
use cxindex::diagnostics::NoopProgressSink;
use cxindex::query::QueryLayer;
use cxindex::types::SymbolKind;

fn worker_binary() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_cxindex"))
}

fn settings_for(cache_root: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.cache_root = cache_root.to_path_buf();
    settings
}

fn query_for(coordinator: &Coordinator) -> QueryLayer {
    QueryLayer::new(
        Arc::clone(coordinator.store()),
        Arc::clone(coordinator.lifecycle()),
        coordinator.identity().clone(),
        coordinator.settings().cache_root.clone(),
    )
}

fn write_baseline_project(root: &Path) {
    std::fs::write(
        root.join("utils.h"),
        r#"
#pragma once
int calculate_sum(int a, int b);
void print_message(const char *msg);
"#,
    )
    .unwrap();

    std::fs::write(
        root.join("utils.cpp"),
        r#"
#include "utils.h"
#include <cstdio>

int calculate_sum(int a, int b) {
    return a + b;
}

void print_message(const char *msg) {
    std::printf("%s", msg);
}
"#,
    )
    .unwrap();

    std::fs::write(
        root.join("main.cpp"),
        r#"
#include "utils.h"

const char *get_greeting() {
    return "hello";
}

int main() {
    print_message(get_greeting());
    return calculate_sum(1, 2);
}
"#,
    )
    .unwrap();
}

/// Scenario A (spec §8): a freshly indexed baseline project reports
/// exactly the three functions it defines, and an immediate no-op
/// refresh analyzes nothing.
#[test]
fn scenario_a_baseline_then_noop_refresh() {
    let project = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    write_baseline_project(project.path());

    let coordinator = Coordinator::open(
        project.path(),
        None,
        settings_for(cache.path()),
        worker_binary(),
    )
    .unwrap();
    let report = coordinator
        .set_project_directory(&NoopProgressSink)
        .unwrap();
    assert_eq!(report.files_analyzed, 3);

    let query = query_for(&coordinator);
    let functions = query
        .search_symbols(".*", Some(&[SymbolKind::Function]), false, None)
        .unwrap();
    let names: std::collections::HashSet<_> = functions.iter().map(|s| s.name.as_str()).collect();
    assert!(names.contains("get_greeting"));
    assert!(names.contains("calculate_sum"));
    assert!(names.contains("print_message"));

    let refresh = coordinator
        .refresh_project(false, &NoopProgressSink)
        .unwrap();
    assert_eq!(refresh.files_analyzed, 0);
    assert_eq!(refresh.files_removed, 0);
}

/// Scenario B (spec §8): appending a new function to an existing source
/// file reparses only that file and the new function is discoverable.
#[test]
fn scenario_b_single_source_change() {
    let project = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    write_baseline_project(project.path());

    let coordinator = Coordinator::open(
        project.path(),
        None,
        settings_for(cache.path()),
        worker_binary(),
    )
    .unwrap();
    coordinator
        .set_project_directory(&NoopProgressSink)
        .unwrap();

    let utils_cpp = project.path().join("utils.cpp");
    let mut contents = std::fs::read_to_string(&utils_cpp).unwrap();
    contents.push_str("\nvoid goodbye() {}\n");
    std::fs::write(&utils_cpp, contents).unwrap();

    let report = coordinator
        .refresh_project(false, &NoopProgressSink)
        .unwrap();
    assert_eq!(report.files_analyzed, 1);

    let query = query_for(&coordinator);
    let matches = query
        .search_symbols("goodbye", None, false, None)
        .unwrap();
    assert_eq!(matches.len(), 1);
    let resolved_file = query.resolve_path(matches[0].file).unwrap().unwrap();
    assert_eq!(Path::new(&resolved_file), utils_cpp.canonicalize().unwrap());
}

/// Scenario C (spec §8): modifying a header cascades to every transitive
/// dependent, and a declaration-only symbol shows `is_definition = false`.
#[test]
fn scenario_c_header_cascade() {
    let project = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    write_baseline_project(project.path());

    let coordinator = Coordinator::open(
        project.path(),
        None,
        settings_for(cache.path()),
        worker_binary(),
    )
    .unwrap();
    coordinator
        .set_project_directory(&NoopProgressSink)
        .unwrap();

    let header = project.path().join("utils.h");
    let mut contents = std::fs::read_to_string(&header).unwrap();
    contents.push_str("\nvoid farewell();\n");
    std::fs::write(&header, contents).unwrap();

    let report = coordinator
        .refresh_project(false, &NoopProgressSink)
        .unwrap();
    assert!(report.files_analyzed >= 2, "expected main.cpp and utils.cpp to both reparse");

    let query = query_for(&coordinator);
    let matches = query
        .search_symbols("farewell", None, false, None)
        .unwrap();
    assert!(!matches.is_empty());
    assert!(matches.iter().all(|s| !s.is_definition));
}

/// Scenario D (spec §8): changing a file's compile arguments (without any
/// content change) is reported via `changes.compile_commands` and queues
/// that file for reparse.
#[test]
fn scenario_d_compile_commands_change() {
    let project = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    write_baseline_project(project.path());

    let settings = settings_for(cache.path());
    let coordinator =
        Coordinator::open(project.path(), None, settings, worker_binary()).unwrap();
    coordinator
        .set_project_directory(&NoopProgressSink)
        .unwrap();

    let main_cpp = project.path().join("main.cpp").canonicalize().unwrap();
    let compile_commands = serde_json::json!([
        {
            "directory": project.path().to_string_lossy(),
            "file": main_cpp.to_string_lossy(),
            "arguments": ["clang++", "-std=c++20", main_cpp.to_string_lossy()],
        }
    ]);
    std::fs::write(
        project.path().join("compile_commands.json"),
        serde_json::to_string_pretty(&compile_commands).unwrap(),
    )
    .unwrap();

    let report = coordinator
        .refresh_project(false, &NoopProgressSink)
        .unwrap();
    assert!(report.changes.compile_commands);
    assert!(report.files_analyzed >= 1);
}

/// Scenario E (spec §8): deleting a source file removes its definitions
/// from the index while a header declaration of the same name may still
/// remain (here: `calculate_sum`'s definition disappears with `utils.cpp`).
#[test]
fn scenario_e_file_removal() {
    let project = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    write_baseline_project(project.path());

    let coordinator = Coordinator::open(
        project.path(),
        None,
        settings_for(cache.path()),
        worker_binary(),
    )
    .unwrap();
    coordinator
        .set_project_directory(&NoopProgressSink)
        .unwrap();

    std::fs::remove_file(project.path().join("utils.cpp")).unwrap();

    let report = coordinator
        .refresh_project(false, &NoopProgressSink)
        .unwrap();
    assert!(report.files_removed >= 1);

    let query = query_for(&coordinator);
    let matches = query
        .search_symbols("calculate_sum", None, false, None)
        .unwrap();
    assert!(matches.iter().all(|s| !s.is_definition));
}

/// Scenario F (spec §8): a template type parameter literally named
/// `Base` must not be confused with a concrete `struct Base` when
/// looking up derived classes.
#[test]
fn scenario_f_template_parameter_name_collision() {
    let project = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();

    std::fs::write(
        project.path().join("adapter.cpp"),
        r#"
struct Base {
    virtual ~Base() = default;
};

struct RealDerived : public Base {};

template<typename Base>
class Adapter : public Base {};
"#,
    )
    .unwrap();

    let coordinator = Coordinator::open(
        project.path(),
        None,
        settings_for(cache.path()),
        worker_binary(),
    )
    .unwrap();
    coordinator
        .set_project_directory(&NoopProgressSink)
        .unwrap();

    let query = query_for(&coordinator);
    let hierarchy = query.class_hierarchy("Base").unwrap();
    let names: Vec<&str> = hierarchy.derived.iter().map(|s| s.name.as_str()).collect();
    assert!(names.contains(&"RealDerived"));
    assert!(!names.contains(&"Adapter"));
}

/// Universal invariant 6 (spec §8): deleting a file and refreshing also
/// clears its call sites and dependency edges, not just its symbols.
#[test]
fn removal_clears_call_sites_and_dependency_edges() {
    let project = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    write_baseline_project(project.path());

    let coordinator = Coordinator::open(
        project.path(),
        None,
        settings_for(cache.path()),
        worker_binary(),
    )
    .unwrap();
    coordinator
        .set_project_directory(&NoopProgressSink)
        .unwrap();

    std::fs::remove_file(project.path().join("main.cpp")).unwrap();
    coordinator
        .refresh_project(false, &NoopProgressSink)
        .unwrap();

    let query = query_for(&coordinator);
    let callers = query.find_callers("print_message").unwrap();
    assert!(callers.is_empty());
}
