use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cxindex::{Coordinator, IndexServer, QueryLayer, Settings};

/// Re-exec entry point for a worker child: checked before any CLI parsing
/// so a `--worker` argv never has to round-trip through clap. Mirrors the
/// teacher's own precedent of a hidden re-exec mode ahead of `Cli::parse`.
fn maybe_run_as_worker() -> ! {
    if let Err(e) = cxindex::worker_pool::run_worker_loop() {
        eprintln!("worker loop error: {e}");
        std::process::exit(1);
    }
    std::process::exit(0);
}

#[derive(Parser)]
#[command(name = "cxindex")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Incremental symbol index for C/C++ codebases, surfaced over MCP")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file at the project root.
    Init {
        /// Project root to initialize (defaults to the current directory).
        #[arg(default_value = ".")]
        project_path: PathBuf,
        /// Overwrite an existing configuration file.
        #[arg(short, long)]
        force: bool,
    },

    /// Index a project for the first time, or resume from its existing cache.
    Index {
        /// Project root to index.
        #[arg(default_value = ".")]
        project_path: PathBuf,
        /// Compilation database path, if not the project-root default.
        #[arg(long)]
        config_file: Option<PathBuf>,
    },

    /// Re-scan a previously indexed project and apply whatever changed.
    Refresh {
        /// Project root to refresh.
        #[arg(default_value = ".")]
        project_path: PathBuf,
        #[arg(long)]
        config_file: Option<PathBuf>,
        /// Clear the cache first and treat every file as newly added.
        #[arg(long)]
        force_full: bool,
    },

    /// Start the MCP server.
    Serve {
        /// Project root to open immediately (omit to wait for a client's
        /// `set_project_directory` call).
        project_path: Option<PathBuf>,
        #[arg(long)]
        config_file: Option<PathBuf>,
        /// Serve over streamable HTTP instead of stdio.
        #[arg(long)]
        http: bool,
        /// Bind address for `--http` (overrides configuration).
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run one query operation against a project's index.
    Query {
        /// Project root whose cache should be queried.
        #[arg(default_value = ".")]
        project_path: PathBuf,
        #[arg(long)]
        config_file: Option<PathBuf>,
        #[command(subcommand)]
        query: RetrieveQuery,
    },
}

#[derive(Subcommand)]
enum RetrieveQuery {
    /// Search indexed symbols by name or regex pattern.
    Search {
        pattern: String,
        #[arg(long)]
        project_only: bool,
        #[arg(long)]
        file: Option<String>,
    },
    /// Get a class or struct's methods, fields, bases, and documentation.
    ClassInfo { class_name: String },
    /// Get every matching signature for a function or method name.
    FunctionSignature {
        function_name: String,
        #[arg(long)]
        class_name: Option<String>,
    },
    /// Get a class's recorded bases and every class deriving from it.
    ClassHierarchy { class_name: String },
    /// Find every symbol with a call site naming `function_name` as callee.
    Callers { function_name: String },
    /// Find every symbol `function_name` calls.
    Callees { function_name: String },
    /// Find the shortest call chain between two functions.
    CallPath {
        from_function: String,
        to_function: String,
        #[arg(long, default_value_t = 10)]
        max_depth: usize,
    },
    /// Find symbols declared in a file, optionally filtered by pattern.
    InFile {
        file_path: String,
        #[arg(default_value = "")]
        pattern: String,
    },
    /// Report lifecycle state and index statistics.
    Status,
}

#[tokio::main]
async fn main() {
    if std::env::args().nth(1).as_deref() == Some(cxindex::worker_pool::WORKER_FLAG) {
        maybe_run_as_worker();
    }

    let cli = Cli::parse();
    let start_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let settings = Settings::load(&start_dir).unwrap_or_else(|e| {
        eprintln!("configuration error: {e}; falling back to defaults");
        Settings::default()
    });
    cxindex::logging::init(&settings.logging);

    let exit_code = match cli.command {
        Commands::Init { project_path, force } => run_init(&project_path, force),
        Commands::Index { project_path, config_file } => {
            run_index(settings, &project_path, config_file.as_deref())
        }
        Commands::Refresh { project_path, config_file, force_full } => {
            run_refresh(settings, &project_path, config_file.as_deref(), force_full)
        }
        Commands::Serve { project_path, config_file, http, bind } => {
            run_serve(settings, project_path, config_file, http, bind).await
        }
        Commands::Query { project_path, config_file, query } => {
            run_query(settings, &project_path, config_file.as_deref(), query)
        }
    };
    std::process::exit(exit_code);
}

fn run_init(project_path: &std::path::Path, force: bool) -> i32 {
    let config_path = project_path.join(Settings::CONFIG_FILE_NAME);
    if config_path.exists() && !force {
        eprintln!("configuration file already exists at {}", config_path.display());
        eprintln!("use --force to overwrite");
        return 1;
    }
    let settings = Settings::default();
    match settings.save(&config_path) {
        Ok(()) => {
            println!("wrote configuration to {}", config_path.display());
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

fn open_coordinator(
    settings: Settings,
    project_path: &std::path::Path,
    config_file: Option<&std::path::Path>,
) -> Result<Coordinator, i32> {
    let worker_binary = std::env::current_exe().map_err(|e| {
        eprintln!("error: could not determine own executable path: {e}");
        1
    })?;
    Coordinator::open(project_path, config_file, settings, worker_binary).map_err(|e| {
        eprintln!("error [{}]: {e}", e.kind());
        1
    })
}

fn run_index(
    settings: Settings,
    project_path: &std::path::Path,
    config_file: Option<&std::path::Path>,
) -> i32 {
    let coordinator = match open_coordinator(settings, project_path, config_file) {
        Ok(c) => c,
        Err(code) => return code,
    };
    match coordinator.set_project_directory(&cxindex::diagnostics::TracingProgressSink) {
        Ok(report) => {
            println!(
                "{{\"status\":\"ok\",\"mode\":\"{}\",\"files_analyzed\":{}}}",
                report.mode.as_str(),
                report.files_analyzed
            );
            0
        }
        Err(e) => {
            eprintln!("error [{}]: {e}", e.kind());
            1
        }
    }
}

fn run_refresh(
    settings: Settings,
    project_path: &std::path::Path,
    config_file: Option<&std::path::Path>,
    force_full: bool,
) -> i32 {
    let coordinator = match open_coordinator(settings, project_path, config_file) {
        Ok(c) => c,
        Err(code) => return code,
    };
    match coordinator.refresh_project(force_full, &cxindex::diagnostics::TracingProgressSink) {
        Ok(report) => {
            println!(
                "{{\"status\":\"ok\",\"mode\":\"{}\",\"files_analyzed\":{},\"files_removed\":{}}}",
                report.mode.as_str(),
                report.files_analyzed,
                report.files_removed
            );
            0
        }
        Err(e) => {
            eprintln!("error [{}]: {e}", e.kind());
            1
        }
    }
}

async fn run_serve(
    settings: Settings,
    project_path: Option<PathBuf>,
    config_file: Option<PathBuf>,
    http: bool,
    bind: Option<String>,
) -> i32 {
    let bind_addr = bind.unwrap_or_else(|| format!("{}:{}", settings.mcp.http_bind, settings.mcp.http_port));

    let server = match project_path {
        Some(path) => match IndexServer::with_project(settings, &path, config_file.as_deref()) {
            Ok(server) => server,
            Err(e) => {
                eprintln!("error [{}]: {e}", e.kind());
                return 1;
            }
        },
        None => IndexServer::new(settings),
    };

    let result = if http {
        eprintln!("MCP server listening on http://{bind_addr}/mcp");
        cxindex::mcp::serve_http(server, &bind_addr).await
    } else {
        eprintln!("MCP server on stdio");
        cxindex::mcp::serve_stdio(server).await
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("server error: {e}");
            1
        }
    }
}

/// Opens (or resumes) the project's cache, runs one no-op-or-incremental
/// refresh so the query reflects the current tree, then answers `query`.
/// A CLI invocation has no long-lived server to keep a stale view fresh
/// between calls, so each one earns its own up-to-date pass first.
fn run_query(
    settings: Settings,
    project_path: &std::path::Path,
    config_file: Option<&std::path::Path>,
    query: RetrieveQuery,
) -> i32 {
    let coordinator = match open_coordinator(settings, project_path, config_file) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = coordinator.set_project_directory(&cxindex::diagnostics::NoopProgressSink) {
        eprintln!("error [{}]: {e}", e.kind());
        return 1;
    }

    let layer = QueryLayer::new(
        std::sync::Arc::clone(coordinator.store()),
        std::sync::Arc::clone(coordinator.lifecycle()),
        coordinator.identity().clone(),
        coordinator.settings().cache_root.clone(),
    );

    let result: Result<String, cxindex::IndexError> = (|| match query {
        RetrieveQuery::Search { pattern, project_only, file } => {
            let symbols = layer.search_symbols(&pattern, None, project_only, file.as_deref())?;
            Ok(serde_json::to_string_pretty(&symbols).expect("serializing an internal record never fails"))
        }
        RetrieveQuery::ClassInfo { class_name } => {
            let info = layer.class_info(&class_name)?;
            Ok(serde_json::to_string_pretty(&info.map(|i| (i.class, i.methods, i.fields))).expect("serializing an internal record never fails"))
        }
        RetrieveQuery::FunctionSignature { function_name, class_name } => {
            let matches = layer.function_signatures(&function_name, class_name.as_deref())?;
            Ok(serde_json::to_string_pretty(&matches).expect("serializing an internal record never fails"))
        }
        RetrieveQuery::ClassHierarchy { class_name } => {
            let hierarchy = layer.class_hierarchy(&class_name)?;
            Ok(serde_json::to_string_pretty(&(hierarchy.bases, hierarchy.derived)).expect("serializing an internal record never fails"))
        }
        RetrieveQuery::Callers { function_name } => {
            Ok(serde_json::to_string_pretty(&layer.find_callers(&function_name)?).expect("serializing an internal record never fails"))
        }
        RetrieveQuery::Callees { function_name } => {
            Ok(serde_json::to_string_pretty(&layer.find_callees(&function_name)?).expect("serializing an internal record never fails"))
        }
        RetrieveQuery::CallPath { from_function, to_function, max_depth } => {
            let paths = layer.call_path(&from_function, &to_function, max_depth)?;
            Ok(serde_json::to_string_pretty(&paths).expect("serializing an internal record never fails"))
        }
        RetrieveQuery::InFile { file_path, pattern } => {
            Ok(serde_json::to_string_pretty(&layer.find_in_file(&file_path, &pattern)?).expect("serializing an internal record never fails"))
        }
        RetrieveQuery::Status => Ok(serde_json::to_string_pretty(&layer.server_status()?).expect("serializing an internal record never fails")),
    })();

    match result {
        Ok(body) => {
            println!("{body}");
            0
        }
        Err(e) => {
            eprintln!("error [{}]: {e}", e.kind());
            1
        }
    }
}
