//! MCP (Model Context Protocol) surface (spec §6): the tool-protocol table
//! exposed over stdio and HTTP streamable transports via `rmcp`, grounded in
//! the teacher's `src/mcp/mod.rs` server shape. Unlike the teacher's
//! narrative-text responses, every tool here returns structured JSON (spec
//! §6 "All responses are structured JSON"); errors are reported as
//! `{error: kind, message}` using `IndexError::kind()` rather than prose.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, ErrorData as McpError, Implementation, ProtocolVersion,
    ServerCapabilities, ServerInfo,
};
use rmcp::{schemars, tool, tool_handler, tool_router, ServerHandler};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::Settings;
use crate::coordinator::Coordinator;
use crate::diagnostics::NoopProgressSink;
use crate::error::IndexError;
use crate::query::{ClassHierarchy, ClassInfo, QueryLayer, ServerStatus};
use crate::symbol::Symbol;
use crate::types::SymbolKind;

/// A project's live server-side state: a coordinator to drive
/// `set_project_directory`/`refresh_project`, and the query layer built
/// from the exact same store/lifecycle so a query always sees what the
/// coordinator has actually applied.
struct ProjectState {
    coordinator: Coordinator,
    query: QueryLayer,
}

impl ProjectState {
    fn open(source_root: &Path, config_file: Option<&Path>, settings: Settings) -> Result<Self, IndexError> {
        let worker_binary = std::env::current_exe()?;
        let coordinator = Coordinator::open(source_root, config_file, settings, worker_binary)?;
        let query = QueryLayer::new(
            Arc::clone(coordinator.store()),
            Arc::clone(coordinator.lifecycle()),
            coordinator.identity().clone(),
            coordinator.settings().cache_root.clone(),
        );
        Ok(Self { coordinator, query })
    }
}

/// Resolves a [`Symbol`]'s internal `FileId`s to the paths they were
/// scanned from. `FileId` is documented in `types::FileId` as "never
/// observed outside storage" — this is the single seam where that
/// invariant is enforced before a record crosses the MCP boundary.
#[derive(Debug, Clone, Serialize)]
struct SymbolRecord {
    id: String,
    name: String,
    qualified_name: String,
    kind: &'static str,
    file: String,
    line: u32,
    column: u32,
    start_line: u32,
    end_line: u32,
    declaration_file: Option<String>,
    declaration_start_line: Option<u32>,
    declaration_end_line: Option<u32>,
    signature: String,
    is_project: bool,
    namespace: Option<String>,
    access: &'static str,
    parent_class: Option<String>,
    base_classes: Vec<String>,
    is_definition: bool,
    brief_doc: Option<String>,
    full_doc: Option<String>,
}

fn symbol_record(query: &QueryLayer, symbol: &Symbol) -> Result<SymbolRecord, IndexError> {
    let file = query.resolve_path(symbol.file)?.unwrap_or_default();
    let declaration_file = match symbol.declaration_file {
        Some(id) => query.resolve_path(id)?,
        None => None,
    };
    Ok(SymbolRecord {
        id: symbol.id.as_str().to_string(),
        name: symbol.name.clone(),
        qualified_name: symbol.qualified_name.clone(),
        kind: symbol.kind.as_str(),
        file,
        line: symbol.position.line,
        column: symbol.position.column,
        start_line: symbol.start_line,
        end_line: symbol.end_line,
        declaration_file,
        declaration_start_line: symbol.declaration_start_line,
        declaration_end_line: symbol.declaration_end_line,
        signature: symbol.signature.clone(),
        is_project: symbol.is_project,
        namespace: symbol.namespace.clone(),
        access: symbol.access.as_str(),
        parent_class: symbol.parent_class.clone(),
        base_classes: symbol.base_classes.clone(),
        is_definition: symbol.is_definition,
        brief_doc: symbol.brief_doc.clone(),
        full_doc: symbol.full_doc.clone(),
    })
}

fn symbol_records(query: &QueryLayer, symbols: &[Symbol]) -> Result<Vec<SymbolRecord>, IndexError> {
    symbols.iter().map(|s| symbol_record(query, s)).collect()
}

#[derive(Debug, Clone, Serialize)]
struct ClassInfoRecord {
    class: SymbolRecord,
    methods: Vec<SymbolRecord>,
    fields: Vec<SymbolRecord>,
    bases: Vec<String>,
}

fn class_info_record(query: &QueryLayer, info: ClassInfo) -> Result<ClassInfoRecord, IndexError> {
    let bases = info.class.base_classes.clone();
    Ok(ClassInfoRecord {
        class: symbol_record(query, &info.class)?,
        methods: symbol_records(query, &info.methods)?,
        fields: symbol_records(query, &info.fields)?,
        bases,
    })
}

#[derive(Debug, Clone, Serialize)]
struct ClassHierarchyRecord {
    bases: Vec<String>,
    derived: Vec<SymbolRecord>,
}

fn class_hierarchy_record(
    query: &QueryLayer,
    hierarchy: ClassHierarchy,
) -> Result<ClassHierarchyRecord, IndexError> {
    Ok(ClassHierarchyRecord {
        bases: hierarchy.bases,
        derived: symbol_records(query, &hierarchy.derived)?,
    })
}

/// Serializes `value` to a pretty JSON success response, or falls back to
/// an error response naming the (unexpected) serialization failure —
/// `serde_json` only fails here on a type bug, never on caller input.
fn ok_json<T: Serialize>(value: &T) -> CallToolResult {
    match serde_json::to_string_pretty(value) {
        Ok(body) => CallToolResult::success(vec![Content::text(body)]),
        Err(e) => error_json("SERIALIZATION_FAILURE", &e.to_string()),
    }
}

/// `{error: kind, message}` per spec §6/§7, as the text body of an error
/// `CallToolResult` — the tool call itself still succeeds at the protocol
/// level; it's the indexing operation the response reports as failed.
fn error_json(kind: &str, message: &str) -> CallToolResult {
    let body = serde_json::json!({ "error": kind, "message": message });
    CallToolResult::error(vec![Content::text(body.to_string())])
}

fn err_to_result(err: &IndexError) -> CallToolResult {
    error_json(err.kind(), &err.to_string())
}

fn parse_kinds(kinds: Option<&[String]>) -> Option<Vec<SymbolKind>> {
    kinds.map(|ks| ks.iter().filter_map(|k| SymbolKind::from_str(k)).collect())
}

fn default_max_depth() -> usize {
    10
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct SetProjectDirectoryRequest {
    pub project_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auto_refresh: bool,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct RefreshProjectRequest {
    #[serde(default)]
    pub incremental: bool,
    #[serde(default)]
    pub force_full: bool,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct SearchSymbolsRequest {
    pub pattern: String,
    #[serde(default)]
    pub project_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct GetClassInfoRequest {
    pub class_name: String,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct GetFunctionSignatureRequest {
    pub function_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct GetClassHierarchyRequest {
    pub class_name: String,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct FindCallersRequest {
    pub function_name: String,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct FindCalleesRequest {
    pub function_name: String,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct GetCallPathRequest {
    pub from_function: String,
    pub to_function: String,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct FindInFileRequest {
    pub file_path: String,
    #[serde(default)]
    pub pattern: String,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct GetServerStatusRequest {}

/// MCP entry point: one server instance points at at most one project at a
/// time, swapped out wholesale by `set_project_directory` (spec §6). Every
/// tool method takes the read lock only for the duration of the call;
/// `set_project_directory`/`refresh_project` run on a blocking thread since
/// they spawn worker processes and may run for a while (spec §5 "worker
/// dispatch ... blocking future joins").
#[derive(Clone)]
pub struct IndexServer {
    state: Arc<RwLock<Option<ProjectState>>>,
    settings: Settings,
    tool_router: ToolRouter<Self>,
}

impl IndexServer {
    pub fn new(settings: Settings) -> Self {
        Self {
            state: Arc::new(RwLock::new(None)),
            settings,
            tool_router: Self::tool_router(),
        }
    }

    /// Opens a project up front (used by the CLI's `serve` command when a
    /// project path is already known at startup) rather than waiting for a
    /// client's `set_project_directory` call.
    pub fn with_project(settings: Settings, source_root: &Path, config_file: Option<&Path>) -> Result<Self, IndexError> {
        let project_state = ProjectState::open(source_root, config_file, settings.clone())?;
        Ok(Self {
            state: Arc::new(RwLock::new(Some(project_state))),
            settings,
            tool_router: Self::tool_router(),
        })
    }
}

#[tool_router]
impl IndexServer {
    #[tool(description = "Point the server at a project root, indexing it if this is the first time or resuming from a prior cache")]
    pub async fn set_project_directory(
        &self,
        Parameters(req): Parameters<SetProjectDirectoryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let settings = self.settings.clone();
        let project_path = PathBuf::from(&req.project_path);
        let config_path = req.config_file.map(PathBuf::from);

        let outcome = tokio::task::spawn_blocking(move || -> Result<_, IndexError> {
            let project_state = ProjectState::open(&project_path, config_path.as_deref(), settings)?;
            let report = project_state
                .coordinator
                .set_project_directory(&NoopProgressSink)?;
            Ok((project_state, report))
        })
        .await
        .expect("set_project_directory worker thread panicked");

        match outcome {
            Ok((project_state, report)) => {
                *self.state.write().await = Some(project_state);
                Ok(ok_json(&serde_json::json!({
                    "status": "ok",
                    "mode": report.mode.as_str(),
                    "files_analyzed": report.files_analyzed,
                })))
            }
            Err(e) => Ok(err_to_result(&e)),
        }
    }

    #[tool(description = "Re-scan the current project for added, modified, and removed files and apply the changes to the index")]
    pub async fn refresh_project(
        &self,
        Parameters(req): Parameters<RefreshProjectRequest>,
    ) -> Result<CallToolResult, McpError> {
        let guard = self.state.read().await;
        let Some(project_state) = guard.as_ref() else {
            return Ok(error_json("NOT_READY", "no project is open; call set_project_directory first"));
        };
        let coordinator = project_state.coordinator.clone();
        drop(guard);

        let force_full = req.force_full || !req.incremental;
        let result = tokio::task::spawn_blocking(move || {
            coordinator.refresh_project(force_full, &NoopProgressSink)
        })
        .await
        .expect("refresh_project worker thread panicked");

        match result {
            Ok(report) => Ok(ok_json(&serde_json::json!({
                "status": "ok",
                "mode": report.mode.as_str(),
                "files_analyzed": report.files_analyzed,
                "files_removed": report.files_removed,
                "elapsed_s": report.elapsed_s,
                "changes": {
                    "compile_commands": report.changes.compile_commands,
                    "added": report.changes.added,
                    "modified": report.changes.modified,
                    "modified_headers": report.changes.modified_headers,
                    "removed": report.changes.removed,
                },
            }))),
            Err(e) => Ok(err_to_result(&e)),
        }
    }

    #[tool(description = "Search indexed symbols by name or regex pattern, optionally filtered by kind, project-only scope, or file")]
    pub async fn search_symbols(
        &self,
        Parameters(req): Parameters<SearchSymbolsRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.with_query(|query| {
            let kinds = parse_kinds(req.kinds.as_deref());
            let mut matches = query.search_symbols(&req.pattern, kinds.as_deref(), req.project_only, req.file.as_deref())?;
            if let Some(class_name) = &req.class_name {
                matches.retain(|s| s.parent_class.as_deref() == Some(class_name.as_str()));
            }
            symbol_records(query, &matches)
        })
        .await
    }

    #[tool(description = "Search indexed classes and structs by name or regex pattern")]
    pub async fn search_classes(
        &self,
        Parameters(req): Parameters<SearchSymbolsRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.with_query(|query| {
            let kinds = [SymbolKind::Class, SymbolKind::Struct];
            let matches = query.search_symbols(&req.pattern, Some(&kinds), req.project_only, req.file.as_deref())?;
            symbol_records(query, &matches)
        })
        .await
    }

    #[tool(description = "Search indexed free functions and methods by name or regex pattern")]
    pub async fn search_functions(
        &self,
        Parameters(req): Parameters<SearchSymbolsRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.with_query(|query| {
            let kinds = [SymbolKind::Function, SymbolKind::Method];
            let mut matches = query.search_symbols(&req.pattern, Some(&kinds), req.project_only, req.file.as_deref())?;
            if let Some(class_name) = &req.class_name {
                matches.retain(|s| s.parent_class.as_deref() == Some(class_name.as_str()));
            }
            symbol_records(query, &matches)
        })
        .await
    }

    #[tool(description = "Get a class or struct's methods, fields, base classes, and documentation")]
    pub async fn get_class_info(
        &self,
        Parameters(req): Parameters<GetClassInfoRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.with_query(|query| match query.class_info(&req.class_name)? {
            Some(info) => Ok(Some(class_info_record(query, info)?)),
            None => Ok(None),
        })
        .await
    }

    #[tool(description = "Get every matching signature for a function or method name, optionally scoped to a class")]
    pub async fn get_function_signature(
        &self,
        Parameters(req): Parameters<GetFunctionSignatureRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.with_query(|query| {
            let matches = query.function_signatures(&req.function_name, req.class_name.as_deref())?;
            symbol_records(query, &matches)
        })
        .await
    }

    #[tool(description = "Get a class's recorded base classes and every class that derives from it")]
    pub async fn get_class_hierarchy(
        &self,
        Parameters(req): Parameters<GetClassHierarchyRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.with_query(|query| {
            let hierarchy = query.class_hierarchy(&req.class_name)?;
            class_hierarchy_record(query, hierarchy)
        })
        .await
    }

    #[tool(description = "Get every class that derives from the named class or struct")]
    pub async fn get_derived_classes(
        &self,
        Parameters(req): Parameters<GetClassHierarchyRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.with_query(|query| {
            let hierarchy = query.class_hierarchy(&req.class_name)?;
            symbol_records(query, &hierarchy.derived)
        })
        .await
    }

    #[tool(description = "Find every symbol with a call site naming the given function as callee")]
    pub async fn find_callers(
        &self,
        Parameters(req): Parameters<FindCallersRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.with_query(|query| symbol_records(query, &query.find_callers(&req.function_name)?))
            .await
    }

    #[tool(description = "Find every symbol the given function calls")]
    pub async fn find_callees(
        &self,
        Parameters(req): Parameters<FindCalleesRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.with_query(|query| symbol_records(query, &query.find_callees(&req.function_name)?))
            .await
    }

    #[tool(description = "Find the shortest call chain from one function to another, bounded by max_depth hops")]
    pub async fn get_call_path(
        &self,
        Parameters(req): Parameters<GetCallPathRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.with_query(|query| {
            let paths = query.call_path(&req.from_function, &req.to_function, req.max_depth)?;
            paths.iter().map(|path| symbol_records(query, path)).collect::<Result<Vec<_>, _>>()
        })
        .await
    }

    #[tool(description = "Find symbols declared in a given file, optionally filtered by a name pattern")]
    pub async fn find_in_file(
        &self,
        Parameters(req): Parameters<FindInFileRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.with_query(|query| symbol_records(query, &query.find_in_file(&req.file_path, &req.pattern)?))
            .await
    }

    #[tool(description = "Report the server's lifecycle state and index statistics; always answerable, even before an index exists")]
    pub async fn get_server_status(
        &self,
        Parameters(_req): Parameters<GetServerStatusRequest>,
    ) -> Result<CallToolResult, McpError> {
        let guard = self.state.read().await;
        match guard.as_ref() {
            Some(project_state) => match project_state.query.server_status() {
                Ok(status) => Ok(ok_json(&status)),
                Err(e) => Ok(err_to_result(&e)),
            },
            None => Ok(ok_json(&ServerStatus {
                state: "Uninitialized".to_string(),
                indexed_file_count: 0,
                symbol_count: 0,
                cache_dir: String::new(),
                last_refresh: None,
            })),
        }
    }
}

impl IndexServer {
    /// Runs `f` against the open project's query layer, translating
    /// `NOT_READY` (no project open yet) and any `IndexError` `f` returns
    /// into `{error, message}` bodies rather than protocol-level failures.
    async fn with_query<T, F>(&self, f: F) -> Result<CallToolResult, McpError>
    where
        T: Serialize,
        F: FnOnce(&QueryLayer) -> Result<T, IndexError> + Send,
    {
        let guard = self.state.read().await;
        match guard.as_ref() {
            Some(project_state) => match f(&project_state.query) {
                Ok(value) => Ok(ok_json(&value)),
                Err(e) => Ok(err_to_result(&e)),
            },
            None => Ok(error_json("NOT_READY", "no project is open; call set_project_directory first")),
        }
    }
}

#[tool_handler]
impl ServerHandler for IndexServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "cxindex".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("C/C++ Symbol Index".to_string()),
                website_url: Some("https://github.com/bartolli/cxindex".to_string()),
                icons: None,
            },
            instructions: Some(
                "This server indexes a C/C++ codebase and answers structural questions about \
                it. Call `set_project_directory` first to point it at a project root (or cache \
                hit, if one already exists). Use `search_symbols`/`search_classes`/ \
                `search_functions` to locate declarations, `get_class_info`/`get_class_hierarchy` \
                for type structure, and `find_callers`/`find_callees`/`get_call_path` for call \
                relationships. `get_server_status` always answers, even before indexing starts, \
                so a client can tell whether the other tools are ready to be called."
                    .to_string(),
            ),
        }
    }
}

/// Runs the server over the stdio transport (spec §6's stdio interchange),
/// mirroring the teacher's `run_stdio_server`.
pub async fn serve_stdio(server: IndexServer) -> anyhow::Result<()> {
    use rmcp::{transport::stdio, ServiceExt};

    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}

/// Runs the server over HTTP using the streamable-HTTP transport (spec §6's
/// "HTTP POST / HTTP streaming" transports share one implementation),
/// grounded in the teacher's `src/mcp/http_server.rs`. Unlike the teacher,
/// this carries no OAuth/Bearer-auth layer — spec §6 names no
/// authentication requirement for these interfaces.
pub async fn serve_http(server: IndexServer, bind: &str) -> anyhow::Result<()> {
    use axum::routing::get;
    use axum::Router;
    use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
    use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
    use tokio_util::sync::CancellationToken;

    let ct = CancellationToken::new();
    let service_server = server.clone();
    let mcp_service = StreamableHttpService::new(
        move || Ok(service_server.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig {
            cancellation_token: ct.child_token(),
            sse_keep_alive: Some(Duration::from_secs(15)),
            stateful_mode: true,
        },
    );

    async fn health_check() -> &'static str {
        "OK"
    }

    let router = Router::new()
        .route("/health", get(health_check))
        .nest_service("/mcp", mcp_service);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    let serve_future = axum::serve(listener, router);
    tokio::select! {
        result = serve_future => result?,
        _ = tokio::signal::ctrl_c() => ct.cancel(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn settings_for(cache_root: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.cache_root = cache_root.to_path_buf();
        settings
    }

    #[tokio::test]
    async fn get_server_status_answers_before_any_project_is_open() {
        let server = IndexServer::new(Settings::default());
        let result = server
            .get_server_status(Parameters(GetServerStatusRequest {}))
            .await
            .unwrap();
        assert!(!result.is_error.unwrap_or(false));
    }

    #[tokio::test]
    async fn queries_before_set_project_directory_report_not_ready() {
        let server = IndexServer::new(Settings::default());
        let result = server
            .search_symbols(Parameters(SearchSymbolsRequest {
                pattern: "foo".to_string(),
                project_only: false,
                class_name: None,
                kinds: None,
                file: None,
            }))
            .await
            .unwrap();
        assert!(result.is_error.unwrap_or(false));
    }

    #[tokio::test]
    async fn set_project_directory_on_an_empty_tree_reports_zero_files() {
        // No source files means no worker dispatch at all, so this is
        // exercisable without a libclang runtime present.
        let project = tempdir().unwrap();
        let cache = tempdir().unwrap();

        let server = IndexServer::new(settings_for(cache.path()));
        let result = server
            .set_project_directory(Parameters(SetProjectDirectoryRequest {
                project_path: project.path().display().to_string(),
                config_file: None,
                auto_refresh: false,
            }))
            .await
            .unwrap();
        assert!(!result.is_error.unwrap_or(false));

        let status = server
            .get_server_status(Parameters(GetServerStatusRequest {}))
            .await
            .unwrap();
        assert!(!status.is_error.unwrap_or(false));
    }
}
