//! Incremental Coordinator (C9, spec §4.9): consumes a changeset, computes
//! the re-analysis set under the exact priority/cascade order the spec
//! states matters, dispatches to the worker pool, and applies every
//! completed result atomically under the single write lock.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::change_scanner;
use crate::compile_commands::CompileCommands;
use crate::config::Settings;
use crate::diagnostics::{notify, ProgressEvent, ProgressSink};
use crate::error::IndexResult;
use crate::identity::ProjectIdentity;
use crate::lifecycle::{Lifecycle, State};
use crate::parsing::ParseTask;
use crate::storage::dependency_graph::{self, IncludeEdge};
use crate::storage::{call_sites, file_metadata, header_tracker, metadata, parse_errors, symbols};
use crate::storage::Store;
use crate::types::FileId;
use crate::worker_pool::{TaskOutcome, WorkerPool};

/// A worker that crashes mid-task is retried up to this many times before
/// its file is given up on for this refresh (spec §7 `WORKER_CRASHED`).
const MAX_WORKER_RETRIES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    Full,
    Incremental,
    Resume,
}

impl RefreshMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
            Self::Resume => "resume",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RefreshChanges {
    pub compile_commands: bool,
    pub added: usize,
    pub modified: usize,
    pub modified_headers: usize,
    pub removed: usize,
}

#[derive(Debug, Clone)]
pub struct RefreshReport {
    pub mode: RefreshMode,
    pub files_analyzed: usize,
    pub files_removed: usize,
    pub elapsed_s: f64,
    pub changes: RefreshChanges,
}

/// Ties together every leaf component (C1-C8, C11, C12) for one project
/// identity: owns the store, the lifecycle, and the settings that shape
/// how a refresh scans and dispatches work.
pub struct Coordinator {
    identity: ProjectIdentity,
    store: Arc<Store>,
    settings: Settings,
    lifecycle: Arc<Lifecycle>,
    cancelled: Arc<AtomicBool>,
    worker_binary: PathBuf,
}

impl Clone for Coordinator {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            store: Arc::clone(&self.store),
            settings: self.settings.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
            cancelled: Arc::clone(&self.cancelled),
            worker_binary: self.worker_binary.clone(),
        }
    }
}

impl Coordinator {
    /// Resolves the project identity, opens (or creates) its store, and
    /// leaves the lifecycle at `Initializing`. Call `set_project_directory`
    /// next to perform the first index.
    pub fn open(
        source_root: &Path,
        config_path: Option<&Path>,
        settings: Settings,
        worker_binary: PathBuf,
    ) -> IndexResult<Self> {
        let identity = ProjectIdentity::resolve(source_root, config_path)?;
        let cache_dir = identity.cache_dir(&settings.cache_root);
        let db_path = cache_dir.join("index.db");
        let store = Store::open(&db_path)?;

        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.transition(State::Initializing)?;

        Ok(Self {
            identity,
            store: Arc::new(store),
            settings,
            lifecycle,
            cancelled: Arc::new(AtomicBool::new(false)),
            worker_binary,
        })
    }

    pub fn identity(&self) -> &ProjectIdentity {
        &self.identity
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn compile_commands_path(&self) -> PathBuf {
        let configured = &self.settings.indexing.compile_commands;
        if configured.is_absolute() {
            configured.clone()
        } else {
            self.identity.source_root.join(configured)
        }
    }

    /// First index of the project: `set_project_directory`'s behavior in
    /// spec §6. The mode reported to the caller distinguishes a genuinely
    /// empty cache (`Full`) from a pre-existing, unchanged one (`Resume`)
    /// from one with real work to do (`Incremental`).
    pub fn set_project_directory(&self, progress: &dyn ProgressSink) -> IndexResult<RefreshReport> {
        let was_fresh = self.store.indexed_file_count()? == 0;
        self.lifecycle.transition(State::Indexing)?;

        let result = self.refresh_internal(progress);
        match &result {
            Ok(_) => self.lifecycle.transition(State::Indexed)?,
            Err(_) => {
                let _ = self.lifecycle.transition(State::Failed);
            }
        }

        let mut report = result?;
        report.mode = if was_fresh {
            RefreshMode::Full
        } else if report.changes_are_empty() {
            RefreshMode::Resume
        } else {
            RefreshMode::Incremental
        };
        Ok(report)
    }

    /// Client-triggered incremental refresh (spec §6 `refresh_project`).
    /// `force_full` wipes every file-scoped table first so the next scan
    /// reports the entire tree as `added`.
    pub fn refresh_project(
        &self,
        force_full: bool,
        progress: &dyn ProgressSink,
    ) -> IndexResult<RefreshReport> {
        // A coordinator freshly opened with `Coordinator::open` sits at
        // `Initializing` even when its on-disk cache already holds a prior
        // index (the CLI's `refresh` subcommand never calls
        // `set_project_directory` first). Resume it to `Indexed` — the same
        // transition `set_project_directory` uses to record a completed
        // first index — before entering `Refreshing`.
        if self.lifecycle.current() == State::Initializing {
            self.lifecycle.transition(State::Indexed)?;
        }
        self.lifecycle.transition(State::Refreshing)?;
        if force_full {
            self.store.clear_all()?;
        }

        let result = self.refresh_internal(progress);
        match &result {
            Ok(_) => self.lifecycle.transition(State::Indexed)?,
            Err(_) => {
                let _ = self.lifecycle.transition(State::Failed);
            }
        }

        let mut report = result?;
        report.mode = if force_full {
            RefreshMode::Full
        } else {
            RefreshMode::Incremental
        };
        Ok(report)
    }

    fn refresh_internal(&self, progress: &dyn ProgressSink) -> IndexResult<RefreshReport> {
        let start = std::time::Instant::now();
        notify(progress, ProgressEvent::ScanStarted);

        let compile_commands_path = self.compile_commands_path();
        let commands = CompileCommands::load(&compile_commands_path);

        let changeset = change_scanner::scan(
            self.store.pool(),
            &self.identity.source_root,
            &self.settings.indexing,
            &compile_commands_path,
        )?;
        notify(
            progress,
            ProgressEvent::ScanCompleted {
                candidate_count: changeset.added.len() + changeset.modified.len(),
            },
        );

        let changes = RefreshChanges {
            compile_commands: changeset.compile_commands_changed,
            added: changeset.added.len(),
            modified: changeset.modified.len(),
            modified_headers: changeset.modified_headers.len(),
            removed: changeset.removed.len(),
        };

        let mut reparse: HashSet<PathBuf> = HashSet::new();

        // Step 1: compile_commands_changed.
        if changeset.compile_commands_changed {
            let delta = self.compile_args_delta(&commands)?;
            self.store.pool().with_writer(header_tracker::clear_all)?;
            reparse.extend(delta);
        }

        // Step 2: modified headers cascade to every transitive dependent.
        for header in &changeset.modified_headers {
            let dependents = {
                let reader = self.store.pool().reader()?;
                dependency_graph::find_transitive_dependents(&reader, header)?
            };
            reparse.extend(dependents.into_iter().map(PathBuf::from));
            self.store
                .pool()
                .with_writer(|conn| header_tracker::invalidate(conn, header))?;
        }

        // Step 3: modified sources.
        reparse.extend(changeset.modified.iter().cloned());

        // Step 4: added files.
        reparse.extend(changeset.added.iter().cloned());

        let files_analyzed =
            self.execute_reparse(reparse.into_iter().collect(), &commands, progress)?;

        // Step 5: removed files.
        let mut files_removed = 0;
        for removed in &changeset.removed {
            if self.cancelled.load(Ordering::SeqCst) {
                break;
            }
            self.store.remove_file(&removed.to_string_lossy())?;
            files_removed += 1;
        }

        let finished_at = now_unix();
        self.store.pool().with_writer(|conn| {
            if let Some(hash) = CompileCommands::file_hash(&compile_commands_path) {
                metadata::set(conn, metadata::KEY_LAST_COMPILE_COMMANDS_HASH, &hash)?;
            }
            metadata::set(conn, metadata::KEY_LAST_REFRESH_AT, &finished_at.to_string())?;
            Ok(())
        })?;
        self.store
            .maybe_vacuum(self.settings.indexing.vacuum_every_n_updates)?;

        notify(
            progress,
            ProgressEvent::Finished {
                files_analyzed,
                files_removed,
            },
        );

        Ok(RefreshReport {
            mode: RefreshMode::Incremental,
            files_analyzed,
            files_removed,
            elapsed_s: start.elapsed().as_secs_f64(),
            changes,
        })
    }

    /// Approximates spec §4.9 step 1's "diff old vs new per-file arguments"
    /// without keeping a second full `CompileCommands` snapshot on disk: a
    /// file's args are considered changed when the hash of its freshly
    /// resolved argument vector no longer matches the hash already stored
    /// in `file_metadata` for that path (see DESIGN.md).
    fn compile_args_delta(&self, commands: &CompileCommands) -> IndexResult<Vec<PathBuf>> {
        let reader = self.store.pool().reader()?;
        let existing = file_metadata::all(&reader)?;
        drop(reader);

        let mut changed = Vec::new();
        for meta in existing {
            let path = PathBuf::from(&meta.path);
            if !path.exists() {
                continue;
            }
            let args = commands
                .args_for(&path)
                .map(<[String]>::to_vec)
                .unwrap_or_else(|| self.settings.indexing.default_args.clone());
            let new_hash = CompileCommands::hash(&args);
            if meta.args_hash.as_deref() != Some(new_hash.as_str()) {
                changed.push(path);
            }
        }
        Ok(changed)
    }

    /// Dispatches `pending` across the worker pool, applying each result as
    /// it completes and retrying crashed tasks up to `MAX_WORKER_RETRIES`.
    fn execute_reparse(
        &self,
        mut pending: Vec<PathBuf>,
        commands: &CompileCommands,
        progress: &dyn ProgressSink,
    ) -> IndexResult<usize> {
        let pool = WorkerPool::new(self.worker_binary.clone(), self.settings.worker_pool_size());
        let mut analyzed = 0usize;
        let mut attempt = 0u32;

        loop {
            if pending.is_empty() || self.cancelled.load(Ordering::SeqCst) {
                break;
            }

            let tasks: Vec<ParseTask> = pending
                .iter()
                .map(|file| ParseTask {
                    file: file.clone(),
                    args: commands
                        .args_for(file)
                        .map(<[String]>::to_vec)
                        .unwrap_or_else(|| self.settings.indexing.default_args.clone()),
                    project_root: self.identity.source_root.clone(),
                })
                .collect();

            let cancelled = Arc::clone(&self.cancelled);
            let outcomes = pool.run_batch(tasks, &move || cancelled.load(Ordering::SeqCst))?;

            let mut retry = Vec::new();
            for (task, outcome) in outcomes {
                notify(
                    progress,
                    ProgressEvent::FileStarted {
                        path: task.file.display().to_string(),
                    },
                );
                match outcome {
                    TaskOutcome::Parsed(batch) => {
                        let args_hash = CompileCommands::hash(&task.args);
                        self.apply_parsed_batch(&task.file, batch, Some(args_hash))?;
                        analyzed += 1;
                        notify(
                            progress,
                            ProgressEvent::FileCompleted { path: task.file.display().to_string(), succeeded: true },
                        );
                    }
                    TaskOutcome::ParseFailed(message) => {
                        self.record_failure(&task.file, &message)?;
                        analyzed += 1;
                        notify(
                            progress,
                            ProgressEvent::FileCompleted { path: task.file.display().to_string(), succeeded: false },
                        );
                    }
                    TaskOutcome::Crashed => {
                        if !self.cancelled.load(Ordering::SeqCst) {
                            retry.push(task.file);
                        }
                    }
                }
            }

            if retry.is_empty() {
                break;
            }
            attempt += 1;
            if attempt > MAX_WORKER_RETRIES {
                for file in retry {
                    self.record_failure(&file, "worker pool exhausted its retry budget")?;
                }
                break;
            }
            pending = retry;
        }

        Ok(analyzed)
    }

    /// Records a `PARSE_FAILURE`/`WORKER_CRASHED` outcome for `file` without
    /// touching its previously stored symbols (spec §4.9 "Failure handling":
    /// the prior successful snapshot survives).
    fn record_failure(&self, file: &Path, message: &str) -> IndexResult<()> {
        let now = now_unix();
        let path_str = file.to_string_lossy().into_owned();
        let content_hash = crate::scanner::hash_file(file).unwrap_or_default();

        self.store.pool().with_writer(|conn| {
            let file_id = file_metadata::get_or_create_file_id(conn, &path_str)?;
            let prior = file_metadata::get(conn, &path_str)?;
            let retry_count = prior.as_ref().map(|m| m.retry_count + 1).unwrap_or(1);
            let symbol_count = prior.as_ref().map(|m| m.symbol_count).unwrap_or(0);

            parse_errors::append(
                conn,
                &parse_errors::ParseErrorRecord {
                    file: &path_str,
                    error_kind: "PARSE_FAILURE",
                    message,
                    stacktrace: None,
                    file_hash: Some(content_hash.as_str()),
                    args_hash: None,
                    retry_count,
                    timestamp: now,
                },
            )?;

            file_metadata::upsert(
                conn,
                &path_str,
                file_id,
                &content_hash,
                None,
                now,
                symbol_count,
                false,
                Some(message),
                retry_count,
            )
        })?;
        Ok(())
    }

    /// Applies one parsed translation unit atomically: replaces its own
    /// symbols/call-sites/metadata, resolves header first-win claims under
    /// the write lock (spec §4.9 "conflicts are resolved at apply-time"),
    /// and records the include graph.
    fn apply_parsed_batch(
        &self,
        tu_path: &Path,
        batch: crate::parsing::ParsedBatch,
        args_hash: Option<String>,
    ) -> IndexResult<()> {
        let now = now_unix();
        let tu_path_str = tu_path.to_string_lossy().into_owned();

        // `RawSymbol::into_symbol`/`RawCallSite::into_call_site` take an
        // infallible `FnMut(&Path) -> FileId`, so every path they might ask
        // for is resolved to a surrogate id up front, in one fallible pass,
        // rather than threaded through a closure that can itself fail.
        let mut referenced: HashSet<PathBuf> = HashSet::new();
        referenced.insert(tu_path.to_path_buf());
        collect_referenced_paths(&batch.tu, &mut referenced);
        for header in &batch.headers {
            referenced.insert(header.file.clone());
            collect_referenced_paths(header, &mut referenced);
        }
        for include in &batch.includes {
            referenced.insert(include.source_file.clone());
            referenced.insert(include.included_file.clone());
        }

        self.store.pool().with_writer(|conn| {
            header_tracker::clear_owned_by(conn, &tu_path_str)?;

            let mut ids: HashMap<PathBuf, FileId> = HashMap::new();
            for path in &referenced {
                let id = file_metadata::get_or_create_file_id(conn, &path.to_string_lossy())?;
                ids.insert(path.clone(), id);
            }
            let resolve = |p: &Path| *ids.get(p).expect("path pre-resolved above");

            let tu_file_id = resolve(tu_path);
            symbols::delete_by_file(conn, tu_file_id)?;
            call_sites::delete_by_file(conn, tu_file_id)?;

            for raw in &batch.tu.symbols {
                let symbol = raw.clone().into_symbol(resolve, now);
                symbols::upsert_definition_wins(conn, &symbol, now)?;
            }
            for raw in &batch.tu.call_sites {
                let call = raw.clone().into_call_site(resolve);
                call_sites::insert(conn, &call)?;
            }

            file_metadata::upsert(
                conn,
                &tu_path_str,
                tu_file_id,
                &batch.tu.content_hash,
                args_hash.as_deref(),
                now,
                batch.tu.symbols.len() as i64,
                true,
                None,
                0,
            )?;

            for record in &batch.errors {
                parse_errors::append(
                    conn,
                    &parse_errors::ParseErrorRecord {
                        file: &tu_path_str,
                        error_kind: &record.error_kind,
                        message: &record.message,
                        stacktrace: record.stacktrace.as_deref(),
                        file_hash: Some(batch.tu.content_hash.as_str()),
                        args_hash: args_hash.as_deref(),
                        retry_count: 0,
                        timestamp: now,
                    },
                )?;
            }

            for header in &batch.headers {
                let header_path_str = header.file.to_string_lossy().into_owned();
                let claimed = header_tracker::try_claim(
                    conn,
                    &header_path_str,
                    &tu_path_str,
                    &header.content_hash,
                    args_hash.as_deref(),
                    now,
                )?;
                if !claimed {
                    continue;
                }
                let header_file_id = resolve(&header.file);
                symbols::delete_by_file(conn, header_file_id)?;
                call_sites::delete_by_file(conn, header_file_id)?;
                for raw in &header.symbols {
                    let symbol = raw.clone().into_symbol(resolve, now);
                    symbols::upsert_definition_wins(conn, &symbol, now)?;
                }
                for raw in &header.call_sites {
                    let call = raw.clone().into_call_site(resolve);
                    call_sites::insert(conn, &call)?;
                }
            }

            let mut by_source: HashMap<PathBuf, Vec<IncludeEdge>> = HashMap::new();
            by_source.entry(tu_path.to_path_buf()).or_default();
            for include in &batch.includes {
                by_source
                    .entry(include.source_file.clone())
                    .or_default()
                    .push(IncludeEdge {
                        included_file: include.included_file.to_string_lossy().into_owned(),
                        is_direct: include.is_direct,
                        include_depth: include.depth,
                    });
            }
            for (source, edges) in by_source {
                dependency_graph::update(conn, &source.to_string_lossy(), &edges, now)?;
            }

            metadata::increment_updates_since_vacuum(conn)?;
            Ok(())
        })?;

        Ok(())
    }
}

impl RefreshChanges {
    fn is_empty(&self) -> bool {
        !self.compile_commands
            && self.added == 0
            && self.modified == 0
            && self.modified_headers == 0
            && self.removed == 0
    }
}

impl RefreshReport {
    fn changes_are_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Adds every path a group's symbols/call-sites may reference (its own
/// file plus any declaration-site file) to `out`.
fn collect_referenced_paths(group: &crate::parsing::ParsedFileGroup, out: &mut HashSet<PathBuf>) {
    out.insert(group.file.clone());
    for symbol in &group.symbols {
        out.insert(symbol.file.clone());
        if let Some(decl) = &symbol.declaration_file {
            out.insert(decl.clone());
        }
    }
    for call in &group.call_sites {
        out.insert(call.file.clone());
    }
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
