//! Progress & Diagnostics (C12): structured `tracing` spans per indexing
//! phase, a progress-callback trait the coordinator drives between files
//! (mirroring the teacher's `indexing/pipeline/metrics.rs` progress-event
//! shape), and parse-error record writes into the storage backend.
//!
//! Per spec §7's propagation policy, logger failures here are swallowed
//! rather than propagated — a `ProgressSink` is best-effort UI, never a
//! correctness dependency.

use std::path::Path;

use crate::storage::parse_errors::{append, ParseErrorRecord};
use crate::storage::pool::Pool;

/// One indexing-phase progress notification. `total` is `None` when the
/// size of the batch isn't known yet (e.g. before the scan completes).
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    ScanStarted,
    ScanCompleted { candidate_count: usize },
    FileStarted { path: String },
    FileCompleted { path: String, succeeded: bool },
    Finished { files_analyzed: usize, files_removed: usize },
}

/// Callback interface the coordinator drives between files. Implementors
/// must tolerate being called after whatever they report to has gone
/// away (spec §5 "diagnostics logger must tolerate being called after
/// its sink has been closed") — callers never propagate a sink error.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

/// A sink that discards every event, used by callers that don't need
/// progress reporting (tests, the CLI's `--quiet` mode).
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn on_progress(&self, _event: ProgressEvent) {}
}

/// A sink that emits one structured `tracing` event per progress
/// notification, following the teacher's `log_event!` convention of a
/// stable `event` field for grep-able log lines.
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::ScanStarted => {
                crate::log_event!("scan_started",);
            }
            ProgressEvent::ScanCompleted { candidate_count } => {
                crate::log_event!("scan_completed", candidate_count);
            }
            ProgressEvent::FileStarted { path } => {
                crate::debug_event!("file_started", path);
            }
            ProgressEvent::FileCompleted { path, succeeded } => {
                crate::debug_event!("file_completed", path, succeeded);
            }
            ProgressEvent::Finished {
                files_analyzed,
                files_removed,
            } => {
                crate::log_event!("refresh_finished", files_analyzed, files_removed);
            }
        }
    }
}

/// Notifies `sink` without letting a panicking or misbehaving
/// implementation abort the caller — best-effort only, per spec §5/§7.
pub fn notify(sink: &dyn ProgressSink, event: ProgressEvent) {
    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink.on_progress(event)));
}

/// Writes one `PARSE_FAILURE` record into the append-only log, swallowing
/// the write if storage itself is unavailable (a failing diagnostics path
/// must never turn a per-file failure into a coordinator-level one).
#[allow(clippy::too_many_arguments)]
pub fn record_parse_failure(
    pool: &Pool,
    file: &Path,
    message: &str,
    file_hash: Option<&str>,
    args_hash: Option<&str>,
    retry_count: i64,
    now: i64,
) {
    let file_str = file.to_string_lossy();
    let result = pool.with_writer(|conn| {
        append(
            conn,
            &ParseErrorRecord {
                file: &file_str,
                error_kind: "PARSE_FAILURE",
                message,
                stacktrace: None,
                file_hash,
                args_hash,
                retry_count,
                timestamp: now,
            },
        )
    });
    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_swallows_a_panicking_sink() {
        struct Panics;
        impl ProgressSink for Panics {
            fn on_progress(&self, _event: ProgressEvent) {
                panic!("sink closed");
            }
        }
        notify(&Panics, ProgressEvent::ScanStarted);
    }

    #[test]
    fn noop_sink_accepts_every_event_variant() {
        let sink = NoopProgressSink;
        notify(&sink, ProgressEvent::ScanStarted);
        notify(&sink, ProgressEvent::Finished { files_analyzed: 1, files_removed: 0 });
    }
}
