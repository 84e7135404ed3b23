//! Structured logging init, grounded in the teacher's `src/logging.rs`:
//! a compact local-time formatter plus `RUST_LOG` taking precedence over
//! the configured default filter.

use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Formats timestamps as `HH:MM:SS.mmm`, matching the teacher's
/// `CompactTime` writer (avoids the default RFC3339 layer's width).
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(CompactTime)
        .with_target(true);

    if config.json {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}

/// Emits a structured event at info level with a stable `event` field,
/// mirroring the teacher's `log_event!` macro for grep-able log lines.
#[macro_export]
macro_rules! log_event {
    ($event:expr, $($field:tt)*) => {
        tracing::info!(event = $event, $($field)*);
    };
}

#[macro_export]
macro_rules! debug_event {
    ($event:expr, $($field:tt)*) => {
        tracing::debug!(event = $event, $($field)*);
    };
}
