//! File logging for the orcai binary.
//!
//! The terminal belongs to the proxied shell, so nothing is logged to stdout or stderr.
//! Events go to `~/.orcai/logs/orcai.log.<date>` through a non-blocking writer.

use orcai_core::StoragePaths;
use std::env;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "orcai.log";
const DEBUG_ENV: &str = "ORCAI_DEBUG_LOG";

/// Installs the global subscriber. Keep the guard alive until exit or buffered lines are lost.
///
/// Returns `None` (and logs nowhere) when the log directory cannot be created.
pub fn init(paths: &StoragePaths) -> Option<WorkerGuard> {
    let log_dir = paths.logs_dir();
    fs_err::create_dir_all(&log_dir).ok()?;

    let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .ok()?;
    Some(guard)
}

fn log_filter() -> EnvFilter {
    if debug_enabled(env::var(DEBUG_ENV).ok().as_deref()) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn debug_enabled(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "TRUE" | "yes" | "YES"))
}
