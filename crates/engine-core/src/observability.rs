//! Logging bootstrap: env-filter driven, JSON-lines to a file when
//! `SKELET0WN_JSON_LOG_PATH` is set, compact console output otherwise. Call
//! once per process.

use std::env;

use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

static GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Initialize the global `tracing` subscriber. Idempotent: later calls are
/// no-ops.
pub fn init_observability() {
    if GUARD.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_env("SKELET0WN_LOG")
        .or_else(|_| EnvFilter::try_new("info"))
        .expect("default env-filter directive must parse");

    if let Ok(path) = env::var("SKELET0WN_JSON_LOG_PATH") {
        let path = std::path::PathBuf::from(path);
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let file_name = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("skelet0wn.log"));
        let file_appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = GUARD.set(guard);

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(non_blocking)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).compact().init();
    }
}
