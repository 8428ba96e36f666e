//! Logging/tracing setup shared by the daemon binary.

use std::path::Path;

use tracing_subscriber::fmt::format::FmtSpan;

use crate::config::LogLevel;

/// Installs the global tracing subscriber. Mirrors the teacher's
/// `tracing_subscriber::fmt()` builder in `daemon/src/main.rs`: compact,
/// ANSI, thread names on, span events off. When `log_path` is set, writes
/// go to a daily-rolling file appender instead of stderr and the guard
/// must be kept alive for the process lifetime.
pub fn init(level: LogLevel, log_path: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let max_level = match level {
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Information => tracing::Level::INFO,
        LogLevel::Warning => tracing::Level::WARN,
        LogLevel::Error => tracing::Level::ERROR,
    };

    match log_path {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("tritedb.log"));
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let subscriber = tracing_subscriber::fmt()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .with_thread_names(true)
                .with_span_events(FmtSpan::NONE)
                .with_max_level(max_level)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
            Some(guard)
        }
        None => {
            let subscriber = tracing_subscriber::fmt()
                .compact()
                .with_ansi(true)
                .with_file(true)
                .with_target(false)
                .with_line_number(true)
                .with_thread_names(true)
                .with_span_events(FmtSpan::NONE)
                .with_max_level(max_level)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
            None
        }
    }
}
