//! Logging for the procurement CLI.
//!
//! Everything goes to stderr and to a daily file under
//! `<data dir>/procurement-assistant/logs/assistant.log`. Stdout carries only
//! answers, so `ask --json` output can be piped straight into `jq`.
//! Verbosity comes from `RUST_LOG`, then `PROCURE_LOG_LEVEL`, then `info`.

use std::path::{Path, PathBuf};
use std::sync::{Once, OnceLock};

use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_TARGET: &str = "procurement";
const LOG_FILE: &str = "assistant.log";

static INIT_LOGGING: Once = Once::new();
/// Keeps the file writer flushing until the process exits.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn log_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("procurement-assistant")
        .join("logs")
}

/// `PROCURE_LOG_LEVEL` if it holds something, else `info`.
fn fallback_directive(level: Option<String>) -> String {
    level
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "info".to_string())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_directive(std::env::var("PROCURE_LOG_LEVEL").ok())))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn file_appender(dir: &Path) -> Option<RollingFileAppender> {
    match std::fs::create_dir_all(dir) {
        Ok(()) => Some(RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE)),
        Err(err) => {
            eprintln!("[{}][WARN] cannot create log directory {}: {}", LOG_TARGET, dir.display(), err);
            None
        }
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let dir = log_dir();
        let file_layer = file_appender(&dir).map(|appender| {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            LOG_GUARD.set(guard).ok();
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(writer)
        });
        let has_file = file_layer.is_some();

        let console_layer = fmt::layer()
            .with_target(true)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(std::io::stderr);

        // Option<Layer> is itself a layer; None adds nothing
        tracing_subscriber::registry()
            .with(env_filter())
            .with(console_layer)
            .with(file_layer)
            .init();

        if has_file {
            backend_info(format!("Logging to stderr and {}", dir.join(LOG_FILE).display()));
        } else {
            backend_warn("Logging to stderr only");
        }
    });
}

pub fn backend_info(message: impl AsRef<str>) {
    info!(target: LOG_TARGET, "{}", message.as_ref());
}

pub fn backend_warn(message: impl AsRef<str>) {
    warn!(target: LOG_TARGET, "{}", message.as_ref());
}

pub fn backend_error(message: impl AsRef<str>) {
    error!(target: LOG_TARGET, "{}", message.as_ref());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_falls_back_to_info() {
        assert_eq!(fallback_directive(None), "info");
        assert_eq!(fallback_directive(Some("  ".into())), "info");
        assert_eq!(fallback_directive(Some(" debug ".into())), "debug");
    }

    #[test]
    fn log_dir_is_namespaced() {
        assert!(log_dir().ends_with("procurement-assistant/logs"));
    }
}
