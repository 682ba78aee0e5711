//! Logging initialization.
//!
//! - **Production**: JSON logs to daily rolling files plus compact stdout
//!   for the systemd journal
//! - **Development**: pretty stdout only
//!
//! The filter comes from `RUST_LOG` when set, otherwise from
//! `GUARDIAN_LOG_LEVEL`, otherwise `info`.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the fallback filter directive.
pub const LOG_LEVEL_ENV: &str = "GUARDIAN_LOG_LEVEL";

/// Environment variable that selects production logging when set to
/// `production`.
pub const ENVIRONMENT_ENV: &str = "GUARDIAN_ENV";

/// Guards that keep the non-blocking writers flushing for the whole run.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static STDOUT_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Whether production logging was requested through the environment.
#[must_use]
pub fn production_from_env() -> bool {
    std::env::var(ENVIRONMENT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("production"))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter directive cannot be parsed.
pub fn init(is_production: bool) -> anyhow::Result<()> {
    let env_filter = env_filter()?;

    if is_production {
        init_production(env_filter);
    } else {
        init_development(env_filter);
    }

    Ok(())
}

fn env_filter() -> anyhow::Result<EnvFilter> {
    let log_level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());
    Ok(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?)
}

fn init_production(env_filter: EnvFilter) {
    let log_dir = log_directory();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("cannot create log directory {}: {e}", log_dir.display());
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "guardian");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
    let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking_file)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // journald adds its own timestamps and does not render ANSI.
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_stdout)
        .with_target(true)
        .without_time()
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);
}

fn init_development(env_filter: EnvFilter) {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();
}

/// Directory for rolling log files on this platform.
fn log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/guardian")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "guardian")
            .map(|dirs| dirs.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("./logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_is_valid_path() {
        let dir = log_directory();
        assert!(!dir.as_os_str().is_empty());
        assert!(dir.to_string_lossy().contains("guardian") || dir.ends_with("logs"));
    }

    #[test]
    fn test_env_filter_parses_default() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("guardian_core=debug,tower_http=warn").is_ok());
    }
}
