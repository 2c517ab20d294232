use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::WanderConfig;

const DEFAULT_FILTER: &str = "info,wander_core=debug,wander_ai=debug,wander_engine=debug";

/// Filter directive for a configured `log_level`. Blank or `info` keeps the
/// engine crates at debug; anything else is used as given.
pub fn filter_directive(log_level: &str) -> String {
    match log_level.trim() {
        "" | "info" => DEFAULT_FILTER.to_string(),
        level => level.to_string(),
    }
}

/// Initializes file + console logging for the host process. `RUST_LOG`
/// overrides the configured `log_level`.
/// The returned guard must stay alive for as long as logs should flush.
pub fn init_logging(config: &WanderConfig) -> Result<WorkerGuard> {
    let logs_dir = WanderConfig::logs_dir()?;
    std::fs::create_dir_all(&logs_dir)?;

    let file_appender = tracing_appender::rolling::daily(&logs_dir, "wander");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&config.log_level)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(non_blocking),
        )
        .with(fmt::layer().with_target(false).compact())
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    Ok(guard)
}

/// File-only logging into `logs_dir` with an explicit filter.
/// For tests and hosts that manage their own log location.
pub fn init_logging_to_dir(logs_dir: &std::path::Path, filter: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, "wander");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_to_dir_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let logs_dir = tmp.path().join("nested").join("logs");
        assert!(!logs_dir.exists());

        // The global subscriber can only be installed once per process, so a
        // second test may get an error here; the directory is created either way.
        let result = init_logging_to_dir(&logs_dir, "warn");
        assert!(logs_dir.exists());

        if let Err(e) = result {
            assert!(e.to_string().contains("logging"), "unexpected error: {e}");
        }
    }

    #[test]
    fn configured_level_becomes_the_filter() {
        assert_eq!(filter_directive("info"), DEFAULT_FILTER);
        assert_eq!(filter_directive("  "), DEFAULT_FILTER);
        assert_eq!(filter_directive("warn"), "warn");
        assert_eq!(
            filter_directive("debug,wander_ai=trace"),
            "debug,wander_ai=trace"
        );
    }
}
