//! Shared logging utilities for TagSync binaries.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "tagsync=info";

/// Logging configuration shared by TagSync binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    pub quiet: bool,
    /// Directory for the daily rolling log file. `None` disables file logging.
    pub log_dir: Option<PathBuf>,
}

/// Keeps the non-blocking file writer alive; drop it last in `main`.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize tracing with stderr output and an optional daily rolling file.
///
/// `RUST_LOG` overrides the file filter. The console filter follows the
/// verbosity flags unless `RUST_LOG` is set.
pub fn init_logging(config: LogConfig<'_>) -> Result<LogGuard> {
    let env_override = std::env::var("RUST_LOG").ok();

    let file_filter = env_override
        .as_deref()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = env_override
        .as_deref()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(console_directive(config.verbose, config.quiet)));

    let mut guard = None;
    let file_layer = match config.log_dir.as_ref() {
        Some(dir) => match ensure_log_dir(dir) {
            Ok(dir) => {
                let appender =
                    tracing_appender::rolling::daily(dir, format!("{}.log", sanitize_name(config.app_name)));
                let (writer, worker) = tracing_appender::non_blocking(appender);
                guard = Some(worker);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_filter(file_filter),
                )
            }
            Err(err) => {
                eprintln!("Warning: {:#}", err);
                None
            }
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuard { _file: guard })
}

/// Console filter directive for the given verbosity flags. Quiet wins.
pub fn console_directive(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "warn"
    } else if verbose {
        "tagsync=debug,warn"
    } else {
        "tagsync=info,warn"
    }
}

/// Ensure the logs directory exists.
pub fn ensure_log_dir(dir: &PathBuf) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir.clone())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_overrides_verbose() {
        assert_eq!(console_directive(true, true), "warn");
        assert_eq!(console_directive(false, true), "warn");
    }

    #[test]
    fn verbose_enables_debug_for_tagsync() {
        assert!(console_directive(true, false).contains("tagsync=debug"));
        assert!(console_directive(false, false).contains("tagsync=info"));
    }

    #[test]
    fn sanitize_replaces_path_separators() {
        assert_eq!(sanitize_name("tag/sync v1"), "tag_sync_v1");
        assert_eq!(sanitize_name("tagsync-cli_2"), "tagsync-cli_2");
    }

    #[test]
    fn ensure_log_dir_creates_nested_directories() {
        let temp = tempfile::TempDir::new().unwrap();
        let nested = temp.path().join("a").join("logs");
        let created = ensure_log_dir(&nested).unwrap();
        assert!(created.is_dir());
    }
}
