use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Workspace crate targets that should receive log output.
const CRATE_TARGETS: &[&str] = &[
    "habistat",
    "habistat_core",
    "habistat_algorithms",
    "habistat_tiling",
    "habistat_pipeline",
];

/// Initialize tracing.
///
/// Events at `info` (`debug` with `--verbose`) go to the append-only log
/// file when one is given. The terminal only shows warnings and errors
/// unless verbose, so the progress bar stays readable.
///
/// `RUST_LOG` overrides the default filter if set.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let default_filter = CRATE_TARGETS
        .iter()
        .map(|t| format!("{t}={level}"))
        .collect::<Vec<_>>()
        .join(",");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let terminal = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(if verbose { LevelFilter::DEBUG } else { LevelFilter::WARN });

    let file = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(terminal)
        .with(file)
        .try_init()
        .context("Failed to install log subscriber")
}
