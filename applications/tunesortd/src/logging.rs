//! Console and log-file tracing setup

use crate::error::{DaemonError, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "tunesortd=info,tunesort_router=info";

/// Install the global subscriber: colored console output plus plain lines
/// appended to `log_file`
pub fn init(log_file: &Path) -> Result<()> {
    if let Some(parent) = log_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false) // No color codes in file
        .with_target(true);

    let console_layer = fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| DaemonError::Config(format!("Failed to initialize logging: {}", e)))?;

    tracing::info!("Logging to {}", log_file.display());
    Ok(())
}
