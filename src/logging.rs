use std::fs::File;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::error::SyncError;

pub fn log_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("{}.txt", now.format("%Y-%m-%d_%H:%M:%S"))
}

/// Installs the global subscriber: a per-run file under `log_dir`, plus
/// stderr unless the terminal UI owns the screen.
pub fn init(log_dir: &Utf8Path, to_stderr: bool) -> Result<Utf8PathBuf, SyncError> {
    let path = log_dir.join(log_file_name(chrono::Local::now()));
    let file = File::create(path.as_std_path())
        .map_err(|err| SyncError::Filesystem(format!("create log {path}: {err}")))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file));
    let stderr_layer = to_stderr.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;
    Ok(path)
}

/// Stderr-only logging for commands that run before directories are known.
pub fn init_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
