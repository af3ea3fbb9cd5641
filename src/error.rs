use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SyncError {
    #[error("invalid snapshot directory name: {0}")]
    InvalidDateTag(String),

    #[error("invalid checksum record: {0:?}")]
    InvalidChecksum(String),

    #[error("NCBI request failed: {0}")]
    Http(String),

    #[error("NCBI returned status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read {path} for checksum: {message}")]
    ChecksumRead { path: PathBuf, message: String },

    #[error(
        "checksum still mismatched after {attempts} download attempts; failed attempts {}: {}",
        attempt_disposition(.removed),
        .directories.join(", ")
    )]
    Integrity {
        attempts: u32,
        directories: Vec<String>,
        removed: bool,
    },

    #[error("failed to extract {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("{tool} failed: {message}")]
    ExternalTool { tool: String, message: String },

    #[error("malformed FASTA in {path}: {message}")]
    InvalidFasta { path: PathBuf, message: String },

    #[error("database dump produced no output at {0}")]
    EmptyDump(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("invalid config file at {path}: {message}")]
    #[diagnostic(help(
        "fix the config file or pass both --directory and --log-directory to rewrite it"
    ))]
    InvalidConfig { path: PathBuf, message: String },

    #[error("failed to write config file at {0}")]
    ConfigWrite(PathBuf),
}

fn attempt_disposition(removed: &bool) -> &'static str {
    if *removed { "removed" } else { "kept in" }
}
