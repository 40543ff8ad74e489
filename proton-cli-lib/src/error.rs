//! Error types for proton-cli

use std::path::{Path, PathBuf};
use thiserror::Error;

/// proton-cli result type
pub type Result<T> = std::result::Result<T, ProtonCliError>;

/// Main error type for proton-cli operations
#[derive(Error, Debug)]
pub enum ProtonCliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Proton is not configured. Run 'proton-cli check' or 'proton-cli pull-proton' first")]
    NotConfigured,

    #[error("Prefix '{0}' not found")]
    PrefixNotFound(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("No release asset ending in '{0}' found")]
    AssetNotFound(String),

    #[error("'{0}' already exists")]
    AlreadyExists(String),

    #[error("Invalid prefix name: {0:?}")]
    InvalidPrefixName(String),

    #[error("Permission denied: {} ({hint})", path.display())]
    PermissionDenied { path: PathBuf, hint: String },

    #[error("Failed to launch {command}: {source}")]
    LaunchFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to initialize prefix '{name}' (exit code: {code:?})")]
    PrefixInit { name: String, code: Option<i32> },

    #[error("Invalid launch options: {0}")]
    InvalidOptions(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: String, got: String },

    #[error("Update error: {0}")]
    Update(String),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProtonCliError {
    /// Attach a path to an I/O error, keeping permission failures distinct.
    pub fn io_at(path: &Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            ProtonCliError::PermissionDenied {
                path: path.to_path_buf(),
                hint: "try running with sudo".into(),
            }
        } else {
            ProtonCliError::Io(err)
        }
    }
}
