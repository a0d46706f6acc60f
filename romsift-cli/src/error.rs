use std::path::PathBuf;

use thiserror::Error;

use romsift_lib::{ConfigLoadError, PipelineError};

/// Errors that can occur during CLI command execution.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// Config file could not be read or is invalid
    #[error("{}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: ConfigLoadError,
    },

    /// Selection, organize or vacuum failed
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Log file could not be opened
    #[error("Cannot open log file {}: {source}", .path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Runtime creation or async error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Some machines or directories could not be processed
    #[error("{0} failure(s)")]
    Failed(usize),

    /// Interrupted by the user
    #[error("Cancelled")]
    Cancelled,

    /// JSON encoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub(crate) fn config(path: impl Into<PathBuf>, source: ConfigLoadError) -> Self {
        Self::Config {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }
}
