//! Error types for the change monitor.

use std::path::PathBuf;

use thiserror::Error;

use projectfs_core::ResourceError;

use crate::monitor::MonitorState;

/// Errors from monitor operations.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Project folder does not exist: {path}")]
    MissingRoot { path: PathBuf },

    #[error("Monitor is {state}; it can only be initialized once")]
    InvalidState { state: MonitorState },

    #[error("No async runtime available: {reason}")]
    NoRuntime { reason: String },

    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl From<notify::Error> for MonitorError {
    fn from(e: notify::Error) -> Self {
        MonitorError::InitFailed {
            reason: e.to_string(),
        }
    }
}
