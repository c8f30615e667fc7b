//! Error types for file operations.

use std::path::PathBuf;

use thiserror::Error;

use projectfs_core::{ResourceError, ResourceKey};

/// Errors raised by the operation engine.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Key or path resolution failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// The project root itself cannot be created, copied, moved or deleted.
    #[error("Cannot operate on the project root")]
    ProjectRoot,

    /// The key points into the project metadata folder.
    #[error("'{key}' is reserved for project metadata")]
    Reserved { key: ResourceKey },

    /// The source of an operation does not exist.
    #[error("Source does not exist: '{key}'")]
    SourceMissing { key: ResourceKey },

    /// The source exists but is the wrong kind of resource.
    #[error("Expected a {expected} at '{key}'")]
    WrongKind {
        key: ResourceKey,
        expected: &'static str,
    },

    /// The destination is already taken.
    #[error("Destination already exists: '{key}'")]
    DestinationExists { key: ResourceKey },

    /// An ancestor of the destination is a file.
    #[error("Parent of '{key}' is not a folder")]
    ParentNotFolder { key: ResourceKey },

    /// A folder would be copied or moved into itself.
    #[error("Cannot place '{from}' inside itself at '{to}'")]
    DestinationInsideSource { from: ResourceKey, to: ResourceKey },

    /// Undo and redo are unavailable while a batch is open.
    #[error("A batch is open; commit it first")]
    BatchOpen,

    /// Content expected in the trash is gone.
    #[error("Trash entry is missing: {path}")]
    TrashMissing { path: PathBuf },

    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocking worker panicked or was cancelled.
    #[error("Task failed: {0}")]
    TaskFailed(String),
}

impl OperationError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }

    /// Check if the operation was rejected before touching the disk.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Resource(_)
                | Self::ProjectRoot
                | Self::Reserved { .. }
                | Self::SourceMissing { .. }
                | Self::WrongKind { .. }
                | Self::DestinationExists { .. }
                | Self::ParentNotFolder { .. }
                | Self::DestinationInsideSource { .. }
                | Self::BatchOpen
        )
    }
}
