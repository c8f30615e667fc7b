//! Error types for resource addressing.

use std::path::PathBuf;

use thiserror::Error;

use crate::key::ResourceKey;

/// Errors raised while resolving, looking up or scanning resources.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// A key failed validation.
    #[error("Invalid resource key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// A path does not lie inside the project folder.
    #[error("Path is not inside the project folder: {path}")]
    OutsideProject { path: PathBuf },

    /// No resource exists for the key.
    #[error("Resource not found: '{key}'")]
    NotFound { key: ResourceKey },

    /// A resource handle from a tree that has since been rebuilt.
    #[error("Resource '{name}' belongs to a previous scan")]
    Stale { name: String },

    /// A resource existed when checked but was gone when used.
    #[error("Resource vanished while resolving: {path}")]
    Vanished { path: PathBuf },

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

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl ResourceError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::Vanished { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create a not-found error.
    pub fn not_found(key: &ResourceKey) -> Self {
        Self::NotFound { key: key.clone() }
    }

    /// Check if this is a soft "does not exist" failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Vanished { .. })
    }
}
