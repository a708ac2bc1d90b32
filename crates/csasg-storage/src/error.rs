//! Storage error types for csasg-storage.
//!
//! [`StorageError`] wraps core codec failures and adds the failure modes of
//! the store itself: file-system errors with the offending path, unknown
//! graph names and integrity violations found after loading.

use std::path::PathBuf;

use thiserror::Error;

use csasg_core::CoreError;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The graph codec or the factory rejected the data.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A file-system operation failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No graph is stored under the given name.
    #[error("graph not found: {name}")]
    NotFound { name: String },

    /// The name cannot be used as a graph name.
    #[error("invalid graph name: {name:?}")]
    InvalidName { name: String },

    /// A loaded graph violates a structural invariant.
    #[error("integrity error: {reason}")]
    Integrity { reason: String },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}
