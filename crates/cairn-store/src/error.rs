/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No object exists at the requested path.
    #[error("no object at {0}")]
    NotFound(String),

    /// The path cannot be mapped onto the backend.
    #[error("invalid storage path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure that is not an I/O error.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
