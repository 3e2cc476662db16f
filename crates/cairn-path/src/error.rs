/// Errors from path validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// The path differs from its sanitized form.
    #[error("path {path:?} is not canonical (expected {expected:?})")]
    NotCanonical { path: String, expected: String },

    /// An empty string was given where a path was required.
    #[error("empty path")]
    Empty,

    /// A single path component (e.g. a resource name) is unusable.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },
}

/// Result alias for path operations.
pub type PathResult<T> = Result<T, PathError>;
