/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache cannot hold this kind of value.
    #[error("cache does not support {0} values")]
    UnsupportedValue(&'static str),

    /// The key exceeds the backend's limit.
    #[error("cache key of {len} bytes exceeds maximum of {max}")]
    KeyTooLong { len: usize, max: usize },

    /// Backend-specific failure.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
