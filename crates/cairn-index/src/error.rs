//! Error types for the index crate.

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A mutation or commit was attempted outside a transaction.
    #[error("no index transaction in progress")]
    NoTransaction,

    /// `begin` was called while a transaction was already open.
    #[error("index transaction already in progress")]
    TransactionActive,

    /// The document cannot be indexed.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Backend-specific failure.
    #[error("index backend error: {0}")]
    Backend(String),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
