use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown entity kind: {0}")]
    UnknownKind(String),

    #[error("property {key} is not a {expected}")]
    PropertyType { key: String, expected: &'static str },
}
