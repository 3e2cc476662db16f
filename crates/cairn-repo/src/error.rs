use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("no entity with uuid {0}")]
    EntityNotFoundByUuid(Uuid),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("entity has no path")]
    MissingPath,

    #[error("cannot unserialize entity at {path}: {reason}")]
    Unserialization { path: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("target already exists: {0}")]
    TargetExists(String),

    #[error("transactions are implicit; call commit() or rollback() instead of begin()")]
    BeginUnsupported,

    #[error("unsupported cache: {0}")]
    UnsupportedCache(String),

    #[error("commit hook {hook} failed: {reason}")]
    Hook { hook: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Storage(#[from] cairn_store::StoreError),

    #[error("cache error: {0}")]
    Cache(#[from] cairn_cache::CacheError),

    #[error("index error: {0}")]
    Index(#[from] cairn_index::IndexError),

    #[error("path error: {0}")]
    Path(#[from] cairn_path::PathError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepoError {
    /// Whether this error only says that something does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EntityNotFound(_) | Self::EntityNotFoundByUuid(_) | Self::ResourceNotFound(_)
        )
    }

    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

pub type RepoResult<T> = Result<T, RepoError>;
