use cairn_store::Mtime;
use cairn_types::Entity;

use crate::error::CacheResult;

/// A detached entity copy together with the storage mtime it was read at.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedEntity {
    pub entity: Entity,
    pub mtime: Mtime,
}

/// A value stored in a [`Cache`].
#[derive(Clone, Debug, PartialEq)]
pub enum CacheItem {
    Text(String),
    Bytes(Vec<u8>),
    /// Composite value; only accepted by caches declaring `object_values`.
    Entity(CachedEntity),
}

impl CacheItem {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Entity(_) => "object",
        }
    }

    pub fn into_entity(self) -> Option<CachedEntity> {
        match self {
            Self::Entity(cached) => Some(cached),
            _ => None,
        }
    }
}

/// What a cache backend can do. Consumers check this once at wiring time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheCapabilities {
    /// Whether [`CacheItem::Entity`] values can be stored.
    pub object_values: bool,
    /// Longest key the backend accepts, if limited.
    pub max_key_length: Option<usize>,
}

impl CacheCapabilities {
    /// Whether keys of `len` bytes are acceptable.
    pub fn accepts_key_length(&self, len: usize) -> bool {
        self.max_key_length.map_or(true, |max| len <= max)
    }
}

/// Shared key/value cache.
///
/// Implementations are shared across requests and must tolerate concurrent
/// use. Entries carry no freshness guarantee; the consumer validates them.
pub trait Cache: Send + Sync {
    fn capabilities(&self) -> CacheCapabilities;

    /// Look up `key`. Returns `Ok(None)` on a miss.
    fn get_item(&self, key: &str) -> CacheResult<Option<CacheItem>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: CacheItem) -> CacheResult<()>;

    /// Remove `key`. Returns `true` if it was present.
    fn remove_item(&self, key: &str) -> CacheResult<bool>;

    /// Drop every entry.
    fn clear(&self) -> CacheResult<()>;
}
