use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tracing::debug;

use crate::error::{CacheError, CacheResult};
use crate::traits::{Cache, CacheCapabilities, CacheItem};

/// Hit/miss counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct Slots {
    items: HashMap<String, (CacheItem, u64)>,
    /// Insertion counter used to find the oldest entry when full.
    seq: u64,
}

/// In-memory, `HashMap`-based cache.
///
/// When built with a capacity, inserting into a full cache evicts the
/// oldest-written entry.
#[derive(Debug)]
pub struct InMemoryCache {
    slots: RwLock<Slots>,
    capabilities: CacheCapabilities,
    capacity: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl InMemoryCache {
    /// Unbounded cache accepting composite values.
    pub fn new() -> Self {
        Self::build(
            CacheCapabilities {
                object_values: true,
                max_key_length: None,
            },
            None,
        )
    }

    /// Cache holding at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::build(
            CacheCapabilities {
                object_values: true,
                max_key_length: None,
            },
            Some(capacity.max(1)),
        )
    }

    /// Cache that only accepts text and byte values, like a plain
    /// string-valued key/value server.
    pub fn scalar_only() -> Self {
        Self::build(
            CacheCapabilities {
                object_values: false,
                max_key_length: Some(250),
            },
            None,
        )
    }

    fn build(capabilities: CacheCapabilities, capacity: Option<usize>) -> Self {
        Self {
            slots: RwLock::new(Slots::default()),
            capabilities,
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.read().expect("lock poisoned").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.slots.read().expect("lock poisoned").items.contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn check_key(&self, key: &str) -> CacheResult<()> {
        match self.capabilities.max_key_length {
            Some(max) if key.len() > max => Err(CacheError::KeyTooLong {
                len: key.len(),
                max,
            }),
            _ => Ok(()),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for InMemoryCache {
    fn capabilities(&self) -> CacheCapabilities {
        self.capabilities
    }

    fn get_item(&self, key: &str) -> CacheResult<Option<CacheItem>> {
        self.check_key(key)?;
        let slots = self.slots.read().expect("lock poisoned");
        let item = slots.items.get(key).map(|(item, _)| item.clone());
        if item.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(item)
    }

    fn set_item(&self, key: &str, value: CacheItem) -> CacheResult<()> {
        self.check_key(key)?;
        if matches!(value, CacheItem::Entity(_)) && !self.capabilities.object_values {
            return Err(CacheError::UnsupportedValue(value.kind_name()));
        }
        let mut slots = self.slots.write().expect("lock poisoned");
        if let Some(capacity) = self.capacity {
            if !slots.items.contains_key(key) && slots.items.len() >= capacity {
                let oldest = slots
                    .items
                    .iter()
                    .min_by_key(|(_, (_, seq))| *seq)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    slots.items.remove(&oldest);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %oldest, "cache full; evicted oldest entry");
                }
            }
        }
        slots.seq += 1;
        let seq = slots.seq;
        slots.items.insert(key.to_string(), (value, seq));
        Ok(())
    }

    fn remove_item(&self, key: &str) -> CacheResult<bool> {
        self.check_key(key)?;
        let mut slots = self.slots.write().expect("lock poisoned");
        Ok(slots.items.remove(key).is_some())
    }

    fn clear(&self) -> CacheResult<()> {
        self.slots.write().expect("lock poisoned").items.clear();
        Ok(())
    }
}
