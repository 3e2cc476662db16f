//! Caching collaborators of the Cairn repository.
//!
//! Two very different caches live here:
//!
//! - [`Cache`] -- an external, shared key/value cache holding detached
//!   entity copies stamped with the storage mtime they were read at. The
//!   repository validates every hit against storage before trusting it.
//! - [`Watcher`] -- the per-request identity map. It holds the canonical
//!   in-memory [`EntityHandle`](cairn_types::EntityHandle) for each loaded
//!   path and is trusted without validation.

pub mod error;
pub mod memory;
pub mod traits;
pub mod watcher;

pub use error::{CacheError, CacheResult};
pub use memory::{CacheStats, InMemoryCache};
pub use traits::{Cache, CacheCapabilities, CacheItem, CachedEntity};
pub use watcher::Watcher;
