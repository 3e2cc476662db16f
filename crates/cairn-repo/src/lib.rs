//! Transactional entity repository for the Cairn content store.
//!
//! A [`Repository`] persists typed entities as serialized objects in a
//! path-keyed [`Storage`](cairn_store::Storage). Each entity lives at
//! `<path>/<object_filename>`; sibling objects of that file are the entity's
//! resources and sibling nodes are its children.
//!
//! # Transactions
//!
//! Saves and deletes are staged in memory and applied by
//! [`Repository::commit`], which writes everything to temporary files first,
//! quarantines deletes, then publishes with one move per object. A failed
//! commit restores quarantined content and purges temporary files, so no
//! reader ever observes a half-written object. Moves and copies bypass
//! staging and apply immediately.
//!
//! # Reads
//!
//! Lookups go through the per-instance identity map
//! ([`Watcher`](cairn_cache::Watcher)), then an optional shared
//! [`Cache`](cairn_cache::Cache) whose entries are trusted only while the
//! stored object is not newer, then storage.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use cairn_repo::Repository;
//! use cairn_store::InMemoryStorage;
//! use cairn_types::{Document, Entity, EntityHandle, EntityKind};
//!
//! let mut repo = Repository::new(Arc::new(InMemoryStorage::new())).unwrap();
//! let page = EntityHandle::new(
//!     Entity::new(EntityKind::Document(Document::new("Hello"))).with_path("/site/ROOT/hello"),
//! );
//! repo.save_entity(&page).unwrap();
//! repo.commit().unwrap();
//! assert!(page.uuid().is_some());
//! assert!(repo.get_entity("/site/ROOT/hello").unwrap().ptr_eq(&page));
//! ```

pub mod commit;
pub mod config;
pub mod convertor;
pub mod error;
pub mod hooks;
pub mod maintenance;
pub mod repository;
pub mod resource;
mod staging;
pub mod serializer;
pub mod sync;

#[cfg(test)]
mod testing;

pub use config::{RepositoryConfig, SerializerKind};
pub use convertor::{InMemoryUuidConvertor, UuidConvertor};
pub use error::{RepoError, RepoResult};
pub use hooks::{CommitDiff, CommitHook, RemovedEntity, ResourceChange, ResourceSource, SerializeHook};
pub use maintenance::{ReindexReport, UuidAudit};
pub use repository::{cache_key, DescendantScan, ListOptions, Repository, RepositoryBuilder, CACHE_KEY_LEN};
pub use serializer::{serializer_for, BincodeSerializer, JsonSerializer, Serializer};
pub use staging::PendingSummary;
pub use sync::IndexSynchronizer;
