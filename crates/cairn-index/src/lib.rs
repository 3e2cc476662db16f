//! Full-text indexing for the Cairn content repository.
//!
//! The indexer is an independent transaction participant: documents are
//! added and deleted between [`Indexer::begin`] and [`Indexer::commit`] and
//! become visible to searches only after the commit. The repository drives
//! it from a post-commit hook so that index changes follow storage changes.
//!
//! # Key Types
//!
//! - [`Indexer`] -- The transactional indexing interface
//! - [`IndexDocument`] -- Flattened, searchable view of an entity
//! - [`InMemoryIndexer`] -- Token inverted index for tests and embedding
//! - [`SearchHit`] -- A ranked search result

pub mod document;
pub mod error;
pub mod memory;
pub mod traits;

pub use document::IndexDocument;
pub use error::{IndexError, IndexResult};
pub use memory::{InMemoryIndexer, SearchHit};
pub use traits::Indexer;
