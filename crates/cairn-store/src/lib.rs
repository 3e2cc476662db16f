//! Path-keyed storage for the Cairn content repository.
//!
//! Storage is a byte store addressed by `/`-separated paths. Leaf keys hold
//! data ("objects"); every proper prefix of an object key is a node that can
//! be scanned for children. The repository builds its transactional protocol
//! on top of this and only relies on single-key atomicity.
//!
//! # Storage Backends
//!
//! All backends implement the [`Storage`] trait:
//!
//! - [`InMemoryStorage`] -- `BTreeMap`-based store for tests and embedding
//! - [`FsStorage`] -- directory tree on the local filesystem
//!
//! # Design Rules
//!
//! 1. A single `set` or `move_path` is atomic; nothing spanning keys is.
//! 2. `move_path` replaces whatever lives at the destination.
//! 3. Missing paths are reported through return values (`false`, `None`,
//!    empty listings), except `get`/`read`, which fail with `NotFound`.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod memory;
pub mod stream;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsStorage;
pub use memory::InMemoryStorage;
pub use stream::{copy_stream, DEFAULT_CHUNK_SIZE};
pub use traits::{Mtime, Storage};
