//! Hierarchical storage paths for the Cairn content repository.
//!
//! Every entity and resource is addressed by a `/`-separated path. This crate
//! owns the canonical form of such paths:
//!
//! - a single leading separator, no trailing separator (the root is `/`)
//! - no empty, `.` or `..` components
//! - every component restricted to `[A-Za-z0-9._-]`, with other characters
//!   transliterated to ASCII or replaced by `-`
//!
//! The repository never rewrites caller paths; it only checks them against
//! [`PathBuilder::sanitize`] and rejects anything that is not canonical.

pub mod builder;
pub mod error;
pub mod translit;

pub use builder::PathBuilder;
pub use error::{PathError, PathResult};
pub use translit::transliterate;
