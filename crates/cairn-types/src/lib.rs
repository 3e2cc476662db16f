//! Foundation types for the Cairn content repository.
//!
//! This crate provides the content model shared by every other Cairn crate.
//! An entity is a flat base record (UUID, timestamps, actors) composed with a
//! kind-specific payload and an explicit side map of custom properties.
//!
//! # Key Types
//!
//! - [`Entity`] — Base record plus [`EntityKind`] and custom properties
//! - [`EntityKind`] — Tagged variant selecting the entity's capabilities
//! - [`KindTag`] — Payload-free discriminant used for listing filters
//! - [`Folder`], [`Navigation`], [`Document`], [`Site`] — Capability structs
//! - [`PropertyValue`] — Typed value stored in the custom-property map
//! - [`EntityHandle`] — Shared reference preserving in-memory identity

pub mod entity;
pub mod error;
pub mod handle;
pub mod kind;
pub mod property;

pub use entity::{Entity, Timestamp};
pub use error::TypeError;
pub use handle::EntityHandle;
pub use kind::{Document, EntityKind, Folder, KindTag, Navigation, Site};
pub use property::PropertyValue;
pub use uuid::Uuid;
