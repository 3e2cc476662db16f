//! Entity object encodings.

use std::sync::Arc;

use cairn_types::Entity;

use crate::config::SerializerKind;
use crate::error::{RepoError, RepoResult};

/// Converts entities to and from the bytes stored in their object file.
///
/// The volatile path is never part of the encoding.
pub trait Serializer: Send + Sync {
    fn name(&self) -> &'static str;

    fn serialize(&self, entity: &Entity) -> RepoResult<Vec<u8>>;

    fn unserialize(&self, data: &[u8]) -> RepoResult<Entity>;
}

/// Human-readable JSON objects.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn serialize(&self, entity: &Entity) -> RepoResult<Vec<u8>> {
        serde_json::to_vec_pretty(entity).map_err(|e| RepoError::Serialization(e.to_string()))
    }

    fn unserialize(&self, data: &[u8]) -> RepoResult<Entity> {
        serde_json::from_slice(data).map_err(|e| RepoError::Serialization(e.to_string()))
    }
}

/// Compact binary objects.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn name(&self) -> &'static str {
        "bincode"
    }

    fn serialize(&self, entity: &Entity) -> RepoResult<Vec<u8>> {
        bincode::serialize(entity).map_err(|e| RepoError::Serialization(e.to_string()))
    }

    fn unserialize(&self, data: &[u8]) -> RepoResult<Entity> {
        bincode::deserialize(data).map_err(|e| RepoError::Serialization(e.to_string()))
    }
}

/// The built-in serializer selected by configuration.
pub fn serializer_for(kind: SerializerKind) -> Arc<dyn Serializer> {
    match kind {
        SerializerKind::Json => Arc::new(JsonSerializer),
        SerializerKind::Bincode => Arc::new(BincodeSerializer),
    }
}
