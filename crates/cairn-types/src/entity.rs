use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;
use crate::kind::{EntityKind, KindTag};
use crate::property::PropertyValue;

/// Wall-clock timestamp stamped by the repository.
pub type Timestamp = DateTime<Utc>;

/// A node in the hierarchical content tree.
///
/// The UUID, timestamps and actor fields are assigned by the repository at
/// commit time. The storage path is volatile: it is set when the entity is
/// loaded or staged and is never part of the serialized payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub uuid: Option<Uuid>,
    #[serde(skip)]
    path: Option<String>,
    pub created: Option<Timestamp>,
    pub created_by: Option<String>,
    pub modified: Option<Timestamp>,
    pub modified_by: Option<String>,
    pub kind: EntityKind,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Entity {
    /// Create an unsaved entity of the given kind. It has no UUID and no path.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Builder-style path assignment.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Builder-style custom property assignment.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = Some(path.into());
    }

    pub fn clear_path(&mut self) {
        self.path = None;
    }

    pub fn kind_tag(&self) -> KindTag {
        self.kind.tag()
    }

    pub fn title(&self) -> Option<&str> {
        self.kind.title()
    }

    /// Whether the entity has ever been committed.
    pub fn is_persisted(&self) -> bool {
        self.uuid.is_some() && self.created.is_some()
    }

    // ---- Custom properties ----

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn remove_property(&mut self, key: &str) -> Option<PropertyValue> {
        self.properties.remove(key)
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Read a text property. Absent keys are `Ok(None)`; a key holding a
    /// non-text value is an error.
    pub fn property_str(&self, key: &str) -> Result<Option<&str>, TypeError> {
        match self.properties.get(key) {
            None | Some(PropertyValue::Null) => Ok(None),
            Some(v) => v.as_str().map(Some).ok_or_else(|| TypeError::PropertyType {
                key: key.to_string(),
                expected: "text",
            }),
        }
    }

    pub fn property_i64(&self, key: &str) -> Result<Option<i64>, TypeError> {
        match self.properties.get(key) {
            None | Some(PropertyValue::Null) => Ok(None),
            Some(v) => v.as_i64().map(Some).ok_or_else(|| TypeError::PropertyType {
                key: key.to_string(),
                expected: "int",
            }),
        }
    }

    pub fn property_bool(&self, key: &str) -> Result<Option<bool>, TypeError> {
        match self.properties.get(key) {
            None | Some(PropertyValue::Null) => Ok(None),
            Some(v) => v.as_bool().map(Some).ok_or_else(|| TypeError::PropertyType {
                key: key.to_string(),
                expected: "bool",
            }),
        }
    }

    // ---- Repository stamping ----

    /// Assign a UUID if none is set and return the effective UUID.
    pub fn ensure_uuid(&mut self, generate: impl FnOnce() -> Uuid) -> Uuid {
        *self.uuid.get_or_insert_with(generate)
    }

    /// Stamp creation (when missing) and modification metadata.
    pub fn stamp(&mut self, now: Timestamp, actor: Option<&str>) {
        if self.created.is_none() {
            self.created = Some(now);
            self.created_by = actor.map(str::to_string);
        }
        self.modified = Some(now);
        self.modified_by = actor.map(str::to_string);
    }

    /// Copy the repository-managed fields of `other` onto `self`.
    pub fn adopt_stamps(&mut self, other: &Entity) {
        self.uuid = other.uuid;
        self.created = other.created;
        self.created_by = other.created_by.clone();
        self.modified = other.modified;
        self.modified_by = other.modified_by.clone();
    }
}
