use std::collections::BTreeMap;

use cairn_types::{Entity, EntityKind, KindTag};
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};

/// Flattened, searchable view of an entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Entity path; the document key.
    pub path: String,
    pub uuid: String,
    pub kind: KindTag,
    /// Named text fields. Every field is searchable.
    pub fields: BTreeMap<String, String>,
}

impl IndexDocument {
    /// Build a document from a committed entity.
    ///
    /// The entity must carry a path and a UUID.
    pub fn from_entity(entity: &Entity) -> IndexResult<Self> {
        let path = entity
            .path()
            .ok_or_else(|| IndexError::InvalidDocument("entity has no path".into()))?;
        let uuid = entity
            .uuid
            .ok_or_else(|| IndexError::InvalidDocument(format!("entity at {path} has no uuid")))?;

        let mut fields = BTreeMap::new();
        if let Some(folder) = entity.kind.foldered() {
            fields.insert("title".to_string(), folder.title.clone());
            if let Some(description) = &folder.description {
                fields.insert("description".to_string(), description.clone());
            }
        }
        if let Some(nav) = entity.kind.navigable() {
            if let Some(nav_title) = &nav.nav_title {
                fields.insert("nav_title".to_string(), nav_title.clone());
            }
            if !nav.keywords.is_empty() {
                fields.insert("keywords".to_string(), nav.keywords.join(" "));
            }
        }
        if let EntityKind::Site(site) = &entity.kind {
            if !site.hosts.is_empty() {
                fields.insert("hosts".to_string(), site.hosts.join(" "));
            }
        }
        for (key, value) in &entity.properties {
            let text = value.text_fragments().join(" ");
            if !text.is_empty() {
                fields.insert(format!("property.{key}"), text);
            }
        }

        Ok(Self {
            path: path.to_string(),
            uuid: uuid.to_string(),
            kind: entity.kind_tag(),
            fields,
        })
    }

    /// All searchable text, field values joined by spaces.
    pub fn text(&self) -> String {
        let mut parts: Vec<&str> = vec![self.path.as_str()];
        parts.extend(self.fields.values().map(String::as_str));
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::{Document, Site, Uuid};

    #[test]
    fn document_fields() {
        let mut doc = Document::new("Welcome Home");
        doc.navigation.keywords = vec!["start".into(), "landing".into()];
        let mut e = Entity::new(EntityKind::Document(doc))
            .with_path("/site/ROOT")
            .with_property("author", "Jane Roe")
            .with_property("weight", 4i64);
        e.uuid = Some(Uuid::new_v4());

        let d = IndexDocument::from_entity(&e).unwrap();
        assert_eq!(d.kind, KindTag::Document);
        assert_eq!(d.fields["title"], "Welcome Home");
        assert_eq!(d.fields["keywords"], "start landing");
        assert_eq!(d.fields["property.author"], "Jane Roe");
        assert!(!d.fields.contains_key("property.weight"));
        assert!(d.text().contains("/site/ROOT"));
    }

    #[test]
    fn site_hosts_are_indexed() {
        let mut site = Site::new("Main");
        site.hosts = vec!["example.org".into()];
        let mut e = Entity::new(EntityKind::Site(site)).with_path("/main");
        e.uuid = Some(Uuid::new_v4());
        let d = IndexDocument::from_entity(&e).unwrap();
        assert_eq!(d.fields["hosts"], "example.org");
    }

    #[test]
    fn requires_path_and_uuid() {
        let e = Entity::default();
        assert!(matches!(IndexDocument::from_entity(&e), Err(IndexError::InvalidDocument(_))));
        let e = Entity::default().with_path("/x");
        assert!(matches!(IndexDocument::from_entity(&e), Err(IndexError::InvalidDocument(_))));
    }
}
