use cairn_path::PathBuilder;
use cairn_store::DEFAULT_CHUNK_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::{RepoError, RepoResult};

/// Which built-in serializer encodes entity objects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    #[default]
    Json,
    Bincode,
}

/// Repository configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// File name of the serialized entity inside its path node.
    pub object_filename: String,
    /// Quarantine area for deletes in flight. Never listed as content.
    pub temp_dir: String,
    /// Buffer size for copying resource streams into storage.
    pub stream_chunk_size: usize,
    /// Actor stamped into `created_by`/`modified_by` unless overridden.
    pub default_actor: Option<String>,
    pub serializer: SerializerKind,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            object_filename: "Entity.object".into(),
            temp_dir: "/_tmp".into(),
            stream_chunk_size: DEFAULT_CHUNK_SIZE,
            default_actor: None,
            serializer: SerializerKind::default(),
        }
    }
}

impl RepositoryConfig {
    pub fn from_toml_str(s: &str) -> RepoResult<Self> {
        toml::from_str(s).map_err(|e| RepoError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> RepoResult<String> {
        toml::to_string(self).map_err(|e| RepoError::Config(e.to_string()))
    }

    /// Reject settings the repository cannot operate with.
    pub fn validate(&self, paths: &PathBuilder) -> RepoResult<()> {
        paths
            .validate_name(&self.object_filename)
            .map_err(|e| RepoError::Config(format!("object_filename: {e}")))?;
        paths
            .validate(&self.temp_dir)
            .map_err(|e| RepoError::Config(format!("temp_dir: {e}")))?;
        if self.temp_dir == paths.root() {
            return Err(RepoError::Config("temp_dir must not be the root".into()));
        }
        if self.stream_chunk_size == 0 {
            return Err(RepoError::Config("stream_chunk_size must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = RepositoryConfig::default();
        assert_eq!(c.object_filename, "Entity.object");
        assert_eq!(c.temp_dir, "/_tmp");
        assert_eq!(c.stream_chunk_size, 8 * 1024);
        assert_eq!(c.serializer, SerializerKind::Json);
        assert!(c.validate(&PathBuilder::new()).is_ok());
    }

    #[test]
    fn toml_roundtrip_and_partial() {
        let c = RepositoryConfig {
            default_actor: Some("admin".into()),
            serializer: SerializerKind::Bincode,
            ..Default::default()
        };
        let text = c.to_toml_string().unwrap();
        assert_eq!(RepositoryConfig::from_toml_str(&text).unwrap(), c);

        let partial = RepositoryConfig::from_toml_str("temp_dir = \"/_trash\"\n").unwrap();
        assert_eq!(partial.temp_dir, "/_trash");
        assert_eq!(partial.object_filename, "Entity.object");
    }

    #[test]
    fn invalid_settings() {
        let pb = PathBuilder::new();
        let bad_dir = RepositoryConfig {
            temp_dir: "tmp/".into(),
            ..Default::default()
        };
        assert!(matches!(bad_dir.validate(&pb), Err(RepoError::Config(_))));
        let root_dir = RepositoryConfig {
            temp_dir: "/".into(),
            ..Default::default()
        };
        assert!(root_dir.validate(&pb).is_err());
        let bad_name = RepositoryConfig {
            object_filename: "a/b".into(),
            ..Default::default()
        };
        assert!(bad_name.validate(&pb).is_err());
        assert!(RepositoryConfig::from_toml_str("serializer = \"xml\"").is_err());
    }
}
