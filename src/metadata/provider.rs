//! MetadataProvider trait and the in-memory registry.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use super::types::EntityMetadata;

/// Errors raised while loading a metadata document.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Failed to parse TOML metadata: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to parse JSON metadata: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Entity '{0}' is defined more than once")]
    DuplicateEntity(String),
}

/// Source of entity metadata.
///
/// Lookups are synchronous and assumed cheap: implementations are expected
/// to cache whatever they load.
pub trait MetadataProvider {
    fn entity(&self, name: &str) -> Option<Arc<EntityMetadata>>;
}

impl<T: MetadataProvider + ?Sized> MetadataProvider for &T {
    fn entity(&self, name: &str) -> Option<Arc<EntityMetadata>> {
        (**self).entity(name)
    }
}

#[derive(Deserialize)]
struct MetadataDocument {
    #[serde(default)]
    entities: Vec<EntityMetadata>,
}

/// In-memory metadata provider.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entities: HashMap<String, Arc<EntityMetadata>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity, replacing any previous definition under its name.
    pub fn register(&mut self, entity: EntityMetadata) -> &mut Self {
        self.entities.insert(entity.name.clone(), Arc::new(entity));
        self
    }

    pub fn with(mut self, entity: EntityMetadata) -> Self {
        self.register(entity);
        self
    }

    /// Load a document of the form:
    ///
    /// ```toml
    /// [[entities]]
    /// name = "User"
    /// table = "user"
    /// identifier = ["id"]
    /// columns = [{ field = "id", type = "integer" }, { field = "name" }]
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, MetadataError> {
        let document: MetadataDocument = toml::from_str(source)?;
        Self::from_document(document)
    }

    /// Load a document of the form `{"entities": [...]}`.
    pub fn from_json_str(source: &str) -> Result<Self, MetadataError> {
        let document: MetadataDocument = serde_json::from_str(source)?;
        Self::from_document(document)
    }

    fn from_document(document: MetadataDocument) -> Result<Self, MetadataError> {
        let mut registry = Self::new();
        for entity in document.entities {
            if registry.entities.contains_key(&entity.name) {
                return Err(MetadataError::DuplicateEntity(entity.name));
            }
            registry.register(entity);
        }
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl MetadataProvider for MetadataRegistry {
    fn entity(&self, name: &str) -> Option<Arc<EntityMetadata>> {
        self.entities.get(name).cloned()
    }
}
