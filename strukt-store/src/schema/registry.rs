use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;

use super::builder::SchemaBuilder;
use super::describe::Structure;
use super::StructureSchema;

/// Process-wide schema cache with explicit construction.
///
/// `get` is build-or-fetch: the schema for a type is built at most once, under
/// the write lock, and shared thereafter. Removal takes the same lock, which
/// gives the exclusion schema removal needs against concurrent lookups.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<TypeId, Arc<StructureSchema>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Structure>(&self) -> Result<Arc<StructureSchema>> {
        let key = TypeId::of::<T>();

        if let Some(schema) = self.schemas.read().get(&key) {
            return Ok(schema.clone());
        }

        let mut schemas = self.schemas.write();

        if let Some(schema) = schemas.get(&key) {
            return Ok(schema.clone());
        }

        let schema = Arc::new(SchemaBuilder::build::<T>()?);
        schemas.insert(key, schema.clone());

        Ok(schema)
    }

    /// Removes the cached schema for a type, e.g. when the type is dropped
    /// from the store.
    pub fn remove<T: Structure>(&self) {
        self.schemas.write().remove(&TypeId::of::<T>());
    }

    pub fn clear(&self) {
        self.schemas.write().clear();
    }

    pub fn registrations(&self) -> Vec<Arc<StructureSchema>> {
        self.schemas.read().values().cloned().collect()
    }
}
