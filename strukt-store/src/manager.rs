use async_trait::async_trait;

use crate::error::Result;
use crate::schema::StructureSchema;

/// Lazily synchronizes a structure set's physical layout.
///
/// Tables are created on the first use of a schema; anything beyond
/// create-if-missing (migrations, upgrades) is out of scope.
#[async_trait]
pub trait SchemaManager: Send + Sync {
    /// Creates the structure, indexes and uniques tables — and the shared
    /// identity bookkeeping table — when missing.
    async fn ensure_structure_set(&self, schema: &StructureSchema) -> Result<()>;
}
