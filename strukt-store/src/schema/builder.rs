use crate::error::Result;

use super::describe::{Structure, TypeDescriptor};
use super::path::build_indexable_properties;
use super::reflect::identifier_property;
use super::StructureSchema;

/// Derives the physical layout of a document type.
///
/// Deterministic and side-effect free: the same descriptor always yields the
/// same table names and the same ordered indexable-property list, and no
/// table is created here.
pub struct SchemaBuilder;

impl SchemaBuilder {
    pub fn build<T: Structure>() -> Result<StructureSchema> {
        Self::build_from(T::type_descriptor())
    }

    pub fn build_from(descriptor: &'static TypeDescriptor) -> Result<StructureSchema> {
        let id_property = identifier_property(descriptor)?;
        let indexable = build_indexable_properties(descriptor, id_property.as_ref())?;

        Ok(StructureSchema::new(
            descriptor.name(),
            id_property,
            indexable,
        ))
    }
}
