mod builder;
mod describe;
mod path;
mod reflect;
mod registry;

use uuid::Uuid;

use crate::id::StructureIdType;

pub use builder::SchemaBuilder;
pub use describe::{
    Describe, FieldDescriptor, ScalarKind, Structure, TypeDescriptor, ValueDescriptor,
};
pub use path::property_path;
pub use reflect::{holds_own_identity, identifier_property, IdentifierProperty};
pub use registry::SchemaRegistry;

/// A scalar-reachable property path projected into the indexes table.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexableProperty {
    path: String,
    kind: ValueKind,
    depth: usize,
    unique: bool,
}

impl IndexableProperty {
    pub(crate) fn new(path: String, kind: ValueKind, depth: usize, unique: bool) -> Self {
        Self {
            path,
            kind,
            depth,
            unique,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Nesting level the property was declared at, zero for root-level.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }
}

/// The projected kind of an indexable property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Scalar(ScalarKind),
    Enumeration,
    /// A collection of scalars, projected as its JSON array text.
    Collection(ScalarKind),
}

/// The physical layout derived from one document type.
///
/// Immutable once built; building performs no I/O. Two distinct type names
/// never collide: every table name embeds the type name verbatim, and the
/// allocation hash is a uuid-v5 of the name.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureSchema {
    name: &'static str,
    hash: String,
    structure_table_name: String,
    indexes_table_name: String,
    uniques_table_name: String,
    id_property: Option<IdentifierProperty>,
    indexable_properties: Vec<IndexableProperty>,
}

impl StructureSchema {
    pub(crate) fn new(
        name: &'static str,
        id_property: Option<IdentifierProperty>,
        indexable_properties: Vec<IndexableProperty>,
    ) -> Self {
        Self {
            name,
            hash: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string(),
            structure_table_name: format!("{name}Structure"),
            indexes_table_name: format!("{name}Indexes"),
            uniques_table_name: format!("{name}Uniques"),
            id_property,
            indexable_properties,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stable identifier-allocation key; survives physical table renames.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn structure_table_name(&self) -> &str {
        &self.structure_table_name
    }

    pub fn indexes_table_name(&self) -> &str {
        &self.indexes_table_name
    }

    pub fn uniques_table_name(&self) -> &str {
        &self.uniques_table_name
    }

    pub fn id_property(&self) -> Option<&IdentifierProperty> {
        self.id_property.as_ref()
    }

    pub fn id_type(&self) -> Option<StructureIdType> {
        self.id_property.as_ref().map(|p| p.id_type())
    }

    /// Indexable property paths in reflection order.
    pub fn indexable_properties(&self) -> &[IndexableProperty] {
        &self.indexable_properties
    }

    /// The unique-constrained subset of the indexable properties.
    pub fn unique_properties(&self) -> impl Iterator<Item = &IndexableProperty> {
        self.indexable_properties.iter().filter(|p| p.is_unique())
    }

    pub fn has_uniques(&self) -> bool {
        self.unique_properties().next().is_some()
    }
}
