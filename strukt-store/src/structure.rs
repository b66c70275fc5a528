use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use strukt_query::DacValue;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::id::{StructureId, StructureIdType};
use crate::identity::IdentityRange;
use crate::schema::{
    holds_own_identity, IndexableProperty, ScalarKind, Structure, StructureSchema, TypeDescriptor,
    ValueDescriptor, ValueKind,
};

/// One document prepared for persistence: its assigned identifier, its
/// serialized JSON and the values projected for the index/unique tables.
#[derive(Debug, Clone)]
pub struct StructureRecord {
    id: StructureId,
    json: String,
    index_values: Vec<DacValue>,
    unique_values: Vec<DacValue>,
}

impl StructureRecord {
    pub fn id(&self) -> StructureId {
        self.id
    }

    pub fn json(&self) -> &str {
        &self.json
    }

    /// Values aligned with the schema's indexable properties.
    pub fn index_values(&self) -> &[DacValue] {
        &self.index_values
    }

    /// Values aligned with the schema's unique properties.
    pub fn unique_values(&self) -> &[DacValue] {
        &self.unique_values
    }
}

/// Turns documents into [`StructureRecord`]s.
///
/// Identifier assignment happens here, before serialization: integer
/// identifiers are always taken from the checked-out range, guid identifiers
/// keep a caller-supplied non-nil value and are generated locally otherwise.
/// Nested members that hold their own identity are omitted from the
/// serialized JSON and from the projected values; plain value objects
/// round-trip in full.
pub struct StructureBuilder;

impl StructureBuilder {
    pub fn build<T: Structure>(
        schema: &StructureSchema,
        documents: &[T],
        identities: Option<IdentityRange>,
    ) -> Result<Vec<StructureRecord>> {
        let id_property = schema
            .id_property()
            .ok_or(StoreError::MissingIdentifier {
                type_name: schema.name(),
            })?;

        let mut range = match id_property.id_type() {
            StructureIdType::Integer => {
                let range = identities.ok_or(StoreError::ContractViolation(
                    "integer identifiers require a checked-out identity range",
                ))?;

                if (range.remaining() as usize) < documents.len() {
                    return Err(StoreError::ContractViolation(
                        "the identity range is smaller than the batch",
                    ));
                }

                Some(range)
            }
            StructureIdType::Guid => None,
        };

        let descriptor = T::type_descriptor();
        let mut records = Vec::with_capacity(documents.len());

        for document in documents {
            let mut value = serde_json::to_value(document)?;

            if !value.is_object() {
                return Err(StoreError::ContractViolation(
                    "a document must serialize to a JSON object",
                ));
            }

            exclude_owned_structures(&mut value, descriptor)?;

            let map = value.as_object_mut().expect("checked above");
            let id = assign_id(map, id_property.name(), id_property.id_type(), &mut range)?;
            write_identifier_first(map, id_property.name(), id);

            let index_values = schema
                .indexable_properties()
                .iter()
                .map(|p| extract_value(&value, p))
                .collect::<Result<Vec<_>>>()?;
            let unique_values = schema
                .unique_properties()
                .map(|p| extract_value(&value, p))
                .collect::<Result<Vec<_>>>()?;

            records.push(StructureRecord {
                id,
                json: serde_json::to_string(&value)?,
                index_values,
                unique_values,
            });
        }

        Ok(records)
    }
}

fn assign_id(
    map: &Map<String, Value>,
    id_name: &str,
    id_type: StructureIdType,
    range: &mut Option<IdentityRange>,
) -> Result<StructureId> {
    match id_type {
        StructureIdType::Integer => {
            let range = range.as_mut().expect("validated by the caller");
            let id = range.next().expect("range covers the batch");

            Ok(StructureId::Int(id))
        }
        StructureIdType::Guid => {
            let existing = map
                .get(id_name)
                .and_then(Value::as_str)
                .map(Uuid::parse_str)
                .transpose()
                .map_err(|_| StoreError::ContractViolation("the guid identifier is malformed"))?
                .filter(|id| !id.is_nil());

            Ok(StructureId::Guid(existing.unwrap_or_else(Uuid::new_v4)))
        }
    }
}

fn write_identifier_first(map: &mut Map<String, Value>, id_name: &str, id: StructureId) {
    let mut ordered = Map::with_capacity(map.len() + 1);
    ordered.insert(id_name.to_owned(), id.to_json_value());

    for (key, value) in std::mem::take(map) {
        if key != id_name {
            ordered.insert(key, value);
        }
    }

    *map = ordered;
}

/// Removes every member whose declared type holds its own identity, at any
/// depth. Such members are independent structures: they live in their own
/// structure set when inserted as roots, never inside a parent document.
fn exclude_owned_structures(value: &mut Value, descriptor: &TypeDescriptor) -> Result<()> {
    let Some(map) = value.as_object_mut() else {
        return Ok(());
    };

    for field in descriptor.fields() {
        match field.kind() {
            ValueDescriptor::Object(child) => {
                let child = child();

                if holds_own_identity(child)? {
                    map.remove(field.name());
                } else if let Some(nested) = map.get_mut(field.name()) {
                    exclude_owned_structures(nested, child)?;
                }
            }
            ValueDescriptor::ObjectCollection(child) => {
                let child = child();

                if holds_own_identity(child)? {
                    map.remove(field.name());
                } else if let Some(Value::Array(items)) = map.get_mut(field.name()) {
                    for item in items {
                        exclude_owned_structures(item, child)?;
                    }
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// Resolves the value at an indexable path, null-safe across missing
/// intermediate members.
pub(crate) fn extract_value(root: &Value, property: &IndexableProperty) -> Result<DacValue> {
    let mut node = Some(root);

    for segment in property.path().split('.') {
        node = node.and_then(|n| n.get(segment));
    }

    let node = match node {
        Some(node) if !node.is_null() => node,
        _ => return Ok(null_of(property.kind())),
    };

    let mismatch = || StoreError::InvalidIndexValue {
        path: property.path().to_owned(),
    };

    match property.kind() {
        ValueKind::Scalar(ScalarKind::Int) => {
            node.as_i64().map(DacValue::from).ok_or_else(mismatch)
        }
        ValueKind::Scalar(ScalarKind::Float) => {
            node.as_f64().map(DacValue::from).ok_or_else(mismatch)
        }
        ValueKind::Scalar(ScalarKind::Bool) => {
            node.as_bool().map(DacValue::from).ok_or_else(mismatch)
        }
        ValueKind::Scalar(ScalarKind::Text) | ValueKind::Enumeration => {
            node.as_str().map(DacValue::from).ok_or_else(mismatch)
        }
        ValueKind::Scalar(ScalarKind::DateTime) => node
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| DacValue::from(dt.with_timezone(&Utc)))
            .ok_or_else(mismatch),
        ValueKind::Scalar(ScalarKind::Guid) => node
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(DacValue::from)
            .ok_or_else(mismatch),
        ValueKind::Collection(_) => {
            if !node.is_array() {
                return Err(mismatch());
            }

            Ok(DacValue::Text(Some(serde_json::to_string(node)?)))
        }
    }
}

fn null_of(kind: ValueKind) -> DacValue {
    match kind {
        ValueKind::Scalar(ScalarKind::Int) => DacValue::Int(None),
        ValueKind::Scalar(ScalarKind::Float) => DacValue::Float(None),
        ValueKind::Scalar(ScalarKind::Bool) => DacValue::Bool(None),
        ValueKind::Scalar(ScalarKind::Text) | ValueKind::Enumeration => DacValue::Text(None),
        ValueKind::Scalar(ScalarKind::DateTime) => DacValue::DateTime(None),
        ValueKind::Scalar(ScalarKind::Guid) => DacValue::Guid(None),
        ValueKind::Collection(_) => DacValue::Text(None),
    }
}
