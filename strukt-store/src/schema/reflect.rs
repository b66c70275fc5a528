use crate::error::{Result, StoreError};
use crate::id::StructureIdType;

use super::describe::{ScalarKind, TypeDescriptor, ValueDescriptor};

/// The located identifier property of a document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierProperty {
    name: &'static str,
    id_type: StructureIdType,
}

impl IdentifierProperty {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id_type(&self) -> StructureIdType {
        self.id_type
    }
}

/// Locates the identifier property of a type.
///
/// A field qualifies when it is named `id`, `structure_id` or
/// `{type_name_snake}_id` and its scalar kind is integer or guid
/// (optionality is transparent). A type without such a field has no
/// identifier, which is not an error; more than one qualifying field is a
/// configuration error.
pub fn identifier_property(descriptor: &TypeDescriptor) -> Result<Option<IdentifierProperty>> {
    let type_id_name = format!("{}_id", to_snake_case(descriptor.name()));
    let mut found: Option<IdentifierProperty> = None;

    for field in descriptor.fields() {
        let name = field.name();
        if name != "id" && name != "structure_id" && name != type_id_name {
            continue;
        }

        let id_type = match field.kind() {
            ValueDescriptor::Scalar(ScalarKind::Int) => StructureIdType::Integer,
            ValueDescriptor::Scalar(ScalarKind::Guid) => StructureIdType::Guid,
            _ => continue,
        };

        if let Some(first) = found {
            return Err(StoreError::AmbiguousIdentifier {
                type_name: descriptor.name(),
                first: first.name,
                second: name,
            });
        }

        found = Some(IdentifierProperty { name, id_type });
    }

    Ok(found)
}

/// Whether a nested type declares its own identifier property, making it an
/// independent structure rather than an embedded value object.
pub fn holds_own_identity(descriptor: &TypeDescriptor) -> Result<bool> {
    Ok(identifier_property(descriptor)?.is_some())
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);

    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_of_type_names() {
        assert_eq!(to_snake_case("Customer"), "customer");
        assert_eq!(to_snake_case("SalesOrder"), "sales_order");
        assert_eq!(to_snake_case("order"), "order");
    }
}
