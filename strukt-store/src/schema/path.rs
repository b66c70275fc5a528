use crate::error::{Result, StoreError};

use super::describe::{TypeDescriptor, ValueDescriptor};
use super::reflect::{holds_own_identity, IdentifierProperty};
use super::{IndexableProperty, ValueKind};

/// Builds the dotted index-column path of a property: no root segment and no
/// delimiter for first-level properties (`"amount"`, `"shipping.city"`).
pub fn property_path(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(parent) => format!("{parent}.{name}"),
        None => name.to_owned(),
    }
}

/// Walks a type graph depth-first and collects its indexable property paths.
///
/// Recursion descends only into plain value objects; a nested type that
/// holds its own identity is excluded entirely, as are object collections.
/// The root identifier property is carried by the structure table, never the
/// indexes table. Cyclic graphs fail fast.
pub(crate) fn build_indexable_properties(
    descriptor: &'static TypeDescriptor,
    id_property: Option<&IdentifierProperty>,
) -> Result<Vec<IndexableProperty>> {
    let mut out = Vec::new();
    let mut visiting = vec![descriptor.name()];

    walk(
        descriptor,
        None,
        0,
        id_property.map(|p| p.name()),
        descriptor.name(),
        &mut visiting,
        &mut out,
    )?;

    Ok(out)
}

fn walk(
    descriptor: &'static TypeDescriptor,
    parent: Option<&str>,
    depth: usize,
    root_id_name: Option<&str>,
    root_name: &'static str,
    visiting: &mut Vec<&'static str>,
    out: &mut Vec<IndexableProperty>,
) -> Result<()> {
    for field in descriptor.fields() {
        if depth == 0 && root_id_name == Some(field.name()) {
            continue;
        }

        let path = property_path(parent, field.name());

        match field.kind() {
            ValueDescriptor::Scalar(kind) => {
                out.push(IndexableProperty::new(
                    path,
                    ValueKind::Scalar(kind),
                    depth,
                    field.is_unique(),
                ));
            }
            ValueDescriptor::Enumeration => {
                out.push(IndexableProperty::new(
                    path,
                    ValueKind::Enumeration,
                    depth,
                    field.is_unique(),
                ));
            }
            ValueDescriptor::ScalarCollection(kind) => {
                out.push(IndexableProperty::new(
                    path,
                    ValueKind::Collection(kind),
                    depth,
                    field.is_unique(),
                ));
            }
            ValueDescriptor::Object(child) => {
                let child = child();

                if holds_own_identity(child)? {
                    continue;
                }

                if visiting.contains(&child.name()) {
                    return Err(StoreError::CyclicTypeGraph {
                        type_name: root_name,
                        via: child.name(),
                    });
                }

                visiting.push(child.name());
                walk(
                    child,
                    Some(&path),
                    depth + 1,
                    root_id_name,
                    root_name,
                    visiting,
                    out,
                )?;
                visiting.pop();
            }
            ValueDescriptor::ObjectCollection(_) => continue,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_level_path_has_no_delimiter() {
        assert_eq!(property_path(None, "amount"), "amount");
    }

    #[test]
    fn nested_path_is_dotted_without_root() {
        assert_eq!(property_path(Some("shipping"), "city"), "shipping.city");
    }
}
