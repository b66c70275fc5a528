mod common;

use std::sync::Arc;

use strukt_store::schema::{SchemaBuilder, SchemaRegistry, ValueKind};
use strukt_store::{DacValue, IdentityRange, StoreError, StructureBuilder};
use uuid::Uuid;

use crate::common::{invoice, order, Account, Invoice, Note, Order, Profile};

#[test]
fn indexable_paths_follow_reflection_order() {
    let schema = SchemaBuilder::build::<Order>().unwrap();

    let paths = schema
        .indexable_properties()
        .iter()
        .map(|p| (p.path().to_owned(), p.depth()))
        .collect::<Vec<_>>();

    assert_eq!(
        paths,
        vec![
            ("amount".to_owned(), 0),
            ("reference".to_owned(), 0),
            ("shipping.city".to_owned(), 1),
            ("shipping.zip".to_owned(), 1),
        ]
    );
}

#[test]
fn identifier_property_is_located_by_name_and_kind() {
    let order = SchemaBuilder::build::<Order>().unwrap();
    let invoice = SchemaBuilder::build::<Invoice>().unwrap();
    let note = SchemaBuilder::build::<Note>().unwrap();

    assert_eq!(order.id_property().unwrap().name(), "order_id");
    assert_eq!(
        order.id_type(),
        Some(strukt_store::StructureIdType::Integer)
    );
    assert_eq!(invoice.id_property().unwrap().name(), "structure_id");
    assert_eq!(invoice.id_type(), Some(strukt_store::StructureIdType::Guid));
    assert_eq!(note.id_type(), None);
}

strukt_store::structure! {
    struct Conflicted {
        id: i64,
        structure_id: i64,
        label: String,
    }
}

#[test]
fn ambiguous_identifier_is_a_configuration_error() {
    let err = SchemaBuilder::build::<Conflicted>().unwrap_err();

    assert!(matches!(err, StoreError::AmbiguousIdentifier { .. }));
}

strukt_store::structure! {
    struct Label {
        id: String,
        text: String,
    }
}

#[test]
fn identifier_of_wrong_kind_is_treated_as_absent() {
    let schema = SchemaBuilder::build::<Label>().unwrap();

    assert_eq!(schema.id_type(), None);
    assert!(schema
        .indexable_properties()
        .iter()
        .any(|p| p.path() == "id"));
}

#[test]
fn nested_structure_is_never_flattened() {
    let schema = SchemaBuilder::build::<Invoice>().unwrap();

    let paths = schema
        .indexable_properties()
        .iter()
        .map(|p| p.path())
        .collect::<Vec<_>>();

    assert_eq!(paths, vec!["value", "nested_object.value"]);
    assert!(!paths.iter().any(|p| p.starts_with("nested_structure")));
}

strukt_store::structure! {
    struct Link {
        next: Option<Box<Link>>,
        label: String,
    }
}

#[test]
fn cyclic_type_graph_fails_fast() {
    let err = SchemaBuilder::build::<Link>().unwrap_err();

    assert!(matches!(
        err,
        StoreError::CyclicTypeGraph { type_name: "Link", via: "Link" }
    ));
}

#[test]
fn table_names_and_hash_are_deterministic() {
    let first = SchemaBuilder::build::<Order>().unwrap();
    let second = SchemaBuilder::build::<Order>().unwrap();

    assert_eq!(first.structure_table_name(), "OrderStructure");
    assert_eq!(first.indexes_table_name(), "OrderIndexes");
    assert_eq!(first.uniques_table_name(), "OrderUniques");
    assert_eq!(
        first.hash(),
        Uuid::new_v5(&Uuid::NAMESPACE_OID, b"Order").to_string()
    );
    assert_eq!(first, second);
}

#[test]
fn registry_builds_once_and_rebuilds_after_removal() {
    let registry = SchemaRegistry::new();

    let first = registry.get::<Order>().unwrap();
    let second = registry.get::<Order>().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.registrations().len(), 1);

    registry.remove::<Order>();

    let third = registry.get::<Order>().unwrap();

    assert!(!Arc::ptr_eq(&first, &third));

    registry.clear();

    assert!(registry.registrations().is_empty());
}

#[test]
fn integer_identifiers_come_from_the_checked_out_range() {
    let schema = SchemaBuilder::build::<Order>().unwrap();
    let documents = vec![
        order("A-1", 10.5, "Uppsala"),
        order("A-2", 20.5, "Göteborg"),
    ];

    let records =
        StructureBuilder::build(&schema, &documents, Some(IdentityRange::new(7, 2))).unwrap();

    assert_eq!(records[0].id().to_string(), "7");
    assert_eq!(records[1].id().to_string(), "8");
    assert!(records[0].json().starts_with("{\"order_id\":7,"));
    assert_eq!(
        records[0].index_values(),
        &[
            DacValue::from(10.5),
            DacValue::from("A-1"),
            DacValue::from("Uppsala"),
            DacValue::from("111 11"),
        ]
    );
}

#[test]
fn nested_structure_is_omitted_from_the_stored_json() {
    let id = Uuid::new_v4();
    let schema = SchemaBuilder::build::<Invoice>().unwrap();
    let documents = vec![invoice(id, "first", "second", "third")];

    let records = StructureBuilder::build(&schema, &documents, None).unwrap();

    assert_eq!(
        records[0].json(),
        format!(
            "{{\"structure_id\":\"{id}\",\"value\":\"first\",\"nested_object\":{{\"value\":\"third\"}}}}"
        )
    );
    assert_eq!(records[0].id().to_string(), id.to_string());
}

#[test]
fn nil_guid_identifier_is_generated_locally() {
    let schema = SchemaBuilder::build::<Invoice>().unwrap();
    let documents = vec![invoice(Uuid::nil(), "a", "b", "c")];

    let records = StructureBuilder::build(&schema, &documents, None).unwrap();

    assert_ne!(records[0].id().to_string(), Uuid::nil().to_string());
    assert!(records[0]
        .json()
        .contains(&records[0].id().to_string()));
}

#[test]
fn type_without_identifier_cannot_be_built_into_records() {
    let schema = SchemaBuilder::build::<Note>().unwrap();
    let documents = vec![Note {
        value: "loose".to_owned(),
    }];

    let err = StructureBuilder::build(&schema, &documents, None).unwrap_err();

    assert!(matches!(
        err,
        StoreError::MissingIdentifier { type_name: "Note" }
    ));
}

#[test]
fn absent_members_project_typed_nulls() {
    let schema = SchemaBuilder::build::<Profile>().unwrap();
    let documents = vec![Profile {
        profile_id: 0,
        nickname: None,
        home: None,
    }];

    let records =
        StructureBuilder::build(&schema, &documents, Some(IdentityRange::new(1, 1))).unwrap();

    assert_eq!(
        records[0].index_values(),
        &[
            DacValue::Text(None),
            DacValue::Text(None),
            DacValue::Text(None),
        ]
    );
}

#[test]
fn unique_paths_are_a_subset_of_the_indexable_set() {
    let schema = SchemaBuilder::build::<Account>().unwrap();

    let uniques = schema
        .unique_properties()
        .map(|p| p.path())
        .collect::<Vec<_>>();

    assert_eq!(uniques, vec!["email"]);
    assert!(schema
        .indexable_properties()
        .iter()
        .any(|p| p.path() == "email" && p.kind() == ValueKind::Scalar(strukt_store::schema::ScalarKind::Text)));

    let documents = vec![Account {
        account_id: 0,
        email: "ops@example.org".to_owned(),
    }];
    let records =
        StructureBuilder::build(&schema, &documents, Some(IdentityRange::new(1, 1))).unwrap();

    assert_eq!(
        records[0].unique_values(),
        &[DacValue::from("ops@example.org")]
    );
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
enum Tier {
    Basic,
    Premium,
}

strukt_store::enumeration!(Tier);

strukt_store::structure! {
    struct Plan {
        plan_id: i64,
        tier: Tier,
    }
}

#[test]
fn enumerations_terminate_recursion_and_project_their_text() {
    let schema = SchemaBuilder::build::<Plan>().unwrap();

    assert_eq!(schema.indexable_properties().len(), 1);
    assert_eq!(schema.indexable_properties()[0].path(), "tier");
    assert_eq!(
        schema.indexable_properties()[0].kind(),
        ValueKind::Enumeration
    );

    let documents = vec![Plan {
        plan_id: 0,
        tier: Tier::Premium,
    }];
    let records =
        StructureBuilder::build(&schema, &documents, Some(IdentityRange::new(1, 1))).unwrap();

    assert_eq!(records[0].index_values(), &[DacValue::from("Premium")]);
}

#[test]
fn a_short_identity_range_is_rejected() {
    let schema = SchemaBuilder::build::<Order>().unwrap();
    let documents = vec![
        order("A-1", 1.0, "Lund"),
        order("A-2", 2.0, "Malmö"),
    ];

    let err =
        StructureBuilder::build(&schema, &documents, Some(IdentityRange::new(1, 1))).unwrap_err();

    assert!(matches!(err, StoreError::ContractViolation(_)));
}
