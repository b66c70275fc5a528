#![cfg(feature = "sqlite")]

mod common;

use futures_util::TryStreamExt;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use strukt_store::schema::{SchemaBuilder, StructureSchema};
use strukt_store::{
    DacParameter, DbClient, ProviderFactory, SchemaManager, SqlQuery, SqliteProviderFactory,
    StorageProvider, StoreError, StructureBuilder, StructureId,
};
use uuid::Uuid;

use crate::common::{invoice, order, Account, Invoice, Order, Profile};

async fn pool() -> SqlitePool {
    // One connection, or every pooled connection gets its own `:memory:` db.
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

async fn setup<T: strukt_store::schema::Structure>() -> (SqliteProviderFactory, StructureSchema) {
    let factory = SqliteProviderFactory::new(&pool().await);
    let schema = SchemaBuilder::build::<T>().unwrap();

    factory
        .schema_manager()
        .ensure_structure_set(&schema)
        .await
        .unwrap();

    (factory, schema)
}

async fn insert_orders(
    factory: &SqliteProviderFactory,
    schema: &StructureSchema,
    count: u32,
) {
    let client = factory.client();
    let generator = factory.identity_generator(client.clone());
    let range = generator.check_out(schema, count).await.unwrap();

    let documents = (0..count)
        .map(|i| order(&format!("A-{i}"), f64::from(i) + 0.5, "Kiruna"))
        .collect::<Vec<_>>();
    let records = StructureBuilder::build(schema, &documents, Some(range)).unwrap();

    factory
        .structure_inserter(client)
        .insert(schema, &records)
        .await
        .unwrap();
}

#[tokio::test]
async fn ensure_creates_the_three_tables_lazily() {
    let (factory, schema) = setup::<Order>().await;
    let client = factory.client();

    assert_eq!(factory.provider(), StorageProvider::Sqlite);
    assert!(client.table_exists("OrderStructure").await.unwrap());
    assert!(client.table_exists("OrderIndexes").await.unwrap());
    assert!(client.table_exists("OrderUniques").await.unwrap());
    assert!(client.table_exists("StruktIdentities").await.unwrap());
    assert_eq!(client.row_count(&schema).await.unwrap(), 0);
}

#[tokio::test]
async fn inserted_json_round_trips_byte_identical() {
    let (factory, schema) = setup::<Order>().await;
    let client = factory.client();
    let generator = factory.identity_generator(client.clone());

    let documents = vec![order("B-7", 249.5, "Luleå")];
    let range = generator.check_out(&schema, 1).await.unwrap();
    let records = StructureBuilder::build(&schema, &documents, Some(range)).unwrap();

    factory
        .structure_inserter(client.clone())
        .insert(&schema, &records)
        .await
        .unwrap();

    let json = client
        .get_json_by_id(records[0].id(), &schema)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(json, records[0].json());
    assert!(client
        .get_json_by_id(StructureId::Int(999), &schema)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn streamed_documents_are_ordered_by_identifier() {
    let (factory, schema) = setup::<Order>().await;

    insert_orders(&factory, &schema, 5).await;

    let all = factory
        .client()
        .get_json(&schema)
        .await
        .unwrap()
        .try_collect::<Vec<_>>()
        .await
        .unwrap();

    assert_eq!(all.len(), 5);
    assert!(all[0].starts_with("{\"order_id\":1,"));
    assert!(all[4].starts_with("{\"order_id\":5,"));
}

#[tokio::test]
async fn range_reads_and_deletes_are_inclusive() {
    let (factory, schema) = setup::<Order>().await;

    insert_orders(&factory, &schema, 5).await;

    let client = factory.client();
    let ranged = client
        .get_json_where_id_is_between(StructureId::Int(2), StructureId::Int(4), &schema)
        .await
        .unwrap()
        .try_collect::<Vec<_>>()
        .await
        .unwrap();

    assert_eq!(ranged.len(), 3);
    assert!(ranged[0].starts_with("{\"order_id\":2,"));

    client
        .delete_where_id_is_between(StructureId::Int(2), StructureId::Int(4), &schema)
        .await
        .unwrap();

    assert_eq!(client.row_count(&schema).await.unwrap(), 2);

    let count_query = SqlQuery::plain("1 = 1");
    assert_eq!(
        client.row_count_by_query(&schema, &count_query).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn by_ids_operations_are_a_capability_gap() {
    let (factory, schema) = setup::<Order>().await;
    let client = factory.client();
    let ids = [StructureId::Int(1), StructureId::Int(2)];

    let err = client
        .get_json_by_ids(&ids, strukt_store::StructureIdType::Integer, &schema)
        .await
        .err()
        .unwrap();

    assert!(matches!(
        err,
        StoreError::NotSupportedByProvider {
            provider: StorageProvider::Sqlite,
            operation: "get_json_by_ids",
        }
    ));

    let err = client
        .delete_by_ids(&ids, strukt_store::StructureIdType::Integer, &schema)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StoreError::NotSupportedByProvider {
            provider: StorageProvider::Sqlite,
            operation: "delete_by_ids",
        }
    ));
}

#[tokio::test]
async fn delete_by_query_clears_matches_and_their_projections() {
    let (factory, schema) = setup::<Order>().await;

    insert_orders(&factory, &schema, 4).await;

    let client = factory.client();
    let query = SqlQuery::new(
        "\"reference\" = ?",
        vec![DacParameter::new("reference", "A-2")],
    );

    client.delete_by_query(&schema, &query).await.unwrap();

    assert_eq!(client.row_count(&schema).await.unwrap(), 3);
    assert_eq!(
        client
            .row_count_by_query(&schema, &SqlQuery::plain("1 = 1"))
            .await
            .unwrap(),
        3
    );
}

#[tokio::test]
async fn rebuild_indexes_repopulates_the_projection() {
    let (factory, schema) = setup::<Order>().await;

    insert_orders(&factory, &schema, 3).await;

    let client = factory.client();

    client.rebuild_indexes(&schema).await.unwrap();

    assert_eq!(
        client
            .row_count_by_query(&schema, &SqlQuery::plain("1 = 1"))
            .await
            .unwrap(),
        3
    );
    assert_eq!(
        client
            .row_count_by_query(
                &schema,
                &SqlQuery::new(
                    "\"shipping.city\" = ?",
                    vec![DacParameter::new("city", "Kiruna")]
                )
            )
            .await
            .unwrap(),
        3
    );
}

#[tokio::test]
async fn drop_structure_set_is_idempotent() {
    let (factory, schema) = setup::<Order>().await;

    insert_orders(&factory, &schema, 1).await;

    let client = factory.client();

    client.drop_structure_set(&schema).await.unwrap();
    client.drop_structure_set(&schema).await.unwrap();

    assert!(!client.table_exists("OrderStructure").await.unwrap());
    assert!(!client.table_exists("OrderIndexes").await.unwrap());
}

#[tokio::test]
async fn identity_checkout_is_monotonic_and_gap_tolerant() {
    let (factory, schema) = setup::<Order>().await;
    let client = factory.client();
    let generator = factory.identity_generator(client.clone());

    let first = generator.check_out(&schema, 5).await.unwrap();
    let second = generator.check_out(&schema, 3).await.unwrap();

    assert_eq!(first.first(), 1);
    assert_eq!(second.first(), 6);

    // An abandoned range leaves a gap, it is never reissued.
    let third = generator.check_out(&schema, 10).await.unwrap();

    assert_eq!(third.first(), 9);
}

#[tokio::test]
async fn rolled_back_transactions_leave_no_rows() {
    let (factory, schema) = setup::<Order>().await;

    let tx_client = factory.begin_client().await.unwrap();
    let range = factory
        .identity_generator(tx_client.clone())
        .check_out(&schema, 1)
        .await
        .unwrap();
    let records =
        StructureBuilder::build(&schema, &[order("TX-1", 1.0, "Visby")], Some(range)).unwrap();

    factory
        .structure_inserter(tx_client.clone())
        .insert(&schema, &records)
        .await
        .unwrap();

    tx_client.rollback().await.unwrap();

    assert_eq!(factory.client().row_count(&schema).await.unwrap(), 0);
}

#[tokio::test]
async fn committed_transactions_are_visible() {
    let (factory, schema) = setup::<Order>().await;

    let tx_client = factory.begin_client().await.unwrap();
    let range = factory
        .identity_generator(tx_client.clone())
        .check_out(&schema, 1)
        .await
        .unwrap();
    let records =
        StructureBuilder::build(&schema, &[order("TX-2", 2.0, "Ystad")], Some(range)).unwrap();

    factory
        .structure_inserter(tx_client.clone())
        .insert(&schema, &records)
        .await
        .unwrap();

    tx_client.commit().await.unwrap();

    assert_eq!(factory.client().row_count(&schema).await.unwrap(), 1);
}

#[tokio::test]
async fn guid_keyed_structures_round_trip_without_their_nested_structure() {
    let (factory, schema) = setup::<Invoice>().await;
    let client = factory.client();

    let id = Uuid::new_v4();
    let records = StructureBuilder::build(
        &schema,
        &[invoice(id, "first", "second", "third")],
        None,
    )
    .unwrap();

    factory
        .structure_inserter(client.clone())
        .insert(&schema, &records)
        .await
        .unwrap();

    let json = client
        .get_json_by_id(StructureId::Guid(id), &schema)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        json,
        format!(
            "{{\"structure_id\":\"{id}\",\"value\":\"first\",\"nested_object\":{{\"value\":\"third\"}}}}"
        )
    );
    assert!(!json.contains("second"));
    assert_eq!(
        client
            .row_count_by_query(&schema, &SqlQuery::plain("1 = 1"))
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn optional_members_persist_as_nulls() {
    let (factory, schema) = setup::<Profile>().await;
    let client = factory.client();

    let range = factory
        .identity_generator(client.clone())
        .check_out(&schema, 1)
        .await
        .unwrap();
    let records = StructureBuilder::build(
        &schema,
        &[Profile {
            profile_id: 0,
            nickname: None,
            home: None,
        }],
        Some(range),
    )
    .unwrap();

    factory
        .structure_inserter(client.clone())
        .insert(&schema, &records)
        .await
        .unwrap();

    assert_eq!(
        client
            .row_count_by_query(&schema, &SqlQuery::plain("\"nickname\" IS NULL"))
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn duplicate_unique_values_are_rejected_by_the_backend() {
    let (factory, schema) = setup::<Account>().await;
    let client = factory.client();

    let range = factory
        .identity_generator(client.clone())
        .check_out(&schema, 2)
        .await
        .unwrap();
    let records = StructureBuilder::build(
        &schema,
        &[
            Account {
                account_id: 0,
                email: "a@example.org".to_owned(),
            },
            Account {
                account_id: 0,
                email: "a@example.org".to_owned(),
            },
        ],
        Some(range),
    )
    .unwrap();

    let err = factory
        .structure_inserter(client)
        .insert(&schema, &records)
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Sqlx(_)));
}
