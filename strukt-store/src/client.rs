use async_trait::async_trait;
use futures_util::stream::BoxStream;
use strukt_query::SqlQuery;

use crate::bulk::{BulkOptions, DbBulkCopy};
use crate::error::Result;
use crate::id::{StructureId, StructureIdType};
use crate::provider::StorageProvider;
use crate::schema::StructureSchema;

/// The shared identity-allocation bookkeeping table, one counter row per
/// type-hash.
pub const IDENTITIES_TABLE_NAME: &str = "StruktIdentities";

/// A single-pass, forward-only sequence of JSON documents.
///
/// Backed by completed page queries rather than a held server cursor, so
/// dropping the stream early releases everything.
pub type JsonStream = BoxStream<'static, Result<String>>;

/// Executes schema-bound CRUD for one provider against an open connection,
/// optionally inside an ambient transaction.
///
/// All statements are parameterized; table and column names come only from
/// the trusted [`StructureSchema`](crate::schema::StructureSchema), never
/// from caller input. Execution failures propagate unmodified — no retries
/// happen here. An operation the provider cannot implement fails with
/// [`StoreError::NotSupportedByProvider`](crate::StoreError::NotSupportedByProvider)
/// naming both sides.
#[async_trait]
pub trait DbClient: Send + Sync {
    fn provider(&self) -> StorageProvider;

    async fn table_exists(&self, name: &str) -> Result<bool>;

    async fn row_count(&self, schema: &StructureSchema) -> Result<i64>;

    async fn row_count_by_query(&self, schema: &StructureSchema, query: &SqlQuery)
        -> Result<i64>;

    /// Atomically reserves `num_of_ids` consecutive integer identifiers for
    /// `type_hash` and returns the first.
    async fn check_out_and_get_next_identity(
        &self,
        type_hash: &str,
        num_of_ids: u32,
    ) -> Result<i64>;

    async fn get_json_by_id(
        &self,
        id: StructureId,
        schema: &StructureSchema,
    ) -> Result<Option<String>>;

    async fn get_json(&self, schema: &StructureSchema) -> Result<JsonStream>;

    async fn get_json_by_ids(
        &self,
        ids: &[StructureId],
        id_type: StructureIdType,
        schema: &StructureSchema,
    ) -> Result<JsonStream>;

    /// Inclusive range scan ordered by identifier ascending.
    async fn get_json_where_id_is_between(
        &self,
        id_from: StructureId,
        id_to: StructureId,
        schema: &StructureSchema,
    ) -> Result<JsonStream>;

    async fn delete_by_id(&self, id: StructureId, schema: &StructureSchema) -> Result<()>;

    async fn delete_by_ids(
        &self,
        ids: &[StructureId],
        id_type: StructureIdType,
        schema: &StructureSchema,
    ) -> Result<()>;

    /// Deletes the structures whose index rows match the fragment; index and
    /// unique rows follow through their foreign keys.
    async fn delete_by_query(&self, schema: &StructureSchema, query: &SqlQuery) -> Result<()>;

    async fn delete_where_id_is_between(
        &self,
        id_from: StructureId,
        id_to: StructureId,
        schema: &StructureSchema,
    ) -> Result<()>;

    /// Repopulates the index and unique tables from the structure table's
    /// current documents.
    async fn rebuild_indexes(&self, schema: &StructureSchema) -> Result<()>;

    /// Drops the structure set's tables, each only if it exists, and removes
    /// the type's identity bookkeeping row. Idempotent.
    async fn drop_structure_set(&self, schema: &StructureSchema) -> Result<()>;

    fn bulk_copy(&self, options: BulkOptions) -> Result<Box<dyn DbBulkCopy>>;

    /// Commits the ambient transaction; a no-op on non-transactional
    /// clients.
    async fn commit(&self) -> Result<()>;

    /// Rolls back the ambient transaction; a no-op on non-transactional
    /// clients.
    async fn rollback(&self) -> Result<()>;
}

/// Quotes an identifier for inlining into a statement template. Index
/// columns carry dotted names, so quoting is unconditional.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
