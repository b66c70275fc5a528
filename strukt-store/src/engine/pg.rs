use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use sqlx::postgres::{PgArguments, PgQueryResult, PgRow};
use sqlx::query::{Query, QueryAs, QueryScalar};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tokio::sync::Mutex;
use uuid::Uuid;

use strukt_query::{DacValue, SqlQuery};

use crate::bulk::{BulkOptions, BulkRows, DbBulkCopy};
use crate::client::{quote_ident, DbClient, JsonStream};
use crate::error::{Result, StoreError};
use crate::id::{StructureId, StructureIdType};
use crate::manager::SchemaManager;
use crate::provider::{ProviderFactory, StorageProvider};
use crate::schema::{ScalarKind, StructureSchema, ValueKind};

const JSON_PAGE_SIZE: i64 = 100;

/// Composition root for the full SQL backend.
///
/// The cloud variant shares the client and dialect and differs only in its
/// provider tag, the way the original cloud provider rode on its full-SQL
/// sibling.
pub struct PgProviderFactory {
    pool: PgPool,
    provider: StorageProvider,
}

impl PgProviderFactory {
    pub fn new(pool: &PgPool) -> Self {
        Self {
            pool: pool.clone(),
            provider: StorageProvider::Pg,
        }
    }

    pub fn cloud(pool: &PgPool) -> Self {
        Self {
            pool: pool.clone(),
            provider: StorageProvider::PgCloud,
        }
    }
}

#[async_trait]
impl ProviderFactory for PgProviderFactory {
    fn provider(&self) -> StorageProvider {
        self.provider
    }

    fn client(&self) -> Arc<dyn DbClient> {
        Arc::new(PgClient {
            exec: PgExec::Pool(self.pool.clone()),
            provider: self.provider,
        })
    }

    async fn begin_client(&self) -> Result<Arc<dyn DbClient>> {
        let tx = self.pool.begin().await?;

        Ok(Arc::new(PgClient {
            exec: PgExec::Tx(Arc::new(Mutex::new(Some(tx)))),
            provider: self.provider,
        }))
    }

    fn schema_manager(&self) -> Arc<dyn SchemaManager> {
        Arc::new(PgSchemaManager {
            pool: self.pool.clone(),
        })
    }
}

type SharedTx = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

#[derive(Clone)]
enum PgExec {
    Pool(PgPool),
    Tx(SharedTx),
}

impl PgExec {
    async fn execute(&self, query: Query<'_, Postgres, PgArguments>) -> Result<PgQueryResult> {
        match self {
            Self::Pool(pool) => Ok(query.execute(pool).await?),
            Self::Tx(tx) => {
                let mut guard = tx.lock().await;
                let tx = guard.as_mut().ok_or(StoreError::ContractViolation(
                    "the transaction is already completed",
                ))?;

                Ok(query.execute(&mut **tx).await?)
            }
        }
    }

    async fn fetch_one_scalar<T>(
        &self,
        query: QueryScalar<'_, Postgres, T, PgArguments>,
    ) -> Result<T>
    where
        T: Send + Unpin + for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    {
        match self {
            Self::Pool(pool) => Ok(query.fetch_one(pool).await?),
            Self::Tx(tx) => {
                let mut guard = tx.lock().await;
                let tx = guard.as_mut().ok_or(StoreError::ContractViolation(
                    "the transaction is already completed",
                ))?;

                Ok(query.fetch_one(&mut **tx).await?)
            }
        }
    }

    async fn fetch_optional_scalar<T>(
        &self,
        query: QueryScalar<'_, Postgres, T, PgArguments>,
    ) -> Result<Option<T>>
    where
        T: Send + Unpin + for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    {
        match self {
            Self::Pool(pool) => Ok(query.fetch_optional(pool).await?),
            Self::Tx(tx) => {
                let mut guard = tx.lock().await;
                let tx = guard.as_mut().ok_or(StoreError::ContractViolation(
                    "the transaction is already completed",
                ))?;

                Ok(query.fetch_optional(&mut **tx).await?)
            }
        }
    }

    async fn fetch_all_scalar<T>(
        &self,
        query: QueryScalar<'_, Postgres, T, PgArguments>,
    ) -> Result<Vec<T>>
    where
        T: Send + Unpin + for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    {
        match self {
            Self::Pool(pool) => Ok(query.fetch_all(pool).await?),
            Self::Tx(tx) => {
                let mut guard = tx.lock().await;
                let tx = guard.as_mut().ok_or(StoreError::ContractViolation(
                    "the transaction is already completed",
                ))?;

                Ok(query.fetch_all(&mut **tx).await?)
            }
        }
    }

    async fn fetch_all<T>(&self, query: QueryAs<'_, Postgres, T, PgArguments>) -> Result<Vec<T>>
    where
        T: Send + Unpin + for<'r> sqlx::FromRow<'r, PgRow>,
    {
        match self {
            Self::Pool(pool) => Ok(query.fetch_all(pool).await?),
            Self::Tx(tx) => {
                let mut guard = tx.lock().await;
                let tx = guard.as_mut().ok_or(StoreError::ContractViolation(
                    "the transaction is already completed",
                ))?;

                Ok(query.fetch_all(&mut **tx).await?)
            }
        }
    }
}

/// The full-SQL data access client.
pub struct PgClient {
    exec: PgExec,
    provider: StorageProvider,
}

#[async_trait]
impl DbClient for PgClient {
    fn provider(&self) -> StorageProvider {
        self.provider
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        if name.trim().is_empty() {
            return Err(StoreError::ContractViolation("the table name is required"));
        }

        let count = self
            .exec
            .fetch_one_scalar(
                sqlx::query_scalar::<_, i64>(statements::TABLE_EXISTS).bind(name),
            )
            .await?;

        Ok(count > 0)
    }

    async fn row_count(&self, schema: &StructureSchema) -> Result<i64> {
        let sql = statements::row_count(schema);

        self.exec
            .fetch_one_scalar(sqlx::query_scalar::<_, i64>(&sql))
            .await
    }

    async fn row_count_by_query(
        &self,
        schema: &StructureSchema,
        query: &SqlQuery,
    ) -> Result<i64> {
        let sql = statements::row_count_by_query(schema, query.sql());
        let mut q = sqlx::query_scalar::<_, i64>(&sql);

        for parameter in query.parameters() {
            q = bind_dac_scalar(q, parameter.value());
        }

        self.exec.fetch_one_scalar(q).await
    }

    async fn check_out_and_get_next_identity(
        &self,
        type_hash: &str,
        num_of_ids: u32,
    ) -> Result<i64> {
        if type_hash.trim().is_empty() {
            return Err(StoreError::ContractViolation("the type hash is required"));
        }

        self.exec
            .execute(sqlx::query(statements::CREATE_IDENTITIES_TABLE))
            .await?;

        self.exec
            .fetch_one_scalar(
                sqlx::query_scalar::<_, i64>(statements::CHECK_OUT_IDENTITY)
                    .bind(type_hash)
                    .bind(i64::from(num_of_ids)),
            )
            .await
    }

    async fn get_json_by_id(
        &self,
        id: StructureId,
        schema: &StructureSchema,
    ) -> Result<Option<String>> {
        let sql = statements::get_json_by_id(schema);
        let q = sqlx::query_scalar::<_, String>(&sql);
        let q = match id {
            StructureId::Int(v) => q.bind(v),
            StructureId::Guid(v) => q.bind(v),
        };

        self.exec.fetch_optional_scalar(q).await
    }

    async fn get_json(&self, schema: &StructureSchema) -> Result<JsonStream> {
        stream_json(self.exec.clone(), schema, None)
    }

    async fn get_json_by_ids(
        &self,
        ids: &[StructureId],
        id_type: StructureIdType,
        schema: &StructureSchema,
    ) -> Result<JsonStream> {
        let sql = statements::get_json_by_ids(schema);
        let exec = self.exec.clone();

        match id_type {
            StructureIdType::Integer => {
                let chunks = int_chunks(ids)?;

                Ok(stream::try_unfold(
                    (exec, sql, chunks),
                    |(exec, sql, mut chunks)| async move {
                        let Some(chunk) = chunks.pop_front() else {
                            return Ok::<_, StoreError>(None);
                        };

                        let rows = exec
                            .fetch_all_scalar(
                                sqlx::query_scalar::<_, String>(&sql).bind(chunk),
                            )
                            .await?;

                        Ok(Some((
                            stream::iter(rows.into_iter().map(Ok)),
                            (exec, sql, chunks),
                        )))
                    },
                )
                .try_flatten()
                .boxed())
            }
            StructureIdType::Guid => {
                let chunks = guid_chunks(ids)?;

                Ok(stream::try_unfold(
                    (exec, sql, chunks),
                    |(exec, sql, mut chunks)| async move {
                        let Some(chunk) = chunks.pop_front() else {
                            return Ok::<_, StoreError>(None);
                        };

                        let rows = exec
                            .fetch_all_scalar(
                                sqlx::query_scalar::<_, String>(&sql).bind(chunk),
                            )
                            .await?;

                        Ok(Some((
                            stream::iter(rows.into_iter().map(Ok)),
                            (exec, sql, chunks),
                        )))
                    },
                )
                .try_flatten()
                .boxed())
            }
        }
    }

    async fn get_json_where_id_is_between(
        &self,
        id_from: StructureId,
        id_to: StructureId,
        schema: &StructureSchema,
    ) -> Result<JsonStream> {
        stream_json(self.exec.clone(), schema, Some((id_from, id_to)))
    }

    async fn delete_by_id(&self, id: StructureId, schema: &StructureSchema) -> Result<()> {
        let sql = statements::delete_by_id(schema);
        let q = sqlx::query(&sql);
        let q = match id {
            StructureId::Int(v) => q.bind(v),
            StructureId::Guid(v) => q.bind(v),
        };

        self.exec.execute(q).await?;

        Ok(())
    }

    async fn delete_by_ids(
        &self,
        ids: &[StructureId],
        id_type: StructureIdType,
        schema: &StructureSchema,
    ) -> Result<()> {
        let sql = statements::delete_by_ids(schema);
        let q = sqlx::query(&sql);
        let q = match id_type {
            StructureIdType::Integer => q.bind(
                ids.iter()
                    .map(|id| id.as_int())
                    .collect::<Result<Vec<_>>>()?,
            ),
            StructureIdType::Guid => q.bind(
                ids.iter()
                    .map(|id| id.as_guid())
                    .collect::<Result<Vec<_>>>()?,
            ),
        };

        self.exec.execute(q).await?;

        Ok(())
    }

    async fn delete_by_query(&self, schema: &StructureSchema, query: &SqlQuery) -> Result<()> {
        let sql = statements::delete_by_query(schema, query.sql());
        let mut q = sqlx::query(&sql);

        for parameter in query.parameters() {
            q = bind_dac(q, parameter.value());
        }

        self.exec.execute(q).await?;

        Ok(())
    }

    async fn delete_where_id_is_between(
        &self,
        id_from: StructureId,
        id_to: StructureId,
        schema: &StructureSchema,
    ) -> Result<()> {
        let sql = statements::delete_where_id_is_between(schema);
        let q = sqlx::query(&sql);
        let q = match (id_from, id_to) {
            (StructureId::Int(from), StructureId::Int(to)) => q.bind(from).bind(to),
            (StructureId::Guid(from), StructureId::Guid(to)) => q.bind(from).bind(to),
            _ => {
                return Err(StoreError::ContractViolation(
                    "range bounds must share one identifier kind",
                ))
            }
        };

        self.exec.execute(q).await?;

        Ok(())
    }

    async fn rebuild_indexes(&self, schema: &StructureSchema) -> Result<()> {
        tracing::debug!(table = schema.indexes_table_name(), "rebuilding indexes");

        let stmts = statements::rebuild_indexes(schema);

        match &self.exec {
            PgExec::Pool(pool) => {
                let mut tx = pool.begin().await?;

                for sql in &stmts {
                    sqlx::query(sql).execute(&mut *tx).await?;
                }

                tx.commit().await?;
            }
            PgExec::Tx(_) => {
                for sql in &stmts {
                    self.exec.execute(sqlx::query(sql)).await?;
                }
            }
        }

        Ok(())
    }

    async fn drop_structure_set(&self, schema: &StructureSchema) -> Result<()> {
        tracing::debug!(table = schema.structure_table_name(), "dropping structure set");

        for sql in statements::drop_structure_set(schema) {
            self.exec.execute(sqlx::query(&sql)).await?;
        }

        self.exec
            .execute(
                sqlx::query(statements::DELETE_IDENTITIES_ROW).bind(schema.hash().to_owned()),
            )
            .await?;

        Ok(())
    }

    fn bulk_copy(&self, options: BulkOptions) -> Result<Box<dyn DbBulkCopy>> {
        Ok(Box::new(PgBulkCopy {
            exec: self.exec.clone(),
            options,
            destination: None,
            mappings: Vec::new(),
        }))
    }

    async fn commit(&self) -> Result<()> {
        let PgExec::Tx(tx) = &self.exec else {
            return Ok(());
        };

        let tx = tx.lock().await.take().ok_or(StoreError::ContractViolation(
            "the transaction is already completed",
        ))?;

        tx.commit().await?;

        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let PgExec::Tx(tx) = &self.exec else {
            return Ok(());
        };

        let tx = tx.lock().await.take().ok_or(StoreError::ContractViolation(
            "the transaction is already completed",
        ))?;

        tx.rollback().await?;

        Ok(())
    }
}

struct PageState {
    exec: PgExec,
    sql_first: String,
    sql_next: String,
    id_type: StructureIdType,
    between: Option<(StructureId, StructureId)>,
    after: Option<StructureId>,
    done: bool,
}

fn stream_json(
    exec: PgExec,
    schema: &StructureSchema,
    between: Option<(StructureId, StructureId)>,
) -> Result<JsonStream> {
    let id_type = schema.id_type().ok_or(StoreError::MissingIdentifier {
        type_name: schema.name(),
    })?;

    let state = PageState {
        exec,
        sql_first: statements::json_page(schema, between.is_some(), false),
        sql_next: statements::json_page(schema, between.is_some(), true),
        id_type,
        between,
        after: None,
        done: false,
    };

    Ok(stream::try_unfold(state, |mut state| async move {
        if state.done {
            return Ok::<_, StoreError>(None);
        }

        let rows = fetch_json_page(&state).await?;

        if (rows.len() as i64) < JSON_PAGE_SIZE {
            state.done = true;
        }

        if rows.is_empty() {
            return Ok(None);
        }

        state.after = rows.last().map(|(id, _)| *id);

        Ok(Some((
            stream::iter(rows.into_iter().map(|(_, json)| Ok(json))),
            state,
        )))
    })
    .try_flatten()
    .boxed())
}

async fn fetch_json_page(state: &PageState) -> Result<Vec<(StructureId, String)>> {
    let sql = if state.after.is_some() {
        &state.sql_next
    } else {
        &state.sql_first
    };

    match state.id_type {
        StructureIdType::Integer => {
            let mut q = sqlx::query_as::<_, (i64, String)>(sql);

            if let Some((from, to)) = &state.between {
                q = q.bind(from.as_int()?).bind(to.as_int()?);
            }
            if let Some(after) = &state.after {
                q = q.bind(after.as_int()?);
            }
            q = q.bind(JSON_PAGE_SIZE);

            let rows = state.exec.fetch_all(q).await?;

            Ok(rows
                .into_iter()
                .map(|(id, json)| (StructureId::Int(id), json))
                .collect())
        }
        StructureIdType::Guid => {
            let mut q = sqlx::query_as::<_, (Uuid, String)>(sql);

            if let Some((from, to)) = &state.between {
                q = q.bind(from.as_guid()?).bind(to.as_guid()?);
            }
            if let Some(after) = &state.after {
                q = q.bind(after.as_guid()?);
            }
            q = q.bind(JSON_PAGE_SIZE);

            let rows = state.exec.fetch_all(q).await?;

            Ok(rows
                .into_iter()
                .map(|(id, json)| (StructureId::Guid(id), json))
                .collect())
        }
    }
}

fn int_chunks(ids: &[StructureId]) -> Result<VecDeque<Vec<i64>>> {
    let ids = ids
        .iter()
        .map(|id| id.as_int())
        .collect::<Result<Vec<_>>>()?;

    Ok(ids
        .chunks(JSON_PAGE_SIZE as usize)
        .map(|c| c.to_vec())
        .collect())
}

fn guid_chunks(ids: &[StructureId]) -> Result<VecDeque<Vec<Uuid>>> {
    let ids = ids
        .iter()
        .map(|id| id.as_guid())
        .collect::<Result<Vec<_>>>()?;

    Ok(ids
        .chunks(JSON_PAGE_SIZE as usize)
        .map(|c| c.to_vec())
        .collect())
}

fn bind_dac<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &DacValue,
) -> Query<'q, Postgres, PgArguments> {
    match value.clone() {
        DacValue::Int(v) => query.bind(v),
        DacValue::Float(v) => query.bind(v),
        DacValue::Bool(v) => query.bind(v),
        DacValue::Text(v) => query.bind(v),
        DacValue::DateTime(v) => query.bind(v),
        DacValue::Guid(v) => query.bind(v),
    }
}

fn bind_dac_scalar<'q, T>(
    query: QueryScalar<'q, Postgres, T, PgArguments>,
    value: &DacValue,
) -> QueryScalar<'q, Postgres, T, PgArguments> {
    match value.clone() {
        DacValue::Int(v) => query.bind(v),
        DacValue::Float(v) => query.bind(v),
        DacValue::Bool(v) => query.bind(v),
        DacValue::Text(v) => query.bind(v),
        DacValue::DateTime(v) => query.bind(v),
        DacValue::Guid(v) => query.bind(v),
    }
}

/// Multi-row insert writer batched over `QueryBuilder::push_values`.
pub struct PgBulkCopy {
    exec: PgExec,
    options: BulkOptions,
    destination: Option<String>,
    mappings: Vec<(String, String)>,
}

#[async_trait]
impl DbBulkCopy for PgBulkCopy {
    fn set_destination(&mut self, table_name: &str) -> Result<()> {
        if table_name.trim().is_empty() {
            return Err(StoreError::ContractViolation(
                "the destination table name is required",
            ));
        }

        self.destination = Some(table_name.to_owned());

        Ok(())
    }

    fn set_batch_size(&mut self, rows: usize) {
        self.options.batch_size = rows;
    }

    fn add_column_mapping(&mut self, source_field: &str, destination_column: &str) {
        self.mappings
            .push((source_field.to_owned(), destination_column.to_owned()));
    }

    async fn write(&mut self, rows: BulkRows) -> Result<()> {
        let destination = self.destination.clone().ok_or(StoreError::ContractViolation(
            "the destination table is required before writing",
        ))?;

        let mut mappings = self.mappings.clone();
        if !self.options.keep_identity {
            mappings.retain(|(_, destination)| destination != "id");
        }

        if mappings.is_empty() {
            return Err(StoreError::ContractViolation(
                "at least one column mapping is required",
            ));
        }

        let source_indexes = mappings
            .iter()
            .map(|(source, _)| {
                rows.column_index(source).ok_or(StoreError::ContractViolation(
                    "a mapped source field is missing from the row source",
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let head = format!(
            "INSERT INTO {} ({}) ",
            quote_ident(&destination),
            mappings
                .iter()
                .map(|(_, destination)| quote_ident(destination))
                .collect::<Vec<_>>()
                .join(", "),
        );

        let batch_size = match self.options.batch_size {
            0 => usize::MAX,
            n => n,
        };
        let keep_nulls = self.options.keep_nulls;

        let mut source = rows.into_rows();

        loop {
            let chunk = source.by_ref().take(batch_size).collect::<Vec<_>>();

            if chunk.is_empty() {
                break;
            }

            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(head.as_str());

            builder.push_values(chunk.iter(), |mut b, row| {
                for &index in &source_indexes {
                    let value = &row[index];

                    if !keep_nulls && value.is_null() {
                        b.push("DEFAULT");
                        continue;
                    }

                    match value.clone() {
                        DacValue::Int(v) => b.push_bind(v),
                        DacValue::Float(v) => b.push_bind(v),
                        DacValue::Bool(v) => b.push_bind(v),
                        DacValue::Text(v) => b.push_bind(v),
                        DacValue::DateTime(v) => b.push_bind(v),
                        DacValue::Guid(v) => b.push_bind(v),
                    };
                }
            });

            self.exec.execute(builder.build()).await?;

            if batch_size == usize::MAX {
                break;
            }
        }

        Ok(())
    }
}

/// Lazy table creation for the full SQL backend.
pub struct PgSchemaManager {
    pool: PgPool,
}

#[async_trait]
impl SchemaManager for PgSchemaManager {
    async fn ensure_structure_set(&self, schema: &StructureSchema) -> Result<()> {
        tracing::debug!(table = schema.structure_table_name(), "ensuring structure set");

        for sql in statements::create_structure_set(schema)? {
            sqlx::query(&sql).execute(&self.pool).await?;
        }

        Ok(())
    }
}

mod statements {
    use super::*;

    pub(super) const TABLE_EXISTS: &str = "SELECT COUNT(*) FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_name = $1";

    pub(super) const CREATE_IDENTITIES_TABLE: &str =
        "CREATE TABLE IF NOT EXISTS \"StruktIdentities\" \
         (\"type_hash\" text PRIMARY KEY, \"next_id\" bigint NOT NULL)";

    pub(super) const CHECK_OUT_IDENTITY: &str =
        "INSERT INTO \"StruktIdentities\" (\"type_hash\", \"next_id\") VALUES ($1, $2 + 1) \
         ON CONFLICT (\"type_hash\") DO UPDATE SET \"next_id\" = \"StruktIdentities\".\"next_id\" + $2 \
         RETURNING \"next_id\" - $2";

    pub(super) const DELETE_IDENTITIES_ROW: &str =
        "DELETE FROM \"StruktIdentities\" WHERE \"type_hash\" = $1";

    pub(super) fn row_count(schema: &StructureSchema) -> String {
        format!(
            "SELECT COUNT(*) FROM {}",
            quote_ident(schema.structure_table_name())
        )
    }

    pub(super) fn row_count_by_query(schema: &StructureSchema, fragment: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM {} WHERE {fragment}",
            quote_ident(schema.indexes_table_name())
        )
    }

    pub(super) fn get_json_by_id(schema: &StructureSchema) -> String {
        format!(
            "SELECT \"json\" FROM {} WHERE \"id\" = $1",
            quote_ident(schema.structure_table_name())
        )
    }

    pub(super) fn get_json_by_ids(schema: &StructureSchema) -> String {
        format!(
            "SELECT \"json\" FROM {} WHERE \"id\" = ANY($1) ORDER BY \"id\"",
            quote_ident(schema.structure_table_name())
        )
    }

    pub(super) fn json_page(schema: &StructureSchema, between: bool, after: bool) -> String {
        let mut sql = format!(
            "SELECT \"id\", \"json\" FROM {}",
            quote_ident(schema.structure_table_name())
        );
        let mut position = 1;
        let mut conditions = Vec::new();

        if between {
            conditions.push(format!(
                "\"id\" >= ${} AND \"id\" <= ${}",
                position,
                position + 1
            ));
            position += 2;
        }

        if after {
            conditions.push(format!("\"id\" > ${position}"));
            position += 1;
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        sql.push_str(&format!(" ORDER BY \"id\" LIMIT ${position}"));

        sql
    }

    pub(super) fn delete_by_id(schema: &StructureSchema) -> String {
        format!(
            "DELETE FROM {} WHERE \"id\" = $1",
            quote_ident(schema.structure_table_name())
        )
    }

    pub(super) fn delete_by_ids(schema: &StructureSchema) -> String {
        format!(
            "DELETE FROM {} WHERE \"id\" = ANY($1)",
            quote_ident(schema.structure_table_name())
        )
    }

    pub(super) fn delete_by_query(schema: &StructureSchema, fragment: &str) -> String {
        format!(
            "DELETE FROM {} WHERE \"id\" IN (SELECT \"structure_id\" FROM {} WHERE {fragment})",
            quote_ident(schema.structure_table_name()),
            quote_ident(schema.indexes_table_name())
        )
    }

    pub(super) fn delete_where_id_is_between(schema: &StructureSchema) -> String {
        format!(
            "DELETE FROM {} WHERE \"id\" >= $1 AND \"id\" <= $2",
            quote_ident(schema.structure_table_name())
        )
    }

    pub(super) fn rebuild_indexes(schema: &StructureSchema) -> Vec<String> {
        let mut stmts = Vec::new();

        if !schema.indexable_properties().is_empty() {
            stmts.push(format!(
                "DELETE FROM {}",
                quote_ident(schema.indexes_table_name())
            ));
            stmts.push(repopulate(
                schema.indexes_table_name(),
                schema.structure_table_name(),
                schema.indexable_properties().iter(),
            ));
        }

        if schema.has_uniques() {
            stmts.push(format!(
                "DELETE FROM {}",
                quote_ident(schema.uniques_table_name())
            ));
            stmts.push(repopulate(
                schema.uniques_table_name(),
                schema.structure_table_name(),
                schema.unique_properties(),
            ));
        }

        stmts
    }

    fn repopulate<'a>(
        destination: &str,
        source: &str,
        properties: impl Iterator<Item = &'a crate::schema::IndexableProperty>,
    ) -> String {
        let mut columns = vec!["\"structure_id\"".to_owned()];
        let mut projections = vec!["\"id\"".to_owned()];

        for property in properties {
            columns.push(quote_ident(property.path()));
            projections.push(projection(property.path(), property.kind()));
        }

        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote_ident(destination),
            columns.join(", "),
            projections.join(", "),
            quote_ident(source)
        )
    }

    fn projection(path: &str, kind: ValueKind) -> String {
        let segments = path.split('.').collect::<Vec<_>>().join(",");
        let extract = format!("(\"json\"::jsonb #>> '{{{segments}}}')");

        match kind {
            ValueKind::Scalar(ScalarKind::Int) => format!("{extract}::bigint"),
            ValueKind::Scalar(ScalarKind::Float) => format!("{extract}::double precision"),
            ValueKind::Scalar(ScalarKind::Bool) => format!("{extract}::boolean"),
            ValueKind::Scalar(ScalarKind::DateTime) => format!("{extract}::timestamptz"),
            ValueKind::Scalar(ScalarKind::Guid) => format!("{extract}::uuid"),
            ValueKind::Scalar(ScalarKind::Text)
            | ValueKind::Enumeration
            | ValueKind::Collection(_) => extract,
        }
    }

    pub(super) fn drop_structure_set(schema: &StructureSchema) -> Vec<String> {
        vec![
            format!(
                "DROP TABLE IF EXISTS {}",
                quote_ident(schema.uniques_table_name())
            ),
            format!(
                "DROP TABLE IF EXISTS {}",
                quote_ident(schema.indexes_table_name())
            ),
            format!(
                "DROP TABLE IF EXISTS {}",
                quote_ident(schema.structure_table_name())
            ),
            CREATE_IDENTITIES_TABLE.to_owned(),
        ]
    }

    pub(super) fn create_structure_set(schema: &StructureSchema) -> Result<Vec<String>> {
        let id_type = schema.id_type().ok_or(StoreError::MissingIdentifier {
            type_name: schema.name(),
        })?;

        let (id_column, fk_type) = match id_type {
            StructureIdType::Integer => (
                "\"id\" bigint GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY",
                "bigint",
            ),
            StructureIdType::Guid => ("\"id\" uuid PRIMARY KEY", "uuid"),
        };

        let structure = quote_ident(schema.structure_table_name());
        let mut stmts = vec![
            CREATE_IDENTITIES_TABLE.to_owned(),
            format!(
                "CREATE TABLE IF NOT EXISTS {structure} ({id_column}, \"json\" text NOT NULL)"
            ),
        ];

        let mut indexes_columns = vec![format!(
            "\"structure_id\" {fk_type} NOT NULL REFERENCES {structure} (\"id\") ON DELETE CASCADE"
        )];
        for property in schema.indexable_properties() {
            indexes_columns.push(format!(
                "{} {}",
                quote_ident(property.path()),
                column_type(property.kind())
            ));
        }
        stmts.push(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(schema.indexes_table_name()),
            indexes_columns.join(", ")
        ));

        let mut uniques_columns = vec![format!(
            "\"structure_id\" {fk_type} NOT NULL REFERENCES {structure} (\"id\") ON DELETE CASCADE"
        )];
        for property in schema.unique_properties() {
            uniques_columns.push(format!(
                "{} {} UNIQUE",
                quote_ident(property.path()),
                column_type(property.kind())
            ));
        }
        stmts.push(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(schema.uniques_table_name()),
            uniques_columns.join(", ")
        ));

        Ok(stmts)
    }

    fn column_type(kind: ValueKind) -> &'static str {
        match kind {
            ValueKind::Scalar(ScalarKind::Int) => "bigint",
            ValueKind::Scalar(ScalarKind::Float) => "double precision",
            ValueKind::Scalar(ScalarKind::Bool) => "boolean",
            ValueKind::Scalar(ScalarKind::DateTime) => "timestamptz",
            ValueKind::Scalar(ScalarKind::Guid) => "uuid",
            ValueKind::Scalar(ScalarKind::Text)
            | ValueKind::Enumeration
            | ValueKind::Collection(_) => "text",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;

    crate::structure! {
        struct Parcel {
            parcel_id: i64,
            weight: f64,
            destination: ParcelDestination,
        }
    }

    crate::structure! {
        struct ParcelDestination {
            city: String,
            priority: bool,
        }
    }

    fn schema() -> StructureSchema {
        SchemaBuilder::build::<Parcel>().unwrap()
    }

    #[test]
    fn delete_by_query_wraps_the_fragment() {
        let sql = statements::delete_by_query(&schema(), "\"weight\" > $1");

        assert_eq!(
            sql,
            "DELETE FROM \"ParcelStructure\" WHERE \"id\" IN \
             (SELECT \"structure_id\" FROM \"ParcelIndexes\" WHERE \"weight\" > $1)"
        );
    }

    #[test]
    fn json_page_numbers_parameters_in_bind_order() {
        assert_eq!(
            statements::json_page(&schema(), true, true),
            "SELECT \"id\", \"json\" FROM \"ParcelStructure\" \
             WHERE \"id\" >= $1 AND \"id\" <= $2 AND \"id\" > $3 ORDER BY \"id\" LIMIT $4"
        );
        assert_eq!(
            statements::json_page(&schema(), false, false),
            "SELECT \"id\", \"json\" FROM \"ParcelStructure\" ORDER BY \"id\" LIMIT $1"
        );
    }

    #[test]
    fn rebuild_projects_each_indexable_path() {
        let stmts = statements::rebuild_indexes(&schema());

        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "DELETE FROM \"ParcelIndexes\"");
        assert_eq!(
            stmts[1],
            "INSERT INTO \"ParcelIndexes\" (\"structure_id\", \"weight\", \
             \"destination.city\", \"destination.priority\") \
             SELECT \"id\", (\"json\"::jsonb #>> '{weight}')::double precision, \
             (\"json\"::jsonb #>> '{destination,city}'), \
             (\"json\"::jsonb #>> '{destination,priority}')::boolean FROM \"ParcelStructure\""
        );
    }

    #[test]
    fn create_structure_set_declares_cascading_foreign_keys() {
        let stmts = statements::create_structure_set(&schema()).unwrap();

        assert!(stmts[2].contains(
            "\"structure_id\" bigint NOT NULL REFERENCES \"ParcelStructure\" (\"id\") \
             ON DELETE CASCADE"
        ));
        assert!(stmts[2].contains("\"destination.city\" text"));
    }
}
