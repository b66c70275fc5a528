use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use sqlx::query::{Query, QueryAs, QueryScalar};
use sqlx::sqlite::{SqliteArguments, SqliteQueryResult, SqliteRow};
use sqlx::{Sqlite, SqlitePool, QueryBuilder, Transaction};
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

/// Composition root for the constrained embedded engine.
pub struct SqliteProviderFactory {
    pool: SqlitePool,
}

impl SqliteProviderFactory {
    pub fn new(pool: &SqlitePool) -> Self {
        Self { pool: pool.clone() }
    }
}

#[async_trait]
impl ProviderFactory for SqliteProviderFactory {
    fn provider(&self) -> StorageProvider {
        StorageProvider::Sqlite
    }

    fn client(&self) -> Arc<dyn DbClient> {
        Arc::new(SqliteClient {
            exec: SqliteExec::Pool(self.pool.clone()),
        })
    }

    async fn begin_client(&self) -> Result<Arc<dyn DbClient>> {
        let tx = self.pool.begin().await?;

        Ok(Arc::new(SqliteClient {
            exec: SqliteExec::Tx(Arc::new(Mutex::new(Some(tx)))),
        }))
    }

    fn schema_manager(&self) -> Arc<dyn SchemaManager> {
        Arc::new(SqliteSchemaManager {
            pool: self.pool.clone(),
        })
    }
}

type SharedTx = Arc<Mutex<Option<Transaction<'static, Sqlite>>>>;

#[derive(Clone)]
enum SqliteExec {
    Pool(SqlitePool),
    Tx(SharedTx),
}

impl SqliteExec {
    async fn execute<'a>(
        &self,
        query: Query<'a, Sqlite, SqliteArguments<'a>>,
    ) -> Result<SqliteQueryResult> {
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

    async fn fetch_one_scalar<'a, T>(
        &self,
        query: QueryScalar<'a, Sqlite, T, SqliteArguments<'a>>,
    ) -> Result<T>
    where
        T: Send + Unpin + for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
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

    async fn fetch_optional_scalar<'a, T>(
        &self,
        query: QueryScalar<'a, Sqlite, T, SqliteArguments<'a>>,
    ) -> Result<Option<T>>
    where
        T: Send + Unpin + for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
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

    async fn fetch_all<'a, T>(
        &self,
        query: QueryAs<'a, Sqlite, T, SqliteArguments<'a>>,
    ) -> Result<Vec<T>>
    where
        T: Send + Unpin + for<'r> sqlx::FromRow<'r, SqliteRow>,
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

    /// Runs a statement batch atomically: on the ambient transaction when
    /// there is one, otherwise inside its own.
    async fn execute_many(&self, statements: Vec<(String, Vec<DacValue>)>) -> Result<()> {
        match self {
            Self::Pool(pool) => {
                let mut tx = pool.begin().await?;

                for (sql, binds) in &statements {
                    let mut q = sqlx::query(sql);
                    for value in binds {
                        q = bind_dac(q, value);
                    }

                    q.execute(&mut *tx).await?;
                }

                tx.commit().await?;

                Ok(())
            }
            Self::Tx(_) => {
                for (sql, binds) in &statements {
                    let mut q = sqlx::query(sql);
                    for value in binds {
                        q = bind_dac(q, value);
                    }

                    self.execute(q).await?;
                }

                Ok(())
            }
        }
    }
}

/// The embedded-engine data access client.
///
/// The engine has no mechanism for passing a set of values to one statement,
/// so the by-ids operations refuse with the capability-gap error.
pub struct SqliteClient {
    exec: SqliteExec,
}

#[async_trait]
impl DbClient for SqliteClient {
    fn provider(&self) -> StorageProvider {
        StorageProvider::Sqlite
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        if name.trim().is_empty() {
            return Err(StoreError::ContractViolation("the table name is required"));
        }

        let count = self
            .exec
            .fetch_one_scalar(
                sqlx::query_scalar::<_, i64>(statements::TABLE_EXISTS).bind(name.to_owned()),
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

        let count = i64::from(num_of_ids);

        self.exec
            .fetch_one_scalar(
                sqlx::query_scalar::<_, i64>(statements::CHECK_OUT_IDENTITY)
                    .bind(type_hash.to_owned())
                    .bind(count)
                    .bind(count)
                    .bind(count),
            )
            .await
    }

    async fn get_json_by_id(
        &self,
        id: StructureId,
        schema: &StructureSchema,
    ) -> Result<Option<String>> {
        let sql = statements::get_json_by_id(schema);
        let q = bind_dac_scalar(sqlx::query_scalar::<_, String>(&sql), &id_value(id));

        self.exec.fetch_optional_scalar(q).await
    }

    async fn get_json(&self, schema: &StructureSchema) -> Result<JsonStream> {
        stream_json(self.exec.clone(), schema, None)
    }

    async fn get_json_by_ids(
        &self,
        _ids: &[StructureId],
        _id_type: StructureIdType,
        _schema: &StructureSchema,
    ) -> Result<JsonStream> {
        Err(StoreError::NotSupportedByProvider {
            provider: StorageProvider::Sqlite,
            operation: "get_json_by_ids",
        })
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
        let id = id_value(id);
        let statements = statements::delete_by_id(schema)
            .into_iter()
            .map(|sql| (sql, vec![id.clone()]))
            .collect();

        self.exec.execute_many(statements).await
    }

    async fn delete_by_ids(
        &self,
        _ids: &[StructureId],
        _id_type: StructureIdType,
        _schema: &StructureSchema,
    ) -> Result<()> {
        Err(StoreError::NotSupportedByProvider {
            provider: StorageProvider::Sqlite,
            operation: "delete_by_ids",
        })
    }

    async fn delete_by_query(&self, schema: &StructureSchema, query: &SqlQuery) -> Result<()> {
        let parameters = query
            .parameters()
            .iter()
            .map(|p| p.value().clone())
            .collect::<Vec<_>>();

        let mut batch = vec![(statements::delete_by_query(schema, query.sql()), parameters)];
        for sql in statements::delete_orphaned_projections(schema) {
            batch.push((sql, Vec::new()));
        }

        self.exec.execute_many(batch).await
    }

    async fn delete_where_id_is_between(
        &self,
        id_from: StructureId,
        id_to: StructureId,
        schema: &StructureSchema,
    ) -> Result<()> {
        if id_from.id_type() != id_to.id_type() {
            return Err(StoreError::ContractViolation(
                "range bounds must share one identifier kind",
            ));
        }

        let from = id_value(id_from);
        let to = id_value(id_to);
        let statements = statements::delete_where_id_is_between(schema)
            .into_iter()
            .map(|sql| (sql, vec![from.clone(), to.clone()]))
            .collect();

        self.exec.execute_many(statements).await
    }

    async fn rebuild_indexes(&self, schema: &StructureSchema) -> Result<()> {
        tracing::debug!(table = schema.indexes_table_name(), "rebuilding indexes");

        let statements = statements::rebuild_indexes(schema)
            .into_iter()
            .map(|sql| (sql, Vec::new()))
            .collect();

        self.exec.execute_many(statements).await
    }

    async fn drop_structure_set(&self, schema: &StructureSchema) -> Result<()> {
        tracing::debug!(table = schema.structure_table_name(), "dropping structure set");

        let mut batch = statements::drop_structure_set(schema)
            .into_iter()
            .map(|sql| (sql, Vec::new()))
            .collect::<Vec<_>>();

        batch.push((
            statements::DELETE_IDENTITIES_ROW.to_owned(),
            vec![DacValue::Text(Some(schema.hash().to_owned()))],
        ));

        self.exec.execute_many(batch).await
    }

    fn bulk_copy(&self, options: BulkOptions) -> Result<Box<dyn DbBulkCopy>> {
        Ok(Box::new(SqliteBulkCopy {
            exec: self.exec.clone(),
            options,
            destination: None,
            mappings: Vec::new(),
        }))
    }

    async fn commit(&self) -> Result<()> {
        let SqliteExec::Tx(tx) = &self.exec else {
            return Ok(());
        };

        let tx = tx.lock().await.take().ok_or(StoreError::ContractViolation(
            "the transaction is already completed",
        ))?;

        tx.commit().await?;

        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let SqliteExec::Tx(tx) = &self.exec else {
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
    exec: SqliteExec,
    sql_first: String,
    sql_next: String,
    id_type: StructureIdType,
    between: Option<(StructureId, StructureId)>,
    after: Option<StructureId>,
    done: bool,
}

fn stream_json(
    exec: SqliteExec,
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
            let mut q = sqlx::query_as::<_, (String, String)>(sql);

            if let Some((from, to)) = &state.between {
                q = q
                    .bind(from.as_guid()?.to_string())
                    .bind(to.as_guid()?.to_string());
            }
            if let Some(after) = &state.after {
                q = q.bind(after.as_guid()?.to_string());
            }
            q = q.bind(JSON_PAGE_SIZE);

            let rows = state.exec.fetch_all(q).await?;

            rows.into_iter()
                .map(|(id, json)| {
                    let id = Uuid::parse_str(&id).map_err(|e| StoreError::Any(e.into()))?;

                    Ok((StructureId::Guid(id), json))
                })
                .collect()
        }
    }
}

fn id_value(id: StructureId) -> DacValue {
    match id {
        StructureId::Int(v) => DacValue::from(v),
        // Guids live in TEXT columns on this engine.
        StructureId::Guid(v) => DacValue::from(v.to_string()),
    }
}

fn bind_dac<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &DacValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value.clone() {
        DacValue::Int(v) => query.bind(v),
        DacValue::Float(v) => query.bind(v),
        DacValue::Bool(v) => query.bind(v),
        DacValue::Text(v) => query.bind(v),
        DacValue::DateTime(v) => query.bind(v),
        DacValue::Guid(v) => query.bind(v.map(|u| u.to_string())),
    }
}

fn bind_dac_scalar<'q, T>(
    query: QueryScalar<'q, Sqlite, T, SqliteArguments<'q>>,
    value: &DacValue,
) -> QueryScalar<'q, Sqlite, T, SqliteArguments<'q>> {
    match value.clone() {
        DacValue::Int(v) => query.bind(v),
        DacValue::Float(v) => query.bind(v),
        DacValue::Bool(v) => query.bind(v),
        DacValue::Text(v) => query.bind(v),
        DacValue::DateTime(v) => query.bind(v),
        DacValue::Guid(v) => query.bind(v.map(|u| u.to_string())),
    }
}

/// Multi-row insert writer batched over `QueryBuilder::push_values`.
///
/// The embedded engine offers no per-column DEFAULT substitution, so
/// explicit nulls are always preserved; the tables it writes to declare no
/// column defaults, which makes the behavior coincide.
pub struct SqliteBulkCopy {
    exec: SqliteExec,
    options: BulkOptions,
    destination: Option<String>,
    mappings: Vec<(String, String)>,
}

#[async_trait]
impl DbBulkCopy for SqliteBulkCopy {
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

        let mut source = rows.into_rows();

        loop {
            let chunk = source.by_ref().take(batch_size).collect::<Vec<_>>();

            if chunk.is_empty() {
                break;
            }

            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(head.as_str());

            builder.push_values(chunk.iter(), |mut b, row| {
                for &index in &source_indexes {
                    match row[index].clone() {
                        DacValue::Int(v) => b.push_bind(v),
                        DacValue::Float(v) => b.push_bind(v),
                        DacValue::Bool(v) => b.push_bind(v),
                        DacValue::Text(v) => b.push_bind(v),
                        DacValue::DateTime(v) => b.push_bind(v),
                        DacValue::Guid(v) => b.push_bind(v.map(|u| u.to_string())),
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

/// Lazy table creation for the embedded engine.
pub struct SqliteSchemaManager {
    pool: SqlitePool,
}

#[async_trait]
impl SchemaManager for SqliteSchemaManager {
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

    pub(super) const TABLE_EXISTS: &str =
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?";

    pub(super) const CREATE_IDENTITIES_TABLE: &str =
        "CREATE TABLE IF NOT EXISTS \"StruktIdentities\" \
         (\"type_hash\" TEXT PRIMARY KEY, \"next_id\" INTEGER NOT NULL)";

    pub(super) const CHECK_OUT_IDENTITY: &str =
        "INSERT INTO \"StruktIdentities\" (\"type_hash\", \"next_id\") VALUES (?, ? + 1) \
         ON CONFLICT (\"type_hash\") DO UPDATE SET \"next_id\" = \"next_id\" + ? \
         RETURNING \"next_id\" - ?";

    pub(super) const DELETE_IDENTITIES_ROW: &str =
        "DELETE FROM \"StruktIdentities\" WHERE \"type_hash\" = ?";

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
            "SELECT \"json\" FROM {} WHERE \"id\" = ?",
            quote_ident(schema.structure_table_name())
        )
    }

    pub(super) fn json_page(schema: &StructureSchema, between: bool, after: bool) -> String {
        let mut sql = format!(
            "SELECT \"id\", \"json\" FROM {}",
            quote_ident(schema.structure_table_name())
        );
        let mut conditions = Vec::new();

        if between {
            conditions.push("\"id\" >= ? AND \"id\" <= ?".to_owned());
        }

        if after {
            conditions.push("\"id\" > ?".to_owned());
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        sql.push_str(" ORDER BY \"id\" LIMIT ?");

        sql
    }

    pub(super) fn delete_by_id(schema: &StructureSchema) -> Vec<String> {
        vec![
            format!(
                "DELETE FROM {} WHERE \"structure_id\" = ?",
                quote_ident(schema.uniques_table_name())
            ),
            format!(
                "DELETE FROM {} WHERE \"structure_id\" = ?",
                quote_ident(schema.indexes_table_name())
            ),
            format!(
                "DELETE FROM {} WHERE \"id\" = ?",
                quote_ident(schema.structure_table_name())
            ),
        ]
    }

    pub(super) fn delete_by_query(schema: &StructureSchema, fragment: &str) -> String {
        format!(
            "DELETE FROM {} WHERE \"id\" IN (SELECT \"structure_id\" FROM {} WHERE {fragment})",
            quote_ident(schema.structure_table_name()),
            quote_ident(schema.indexes_table_name())
        )
    }

    /// Clears projection rows whose structure is gone; the embedded engine
    /// does not enforce the cascading foreign keys.
    pub(super) fn delete_orphaned_projections(schema: &StructureSchema) -> Vec<String> {
        let structure = quote_ident(schema.structure_table_name());

        vec![
            format!(
                "DELETE FROM {} WHERE \"structure_id\" NOT IN (SELECT \"id\" FROM {structure})",
                quote_ident(schema.indexes_table_name())
            ),
            format!(
                "DELETE FROM {} WHERE \"structure_id\" NOT IN (SELECT \"id\" FROM {structure})",
                quote_ident(schema.uniques_table_name())
            ),
        ]
    }

    pub(super) fn delete_where_id_is_between(schema: &StructureSchema) -> Vec<String> {
        vec![
            format!(
                "DELETE FROM {} WHERE \"structure_id\" >= ? AND \"structure_id\" <= ?",
                quote_ident(schema.uniques_table_name())
            ),
            format!(
                "DELETE FROM {} WHERE \"structure_id\" >= ? AND \"structure_id\" <= ?",
                quote_ident(schema.indexes_table_name())
            ),
            format!(
                "DELETE FROM {} WHERE \"id\" >= ? AND \"id\" <= ?",
                quote_ident(schema.structure_table_name())
            ),
        ]
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
            projections.push(format!("json_extract(\"json\", '$.{}')", property.path()));
        }

        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote_ident(destination),
            columns.join(", "),
            projections.join(", "),
            quote_ident(source)
        )
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
            StructureIdType::Integer => ("\"id\" INTEGER PRIMARY KEY", "INTEGER"),
            StructureIdType::Guid => ("\"id\" TEXT PRIMARY KEY", "TEXT"),
        };

        let structure = quote_ident(schema.structure_table_name());
        let mut stmts = vec![
            CREATE_IDENTITIES_TABLE.to_owned(),
            format!(
                "CREATE TABLE IF NOT EXISTS {structure} ({id_column}, \"json\" TEXT NOT NULL)"
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
            ValueKind::Scalar(ScalarKind::Int) | ValueKind::Scalar(ScalarKind::Bool) => "INTEGER",
            ValueKind::Scalar(ScalarKind::Float) => "REAL",
            ValueKind::Scalar(ScalarKind::Text)
            | ValueKind::Scalar(ScalarKind::DateTime)
            | ValueKind::Scalar(ScalarKind::Guid)
            | ValueKind::Enumeration
            | ValueKind::Collection(_) => "TEXT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;

    crate::structure! {
        struct Shipment {
            shipment_id: i64,
            reference: String,
            origin: ShipmentOrigin,
        }
    }

    crate::structure! {
        struct ShipmentOrigin {
            country: String,
        }
    }

    fn schema() -> StructureSchema {
        SchemaBuilder::build::<Shipment>().unwrap()
    }

    #[test]
    fn delete_by_id_clears_projections_before_the_structure() {
        let stmts = statements::delete_by_id(&schema());

        assert_eq!(
            stmts,
            vec![
                "DELETE FROM \"ShipmentUniques\" WHERE \"structure_id\" = ?".to_owned(),
                "DELETE FROM \"ShipmentIndexes\" WHERE \"structure_id\" = ?".to_owned(),
                "DELETE FROM \"ShipmentStructure\" WHERE \"id\" = ?".to_owned(),
            ]
        );
    }

    #[test]
    fn rebuild_extracts_dotted_paths() {
        let stmts = statements::rebuild_indexes(&schema());

        assert_eq!(
            stmts[1],
            "INSERT INTO \"ShipmentIndexes\" (\"structure_id\", \"reference\", \"origin.country\") \
             SELECT \"id\", json_extract(\"json\", '$.reference'), \
             json_extract(\"json\", '$.origin.country') FROM \"ShipmentStructure\""
        );
    }

    #[test]
    fn structure_table_uses_rowid_friendly_integer_key() {
        let stmts = statements::create_structure_set(&schema()).unwrap();

        assert!(stmts[1].contains("\"id\" INTEGER PRIMARY KEY"));
        assert!(stmts[1].contains("\"json\" TEXT NOT NULL"));
    }
}
