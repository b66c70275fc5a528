use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use parking_lot::RwLock;
use uuid::Uuid;

use strukt_query::{DacValue, SqlQuery};

use crate::bulk::{BulkOptions, BulkRows, DbBulkCopy};
use crate::client::{DbClient, JsonStream};
use crate::error::{Result, StoreError};
use crate::id::{StructureId, StructureIdType};
use crate::manager::SchemaManager;
use crate::provider::{ProviderFactory, StorageProvider};
use crate::schema::StructureSchema;

/// The in-process engine: structure sets held in ordered maps behind one
/// lock, shared by clone.
///
/// It executes no SQL, so the fragment-consuming operations and the index
/// rebuild refuse with the capability-gap error; everything id-based works.
#[derive(Debug, Clone, Default)]
pub struct MemoryDb(Arc<RwLock<MemoryInner>>);

#[derive(Debug, Default)]
struct MemoryInner {
    sets: HashMap<String, StructureSet>,
    identities: HashMap<String, i64>,
}

#[derive(Debug, Default)]
struct StructureSet {
    table_names: Vec<String>,
    rows: BTreeMap<StructureId, String>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_set<T>(
        &self,
        schema: &StructureSchema,
        f: impl FnOnce(&StructureSet) -> T,
    ) -> Result<T> {
        let inner = self.0.read();
        let set = inner
            .sets
            .get(schema.structure_table_name())
            .ok_or_else(|| {
                StoreError::Any(anyhow!(
                    "structure set `{}` does not exist",
                    schema.name()
                ))
            })?;

        Ok(f(set))
    }

    fn with_set_mut<T>(
        &self,
        schema: &StructureSchema,
        f: impl FnOnce(&mut StructureSet) -> T,
    ) -> Result<T> {
        let mut inner = self.0.write();
        let set = inner
            .sets
            .get_mut(schema.structure_table_name())
            .ok_or_else(|| {
                StoreError::Any(anyhow!(
                    "structure set `{}` does not exist",
                    schema.name()
                ))
            })?;

        Ok(f(set))
    }
}

pub struct MemoryProviderFactory {
    db: MemoryDb,
}

impl MemoryProviderFactory {
    pub fn new(db: &MemoryDb) -> Self {
        Self { db: db.clone() }
    }
}

#[async_trait]
impl ProviderFactory for MemoryProviderFactory {
    fn provider(&self) -> StorageProvider {
        StorageProvider::Memory
    }

    fn client(&self) -> Arc<dyn DbClient> {
        Arc::new(MemoryClient {
            db: self.db.clone(),
        })
    }

    async fn begin_client(&self) -> Result<Arc<dyn DbClient>> {
        // The in-process engine is non-transactional; completion is a no-op.
        Ok(self.client())
    }

    fn schema_manager(&self) -> Arc<dyn SchemaManager> {
        Arc::new(MemorySchemaManager {
            db: self.db.clone(),
        })
    }
}

pub struct MemoryClient {
    db: MemoryDb,
}

#[async_trait]
impl DbClient for MemoryClient {
    fn provider(&self) -> StorageProvider {
        StorageProvider::Memory
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        if name.trim().is_empty() {
            return Err(StoreError::ContractViolation("the table name is required"));
        }

        let inner = self.db.0.read();

        Ok(inner
            .sets
            .values()
            .any(|set| set.table_names.iter().any(|n| n == name)))
    }

    async fn row_count(&self, schema: &StructureSchema) -> Result<i64> {
        self.db.with_set(schema, |set| set.rows.len() as i64)
    }

    async fn row_count_by_query(
        &self,
        _schema: &StructureSchema,
        _query: &SqlQuery,
    ) -> Result<i64> {
        Err(StoreError::NotSupportedByProvider {
            provider: StorageProvider::Memory,
            operation: "row_count_by_query",
        })
    }

    async fn check_out_and_get_next_identity(
        &self,
        type_hash: &str,
        num_of_ids: u32,
    ) -> Result<i64> {
        if type_hash.trim().is_empty() {
            return Err(StoreError::ContractViolation("the type hash is required"));
        }

        let mut inner = self.db.0.write();
        let next = inner.identities.entry(type_hash.to_owned()).or_insert(1);
        let first = *next;

        *next = next
            .checked_add(i64::from(num_of_ids))
            .ok_or_else(|| StoreError::IdentityRangeExhausted {
                type_hash: type_hash.to_owned(),
            })?;

        Ok(first)
    }

    async fn get_json_by_id(
        &self,
        id: StructureId,
        schema: &StructureSchema,
    ) -> Result<Option<String>> {
        self.db.with_set(schema, |set| set.rows.get(&id).cloned())
    }

    async fn get_json(&self, schema: &StructureSchema) -> Result<JsonStream> {
        let rows = self
            .db
            .with_set(schema, |set| set.rows.values().cloned().collect::<Vec<_>>())?;

        Ok(stream::iter(rows.into_iter().map(Ok)).boxed())
    }

    async fn get_json_by_ids(
        &self,
        ids: &[StructureId],
        _id_type: StructureIdType,
        schema: &StructureSchema,
    ) -> Result<JsonStream> {
        let ids = ids.to_vec();
        let rows = self.db.with_set(schema, |set| {
            ids.iter()
                .filter_map(|id| set.rows.get(id).cloned())
                .collect::<Vec<_>>()
        })?;

        Ok(stream::iter(rows.into_iter().map(Ok)).boxed())
    }

    async fn get_json_where_id_is_between(
        &self,
        id_from: StructureId,
        id_to: StructureId,
        schema: &StructureSchema,
    ) -> Result<JsonStream> {
        if id_from > id_to {
            return Ok(stream::empty().boxed());
        }

        let rows = self.db.with_set(schema, |set| {
            set.rows
                .range(id_from..=id_to)
                .map(|(_, json)| json.clone())
                .collect::<Vec<_>>()
        })?;

        Ok(stream::iter(rows.into_iter().map(Ok)).boxed())
    }

    async fn delete_by_id(&self, id: StructureId, schema: &StructureSchema) -> Result<()> {
        self.db.with_set_mut(schema, |set| {
            set.rows.remove(&id);
        })
    }

    async fn delete_by_ids(
        &self,
        ids: &[StructureId],
        _id_type: StructureIdType,
        schema: &StructureSchema,
    ) -> Result<()> {
        let ids = ids.to_vec();

        self.db.with_set_mut(schema, |set| {
            for id in ids {
                set.rows.remove(&id);
            }
        })
    }

    async fn delete_by_query(&self, _schema: &StructureSchema, _query: &SqlQuery) -> Result<()> {
        Err(StoreError::NotSupportedByProvider {
            provider: StorageProvider::Memory,
            operation: "delete_by_query",
        })
    }

    async fn delete_where_id_is_between(
        &self,
        id_from: StructureId,
        id_to: StructureId,
        schema: &StructureSchema,
    ) -> Result<()> {
        if id_from > id_to {
            return Ok(());
        }

        self.db.with_set_mut(schema, |set| {
            let doomed = set
                .rows
                .range(id_from..=id_to)
                .map(|(id, _)| *id)
                .collect::<Vec<_>>();

            for id in doomed {
                set.rows.remove(&id);
            }
        })
    }

    async fn rebuild_indexes(&self, _schema: &StructureSchema) -> Result<()> {
        Err(StoreError::NotSupportedByProvider {
            provider: StorageProvider::Memory,
            operation: "rebuild_indexes",
        })
    }

    async fn drop_structure_set(&self, schema: &StructureSchema) -> Result<()> {
        let mut inner = self.db.0.write();

        inner.sets.remove(schema.structure_table_name());
        inner.identities.remove(schema.hash());

        Ok(())
    }

    fn bulk_copy(&self, options: BulkOptions) -> Result<Box<dyn DbBulkCopy>> {
        Ok(Box::new(MemoryBulkCopy {
            db: self.db.clone(),
            options,
            destination: None,
            mappings: Vec::new(),
        }))
    }

    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        Ok(())
    }
}

/// Writes structure rows straight into the owning set; index and unique rows
/// have no in-memory projection and are consumed without effect.
pub struct MemoryBulkCopy {
    db: MemoryDb,
    options: BulkOptions,
    destination: Option<String>,
    mappings: Vec<(String, String)>,
}

#[async_trait]
impl DbBulkCopy for MemoryBulkCopy {
    fn set_destination(&mut self, table_name: &str) -> Result<()> {
        if table_name.trim().is_empty() {
            return Err(StoreError::ContractViolation(
                "the destination table name is required",
            ));
        }

        self.destination = Some(table_name.to_owned());

        Ok(())
    }

    fn set_batch_size(&mut self, _rows: usize) {}

    fn add_column_mapping(&mut self, source_field: &str, destination_column: &str) {
        self.mappings
            .push((source_field.to_owned(), destination_column.to_owned()));
    }

    async fn write(&mut self, rows: BulkRows) -> Result<()> {
        let destination = self.destination.clone().ok_or(StoreError::ContractViolation(
            "the destination table is required before writing",
        ))?;

        let mut inner = self.db.0.write();

        let is_structure_table = inner.sets.contains_key(&destination);
        let is_projection_table = inner
            .sets
            .values()
            .any(|set| set.table_names.iter().any(|n| n == &destination));

        if !is_structure_table {
            if is_projection_table {
                // No in-memory projection to maintain; consume the source.
                rows.into_rows().for_each(drop);

                return Ok(());
            }

            return Err(StoreError::Any(anyhow!(
                "table `{destination}` does not exist"
            )));
        }

        let id_index = self
            .mappings
            .iter()
            .find(|(_, d)| d == "id")
            .and_then(|(s, _)| rows.column_index(s));
        let json_index = self
            .mappings
            .iter()
            .find(|(_, d)| d == "json")
            .and_then(|(s, _)| rows.column_index(s))
            .ok_or(StoreError::ContractViolation(
                "a `json` column mapping is required",
            ))?;

        let keep_identity = self.options.keep_identity;
        let set = inner.sets.get_mut(&destination).expect("checked above");

        for row in rows.into_rows() {
            let id = match (keep_identity, id_index) {
                (true, Some(index)) => row_id(&row[index])?,
                _ => next_generated_id(set),
            };

            let json = match &row[json_index] {
                DacValue::Text(Some(json)) => json.clone(),
                _ => {
                    return Err(StoreError::ContractViolation(
                        "the `json` column must carry text",
                    ))
                }
            };

            set.rows.insert(id, json);
        }

        Ok(())
    }
}

fn row_id(value: &DacValue) -> Result<StructureId> {
    match value {
        DacValue::Int(Some(id)) => Ok(StructureId::Int(*id)),
        DacValue::Guid(Some(id)) => Ok(StructureId::Guid(*id)),
        DacValue::Text(Some(id)) => Uuid::parse_str(id)
            .map(StructureId::Guid)
            .map_err(|_| StoreError::ContractViolation("the `id` column carries no identifier")),
        _ => Err(StoreError::ContractViolation(
            "the `id` column carries no identifier",
        )),
    }
}

fn next_generated_id(set: &StructureSet) -> StructureId {
    match set.rows.keys().next_back() {
        Some(StructureId::Int(max)) => StructureId::Int(max + 1),
        Some(StructureId::Guid(_)) => StructureId::Guid(Uuid::new_v4()),
        None => StructureId::Int(1),
    }
}

pub struct MemorySchemaManager {
    db: MemoryDb,
}

#[async_trait]
impl SchemaManager for MemorySchemaManager {
    async fn ensure_structure_set(&self, schema: &StructureSchema) -> Result<()> {
        let mut inner = self.db.0.write();

        inner
            .sets
            .entry(schema.structure_table_name().to_owned())
            .or_insert_with(|| StructureSet {
                table_names: vec![
                    schema.structure_table_name().to_owned(),
                    schema.indexes_table_name().to_owned(),
                    schema.uniques_table_name().to_owned(),
                ],
                rows: BTreeMap::new(),
            });

        Ok(())
    }
}
