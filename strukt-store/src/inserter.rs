use std::sync::Arc;

use strukt_query::DacValue;

use crate::bulk::{BulkOptions, BulkRows};
use crate::client::DbClient;
use crate::error::Result;
use crate::id::StructureId;
use crate::schema::StructureSchema;
use crate::structure::StructureRecord;

/// The only write path for new documents: streams structure rows, then index
/// rows, then unique rows through the provider's bulk writer.
pub struct StructureInserter {
    client: Arc<dyn DbClient>,
    batch_size: usize,
}

impl StructureInserter {
    pub fn new(client: Arc<dyn DbClient>) -> Self {
        Self {
            client,
            batch_size: 0,
        }
    }

    pub fn with_batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows;
        self
    }

    pub async fn insert(
        &self,
        schema: &StructureSchema,
        records: &[StructureRecord],
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            table = schema.structure_table_name(),
            rows = records.len(),
            "inserting structures"
        );

        self.write_structures(schema, records).await?;

        if !schema.indexable_properties().is_empty() {
            self.write_indexes(schema, records).await?;
        }

        if schema.has_uniques() {
            self.write_uniques(schema, records).await?;
        }

        Ok(())
    }

    async fn write_structures(
        &self,
        schema: &StructureSchema,
        records: &[StructureRecord],
    ) -> Result<()> {
        let mut bulk = self.client.bulk_copy(BulkOptions {
            batch_size: self.batch_size,
            ..BulkOptions::default()
        })?;

        bulk.set_destination(schema.structure_table_name())?;
        bulk.add_column_mapping("id", "id");
        bulk.add_column_mapping("json", "json");

        let rows = records
            .iter()
            .map(|r| vec![id_value(r.id()), DacValue::from(r.json().to_owned())])
            .collect::<Vec<_>>();

        bulk.write(BulkRows::new(
            vec!["id".to_owned(), "json".to_owned()],
            rows.into_iter(),
        ))
        .await
    }

    async fn write_indexes(
        &self,
        schema: &StructureSchema,
        records: &[StructureRecord],
    ) -> Result<()> {
        let mut columns = vec!["structure_id".to_owned()];
        columns.extend(
            schema
                .indexable_properties()
                .iter()
                .map(|p| p.path().to_owned()),
        );

        let mut bulk = self.client.bulk_copy(BulkOptions {
            batch_size: self.batch_size,
            ..BulkOptions::default()
        })?;

        bulk.set_destination(schema.indexes_table_name())?;
        for column in &columns {
            bulk.add_column_mapping(column, column);
        }

        let rows = records
            .iter()
            .map(|r| {
                let mut row = Vec::with_capacity(columns.len());
                row.push(id_value(r.id()));
                row.extend(r.index_values().iter().cloned());
                row
            })
            .collect::<Vec<_>>();

        bulk.write(BulkRows::new(columns, rows.into_iter())).await
    }

    async fn write_uniques(
        &self,
        schema: &StructureSchema,
        records: &[StructureRecord],
    ) -> Result<()> {
        let mut columns = vec!["structure_id".to_owned()];
        columns.extend(schema.unique_properties().map(|p| p.path().to_owned()));

        let mut bulk = self.client.bulk_copy(BulkOptions {
            batch_size: self.batch_size,
            ..BulkOptions::default()
        })?;

        bulk.set_destination(schema.uniques_table_name())?;
        for column in &columns {
            bulk.add_column_mapping(column, column);
        }

        let rows = records
            .iter()
            .map(|r| {
                let mut row = Vec::with_capacity(columns.len());
                row.push(id_value(r.id()));
                row.extend(r.unique_values().iter().cloned());
                row
            })
            .collect::<Vec<_>>();

        bulk.write(BulkRows::new(columns, rows.into_iter())).await
    }
}

fn id_value(id: StructureId) -> DacValue {
    match id {
        StructureId::Int(v) => DacValue::from(v),
        StructureId::Guid(v) => DacValue::from(v),
    }
}
