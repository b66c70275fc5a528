use async_trait::async_trait;
use strukt_query::DacValue;

use crate::error::Result;

/// Options for one bulk-write session.
#[derive(Debug, Clone, Copy)]
pub struct BulkOptions {
    /// Preserve caller-supplied identifier values instead of letting the
    /// destination generate them. Required whenever identifiers were
    /// pre-allocated or client-generated.
    pub keep_identity: bool,
    /// Preserve explicit nulls instead of substituting column defaults.
    pub keep_nulls: bool,
    /// Rows per round-trip; zero sends everything as one batch.
    pub batch_size: usize,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            keep_identity: true,
            keep_nulls: true,
            batch_size: 0,
        }
    }
}

/// A forward-only row source consumed exactly once by a bulk writer.
pub struct BulkRows {
    columns: Vec<String>,
    rows: Box<dyn Iterator<Item = Vec<DacValue>> + Send>,
}

impl BulkRows {
    /// `columns` names the source fields, positionally matching each row's
    /// values.
    pub fn new(
        columns: Vec<String>,
        rows: impl Iterator<Item = Vec<DacValue>> + Send + 'static,
    ) -> Self {
        Self {
            columns,
            rows: Box::new(rows),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(crate) fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub(crate) fn into_rows(self) -> Box<dyn Iterator<Item = Vec<DacValue>> + Send> {
        self.rows
    }
}

/// Streams rows into one destination table.
///
/// The writer consumes its source once, forward-only, and releases all
/// provider resources on completion or on an early error return.
#[async_trait]
pub trait DbBulkCopy: Send {
    fn set_destination(&mut self, table_name: &str) -> Result<()>;

    fn set_batch_size(&mut self, rows: usize);

    fn add_column_mapping(&mut self, source_field: &str, destination_column: &str);

    async fn write(&mut self, rows: BulkRows) -> Result<()>;
}
