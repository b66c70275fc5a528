#![forbid(unsafe_code)]
mod value;

use serde::{Deserialize, Serialize};

pub use value::{DacParameter, DacValue};

/// A ready-to-execute SQL fragment produced by a query translator.
///
/// The store never builds or rewrites the fragment itself: `sql` is inlined
/// verbatim into a larger statement template keyed by schema-derived table
/// names, and `parameters` are forwarded to the driver in order. Placeholders
/// inside `sql` therefore have to use the target provider's syntax (`$1`,
/// `$2`, … for pg, `?1`, `?2`, … for sqlite).
///
/// A `SqlQuery` is immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlQuery {
    sql: String,
    parameters: Vec<DacParameter>,
}

impl SqlQuery {
    pub fn new(sql: impl Into<String>, parameters: Vec<DacParameter>) -> Self {
        Self {
            sql: sql.into(),
            parameters,
        }
    }

    /// A fragment without bound parameters.
    pub fn plain(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameters in bind order.
    pub fn parameters(&self) -> &[DacParameter] {
        &self.parameters
    }

    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }
}
