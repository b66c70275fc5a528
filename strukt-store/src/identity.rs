use std::sync::Arc;

use crate::client::DbClient;
use crate::error::{Result, StoreError};
use crate::id::StructureIdType;
use crate::schema::StructureSchema;

/// A reserved half-open range `[first, first + count)` of integer
/// identifiers for one type-hash.
///
/// Consumed strictly left-to-right by a single batch; identifiers from an
/// abandoned range are never reissued, leaving gaps.
#[derive(Debug, Clone)]
pub struct IdentityRange {
    first: i64,
    count: u32,
    cursor: u32,
}

impl IdentityRange {
    pub fn new(first: i64, count: u32) -> Self {
        Self {
            first,
            count,
            cursor: 0,
        }
    }

    pub fn first(&self) -> i64 {
        self.first
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn remaining(&self) -> u32 {
        self.count - self.cursor
    }
}

impl Iterator for IdentityRange {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.cursor == self.count {
            return None;
        }

        let id = self.first + i64::from(self.cursor);
        self.cursor += 1;

        Some(id)
    }
}

/// Allocates contiguous identifier ranges for batch inserts of integer-keyed
/// structures.
///
/// The underlying checkout is the one cross-connection synchronization point
/// of the store; guid identifiers never consume it.
pub struct IdentityRangeGenerator {
    client: Arc<dyn DbClient>,
}

impl IdentityRangeGenerator {
    pub fn new(client: Arc<dyn DbClient>) -> Self {
        Self { client }
    }

    pub async fn check_out(&self, schema: &StructureSchema, count: u32) -> Result<IdentityRange> {
        if count == 0 {
            return Err(StoreError::ContractViolation(
                "an identity range needs a count greater than zero",
            ));
        }

        if schema.id_type() != Some(StructureIdType::Integer) {
            return Err(StoreError::ContractViolation(
                "identity ranges apply to integer identifiers only",
            ));
        }

        let first = self
            .client
            .check_out_and_get_next_identity(schema.hash(), count)
            .await?;

        if first < 1 || first.checked_add(i64::from(count)).is_none() {
            return Err(StoreError::IdentityRangeExhausted {
                type_hash: schema.hash().to_owned(),
            });
        }

        Ok(IdentityRange::new(first, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_consumed_left_to_right() {
        let range = IdentityRange::new(11, 3);

        assert_eq!(range.collect::<Vec<_>>(), vec![11, 12, 13]);
    }

    #[test]
    fn exhausted_range_yields_none() {
        let mut range = IdentityRange::new(1, 1);

        range.next();

        assert_eq!(range.next(), None);
        assert_eq!(range.remaining(), 0);
    }
}
