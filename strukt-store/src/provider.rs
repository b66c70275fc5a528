use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::client::DbClient;
use crate::error::{Result, StoreError};
use crate::identity::IdentityRangeGenerator;
use crate::inserter::StructureInserter;
use crate::manager::SchemaManager;

/// The symbolic tag of one concrete storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageProvider {
    /// Full SQL backend (postgres).
    Pg,
    /// Cloud variant of the full SQL backend.
    PgCloud,
    /// Constrained embedded engine.
    Sqlite,
    /// In-process engine.
    Memory,
}

impl fmt::Display for StorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Pg => "pg",
            Self::PgCloud => "pg-cloud",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        };

        f.write_str(tag)
    }
}

impl FromStr for StorageProvider {
    type Err = StoreError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag {
            "pg" => Ok(Self::Pg),
            "pg-cloud" => Ok(Self::PgCloud),
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(StoreError::UnknownProvider(other.to_owned())),
        }
    }
}

/// Per-backend composition root: every component it hands out is bound to
/// the provider's dialect and connection type.
///
/// An operation a provider cannot support still exists on the component it
/// returns and fails there with the capability-gap error, so callers handle
/// refusal uniformly across providers.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    fn provider(&self) -> StorageProvider;

    /// A client executing each operation directly against the pool.
    fn client(&self) -> Arc<dyn DbClient>;

    /// A client bound to one connection with an open transaction; complete
    /// it through [`DbClient::commit`]/[`DbClient::rollback`].
    async fn begin_client(&self) -> Result<Arc<dyn DbClient>>;

    fn schema_manager(&self) -> Arc<dyn SchemaManager>;

    fn structure_inserter(&self, client: Arc<dyn DbClient>) -> StructureInserter {
        StructureInserter::new(client)
    }

    fn identity_generator(&self, client: Arc<dyn DbClient>) -> IdentityRangeGenerator {
        IdentityRangeGenerator::new(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tags_round_trip() {
        for tag in ["pg", "pg-cloud", "sqlite", "memory"] {
            let provider: StorageProvider = tag.parse().unwrap();

            assert_eq!(provider.to_string(), tag);
        }
    }

    #[test]
    fn unknown_tag_fails_fast() {
        let err = "mssql".parse::<StorageProvider>().unwrap_err();

        assert!(matches!(err, StoreError::UnknownProvider(tag) if tag == "mssql"));
    }
}
