use crate::provider::StorageProvider;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("operation `{operation}` is not supported by the `{provider}` provider")]
    NotSupportedByProvider {
        provider: StorageProvider,
        operation: &'static str,
    },

    #[error("unknown storage provider tag `{0}`")]
    UnknownProvider(String),

    #[error("type graph of `{type_name}` is cyclic through `{via}`")]
    CyclicTypeGraph {
        type_name: &'static str,
        via: &'static str,
    },

    #[error("identifier property of `{type_name}` is ambiguous, both `{first}` and `{second}` qualify")]
    AmbiguousIdentifier {
        type_name: &'static str,
        first: &'static str,
        second: &'static str,
    },

    #[error("type `{type_name}` declares no identifier property")]
    MissingIdentifier { type_name: &'static str },

    #[error("identity range for `{type_hash}` is exhausted")]
    IdentityRangeExhausted { type_hash: String },

    #[error("value at `{path}` does not match its indexable kind")]
    InvalidIndexValue { path: String },

    #[error("{0}")]
    ContractViolation(&'static str),

    #[cfg(any(feature = "pg", feature = "sqlite"))]
    #[error("sqlx `{0}`")]
    Sqlx(#[from] sqlx::Error),

    #[error("serde_json `{0}`")]
    SerdeJson(#[from] serde_json::Error),

    #[error("{0}")]
    Any(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
