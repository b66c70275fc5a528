use std::fmt;

use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// The identifier kind a structure schema declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureIdType {
    Integer,
    Guid,
}

/// The identifier of one persisted structure.
///
/// Assigned before the document is serialized and never reassigned after
/// creation; primary key of the structure table and foreign key of the
/// index/unique rows belonging to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StructureId {
    Int(i64),
    Guid(Uuid),
}

impl StructureId {
    pub fn id_type(&self) -> StructureIdType {
        match self {
            Self::Int(_) => StructureIdType::Integer,
            Self::Guid(_) => StructureIdType::Guid,
        }
    }

    pub(crate) fn to_json_value(self) -> Value {
        match self {
            Self::Int(v) => Value::from(v),
            Self::Guid(v) => Value::from(v.to_string()),
        }
    }

    pub(crate) fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::Guid(_) => Err(StoreError::ContractViolation(
                "expected an integer structure id",
            )),
        }
    }

    pub(crate) fn as_guid(&self) -> Result<Uuid> {
        match self {
            Self::Guid(v) => Ok(*v),
            Self::Int(_) => Err(StoreError::ContractViolation(
                "expected a guid structure id",
            )),
        }
    }
}

impl fmt::Display for StructureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Guid(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for StructureId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Uuid> for StructureId {
    fn from(value: Uuid) -> Self {
        Self::Guid(value)
    }
}
