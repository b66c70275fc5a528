use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A SQL value together with its type.
///
/// Every variant carries an `Option` so that a null still knows which SQL
/// type its placeholder has — drivers using prepared statements reject an
/// untyped null bound against a typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DacValue {
    Int(Option<i64>),
    Float(Option<f64>),
    Bool(Option<bool>),
    Text(Option<String>),
    DateTime(Option<DateTime<Utc>>),
    Guid(Option<Uuid>),
}

impl DacValue {
    pub fn is_null(&self) -> bool {
        match self {
            Self::Int(v) => v.is_none(),
            Self::Float(v) => v.is_none(),
            Self::Bool(v) => v.is_none(),
            Self::Text(v) => v.is_none(),
            Self::DateTime(v) => v.is_none(),
            Self::Guid(v) => v.is_none(),
        }
    }
}

impl From<i64> for DacValue {
    fn from(value: i64) -> Self {
        Self::Int(Some(value))
    }
}

impl From<f64> for DacValue {
    fn from(value: f64) -> Self {
        Self::Float(Some(value))
    }
}

impl From<bool> for DacValue {
    fn from(value: bool) -> Self {
        Self::Bool(Some(value))
    }
}

impl From<&str> for DacValue {
    fn from(value: &str) -> Self {
        Self::Text(Some(value.to_owned()))
    }
}

impl From<String> for DacValue {
    fn from(value: String) -> Self {
        Self::Text(Some(value))
    }
}

impl From<DateTime<Utc>> for DacValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(Some(value))
    }
}

impl From<Uuid> for DacValue {
    fn from(value: Uuid) -> Self {
        Self::Guid(Some(value))
    }
}

/// A named parameter forwarded, in order, to the driver.
///
/// The name documents intent; binding is positional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DacParameter {
    name: String,
    value: DacValue,
}

impl DacParameter {
    pub fn new(name: impl Into<String>, value: impl Into<DacValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &DacValue {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_keep_bind_order() {
        let query = crate::SqlQuery::new(
            r#""amount" >= $1 AND "city" = $2"#,
            vec![
                DacParameter::new("p0", 100i64),
                DacParameter::new("p1", "Stockholm"),
            ],
        );

        let names = query
            .parameters()
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["p0", "p1"]);
    }

    #[test]
    fn typed_nulls_report_null() {
        assert!(DacValue::Int(None).is_null());
        assert!(!DacValue::from(0i64).is_null());
        assert!(DacValue::Guid(None).is_null());
    }
}
