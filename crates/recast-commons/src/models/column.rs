//! Native column types and the schema-source column descriptor.

use crate::errors::CastError;
use crate::models::{AttributeName, Value};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Native column type as reported by the schema source.
///
/// `Untyped` is the neutral base used for virtual attributes (declared but
/// not backed by any column); it casts everything as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// Neutral pass-through type for virtual attributes
    Untyped,

    /// Boolean
    Boolean,

    /// 32-bit signed integer column (cast domain is i64 either way)
    Integer,

    /// 64-bit signed integer
    BigInt,

    /// Floating point
    Float,

    /// Exact numeric; cast domain is f64
    Decimal,

    /// UTF-8 text
    Text,

    /// Opaque binary
    Binary,

    /// JSON document
    Json,

    /// Calendar date, ISO-8601 text in the value domain
    Date,

    /// Point in time
    Timestamp,
}

impl ColumnType {
    /// SQL type name for display and error messages.
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Untyped => "VALUE",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Float => "FLOAT",
            ColumnType::Decimal => "DECIMAL",
            ColumnType::Text => "TEXT",
            ColumnType::Binary => "BINARY",
            ColumnType::Json => "JSON",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    /// Parses a symbolic type name as used in attribute declarations.
    ///
    /// Accepts the SQL spellings plus the declaration-friendly aliases
    /// (`string`, `datetime`, `big_integer`).
    pub fn from_sql_name(name: &str) -> Option<ColumnType> {
        match name.to_ascii_lowercase().as_str() {
            "value" | "untyped" => Some(ColumnType::Untyped),
            "boolean" | "bool" => Some(ColumnType::Boolean),
            "integer" | "int" => Some(ColumnType::Integer),
            "bigint" | "big_integer" => Some(ColumnType::BigInt),
            "float" | "double" => Some(ColumnType::Float),
            "decimal" | "numeric" => Some(ColumnType::Decimal),
            "text" | "string" => Some(ColumnType::Text),
            "binary" | "blob" => Some(ColumnType::Binary),
            "json" => Some(ColumnType::Json),
            "date" => Some(ColumnType::Date),
            "timestamp" | "datetime" => Some(ColumnType::Timestamp),
            _ => None,
        }
    }

    /// Casts a raw value into this type's application domain.
    ///
    /// Casting is lenient the way record mappers are lenient - numeric
    /// strings parse, 0/1 and t/f count as booleans - but it never swallows
    /// an unrepresentable value: that is a [`CastError`].
    pub fn cast_value(&self, value: &Value) -> Result<Value, CastError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            ColumnType::Untyped => Ok(value.clone()),

            ColumnType::Boolean => match value {
                Value::Boolean(_) => Ok(value.clone()),
                Value::Integer(i) => Ok(Value::Boolean(*i != 0)),
                Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "" => Ok(Value::Null),
                    "true" | "t" | "1" | "yes" | "on" => Ok(Value::Boolean(true)),
                    "false" | "f" | "0" | "no" | "off" => Ok(Value::Boolean(false)),
                    _ => Err(CastError::incompatible(self.sql_name(), value)),
                },
                _ => Err(CastError::incompatible(self.sql_name(), value)),
            },

            ColumnType::Integer | ColumnType::BigInt => match value {
                Value::Integer(_) => Ok(value.clone()),
                Value::Float(f) => Ok(Value::Integer(*f as i64)),
                Value::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
                Value::Text(s) => {
                    let trimmed = s.trim();
                    if let Ok(i) = trimmed.parse::<i64>() {
                        Ok(Value::Integer(i))
                    } else if let Ok(f) = trimmed.parse::<f64>() {
                        Ok(Value::Integer(f as i64))
                    } else {
                        Err(CastError::incompatible(self.sql_name(), value))
                    }
                }
                _ => Err(CastError::incompatible(self.sql_name(), value)),
            },

            ColumnType::Float | ColumnType::Decimal => match value {
                Value::Float(_) => Ok(value.clone()),
                Value::Integer(i) => Ok(Value::Float(*i as f64)),
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| CastError::incompatible(self.sql_name(), value)),
                _ => Err(CastError::incompatible(self.sql_name(), value)),
            },

            ColumnType::Text => match value {
                Value::Text(_) => Ok(value.clone()),
                Value::Integer(i) => Ok(Value::Text(i.to_string())),
                Value::Float(f) => Ok(Value::Text(f.to_string())),
                Value::Boolean(b) => Ok(Value::Text(b.to_string())),
                Value::Json(v) => Ok(Value::Text(v.to_string())),
                Value::Timestamp(_) => Ok(Value::Text(value.to_string())),
                Value::Bytes(b) => String::from_utf8(b.clone())
                    .map(Value::Text)
                    .map_err(|_| CastError::incompatible(self.sql_name(), value)),
                Value::Null => unreachable!(),
            },

            ColumnType::Binary => match value {
                Value::Bytes(_) => Ok(value.clone()),
                Value::Text(s) => Ok(Value::Bytes(s.clone().into_bytes())),
                _ => Err(CastError::incompatible(self.sql_name(), value)),
            },

            ColumnType::Json => match value {
                Value::Json(_) => Ok(value.clone()),
                Value::Text(s) => serde_json::from_str(s)
                    .map(Value::Json)
                    .map_err(|_| CastError::incompatible(self.sql_name(), value)),
                Value::Boolean(_) | Value::Integer(_) | Value::Float(_) => {
                    Ok(Value::Json(value.to_json()))
                }
                _ => Err(CastError::incompatible(self.sql_name(), value)),
            },

            ColumnType::Date => match value {
                Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
                    .map_err(|_| CastError::incompatible(self.sql_name(), value)),
                Value::Timestamp(t) => Ok(Value::Text(t.date_naive().format("%Y-%m-%d").to_string())),
                _ => Err(CastError::incompatible(self.sql_name(), value)),
            },

            ColumnType::Timestamp => match value {
                Value::Timestamp(_) => Ok(value.clone()),
                Value::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                    .map(|t| Value::Timestamp(t.with_timezone(&Utc)))
                    .map_err(|_| CastError::incompatible(self.sql_name(), value)),
                Value::Integer(secs) => Utc
                    .timestamp_opt(*secs, 0)
                    .single()
                    .map(Value::Timestamp)
                    .ok_or_else(|| CastError::incompatible(self.sql_name(), value)),
                _ => Err(CastError::incompatible(self.sql_name(), value)),
            },
        }
    }

    /// Serializes an application value into the storage direction.
    ///
    /// Same domain as [`cast_value`](Self::cast_value), except JSON documents
    /// flatten to their text encoding, which is what the column stores.
    pub fn serialize_value(&self, value: &Value) -> Result<Value, CastError> {
        let cast = self.cast_value(value)?;
        match (self, cast) {
            (ColumnType::Json, Value::Json(v)) => Ok(Value::Text(v.to_string())),
            (_, cast) => Ok(cast),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

/// Column descriptor as returned by the schema source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name; matched against declared attribute names
    pub name: AttributeName,

    /// Native type reported by the backing store
    pub native_type: ColumnType,

    /// Whether the column accepts NULL
    pub nullable: bool,

    /// Column-side default literal, if any
    pub default_literal: Option<Value>,
}

impl Column {
    /// Create a column descriptor with an explicit default literal.
    pub fn new(
        name: impl Into<AttributeName>,
        native_type: ColumnType,
        nullable: bool,
        default_literal: Option<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            native_type,
            nullable,
            default_literal,
        }
    }

    /// Create a nullable column with no default.
    pub fn simple(name: impl Into<AttributeName>, native_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            native_type,
            nullable: true,
            default_literal: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_casts() {
        let t = ColumnType::Integer;
        assert_eq!(t.cast_value(&Value::Text("42".into())).unwrap(), Value::Integer(42));
        assert_eq!(t.cast_value(&Value::Text("5.5".into())).unwrap(), Value::Integer(5));
        assert_eq!(t.cast_value(&Value::Float(3.9)).unwrap(), Value::Integer(3));
        assert_eq!(t.cast_value(&Value::Boolean(true)).unwrap(), Value::Integer(1));
        assert!(t.cast_value(&Value::Text("abc".into())).is_err());
    }

    #[test]
    fn test_boolean_casts() {
        let t = ColumnType::Boolean;
        assert_eq!(t.cast_value(&Value::Text("t".into())).unwrap(), Value::Boolean(true));
        assert_eq!(t.cast_value(&Value::Integer(0)).unwrap(), Value::Boolean(false));
        assert_eq!(t.cast_value(&Value::Text("".into())).unwrap(), Value::Null);
        assert!(t.cast_value(&Value::Text("maybe".into())).is_err());
    }

    #[test]
    fn test_json_cast_is_strict() {
        let t = ColumnType::Json;
        assert!(t.cast_value(&Value::Text("{not json".into())).is_err());
        let doc = Value::Text(r#"{"trial":true}"#.into());
        assert_eq!(
            t.cast_value(&doc).unwrap(),
            Value::Json(serde_json::json!({"trial": true}))
        );
    }

    #[test]
    fn test_json_serializes_to_text() {
        let t = ColumnType::Json;
        let stored = t
            .serialize_value(&Value::Json(serde_json::json!({"a": 1})))
            .unwrap();
        assert_eq!(stored, Value::Text(r#"{"a":1}"#.into()));
    }

    #[test]
    fn test_null_always_passes_through() {
        for t in [
            ColumnType::Boolean,
            ColumnType::Integer,
            ColumnType::Json,
            ColumnType::Timestamp,
        ] {
            assert_eq!(t.cast_value(&Value::Null).unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_symbolic_names() {
        assert_eq!(ColumnType::from_sql_name("integer"), Some(ColumnType::Integer));
        assert_eq!(ColumnType::from_sql_name("string"), Some(ColumnType::Text));
        assert_eq!(ColumnType::from_sql_name("datetime"), Some(ColumnType::Timestamp));
        assert_eq!(ColumnType::from_sql_name("nope"), None);
    }
}
