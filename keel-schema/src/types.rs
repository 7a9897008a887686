//! Declared field types and their per-dialect SQL spelling.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::dialect::Dialect;

/// Default `VARCHAR` length for string columns without an explicit size.
pub const DEFAULT_STRING_SIZE: u32 = 255;

/// Scalar value types a field can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    BigInt,
    /// 16-bit integer.
    SmallInt,
    /// Single precision float.
    Float,
    /// Double precision float.
    Double,
    /// Fixed point number.
    Decimal { precision: u8, scale: u8 },
    /// Bounded string (`VARCHAR`).
    String,
    /// Unbounded text.
    Text,
    /// Boolean.
    Boolean,
    /// Timestamp with time zone.
    DateTime,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// JSON document.
    Json,
    /// Binary data.
    Bytes,
    /// UUID.
    Uuid,
}

impl ScalarType {
    /// Get the type name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int => "Int",
            Self::BigInt => "BigInt",
            Self::SmallInt => "SmallInt",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::Decimal { .. } => "Decimal",
            Self::String => "String",
            Self::Text => "Text",
            Self::Boolean => "Boolean",
            Self::DateTime => "DateTime",
            Self::Date => "Date",
            Self::Time => "Time",
            Self::Json => "Json",
            Self::Bytes => "Bytes",
            Self::Uuid => "Uuid",
        }
    }

    /// Whether the type can carry an auto-increment/identity property.
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Int | Self::BigInt | Self::SmallInt)
    }

    /// SQL type for this scalar on `dialect`.
    ///
    /// `size` only applies to [`ScalarType::String`]. When `auto_increment`
    /// is set on Postgres the serial pseudo-types are returned; other
    /// dialects express auto-increment as a column constraint.
    pub fn sql_type(&self, dialect: Dialect, size: Option<u32>, auto_increment: bool) -> String {
        let size = size.unwrap_or(DEFAULT_STRING_SIZE);
        match dialect {
            Dialect::Postgres => match self {
                Self::Int if auto_increment => "SERIAL".to_string(),
                Self::BigInt if auto_increment => "BIGSERIAL".to_string(),
                Self::SmallInt if auto_increment => "SMALLSERIAL".to_string(),
                Self::Int => "INTEGER".to_string(),
                Self::BigInt => "BIGINT".to_string(),
                Self::SmallInt => "SMALLINT".to_string(),
                Self::Float => "REAL".to_string(),
                Self::Double => "DOUBLE PRECISION".to_string(),
                Self::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
                Self::String => format!("VARCHAR({size})"),
                Self::Text => "TEXT".to_string(),
                Self::Boolean => "BOOLEAN".to_string(),
                Self::DateTime => "TIMESTAMPTZ".to_string(),
                Self::Date => "DATE".to_string(),
                Self::Time => "TIME".to_string(),
                Self::Json => "JSONB".to_string(),
                Self::Bytes => "BYTEA".to_string(),
                Self::Uuid => "UUID".to_string(),
            },
            Dialect::MySql => match self {
                Self::Int => "INT".to_string(),
                Self::BigInt => "BIGINT".to_string(),
                Self::SmallInt => "SMALLINT".to_string(),
                Self::Float => "FLOAT".to_string(),
                Self::Double => "DOUBLE".to_string(),
                Self::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
                Self::String => format!("VARCHAR({size})"),
                Self::Text => "LONGTEXT".to_string(),
                Self::Boolean => "TINYINT(1)".to_string(),
                Self::DateTime => "DATETIME(3)".to_string(),
                Self::Date => "DATE".to_string(),
                Self::Time => "TIME".to_string(),
                Self::Json => "JSON".to_string(),
                Self::Bytes => "LONGBLOB".to_string(),
                Self::Uuid => "CHAR(36)".to_string(),
            },
            Dialect::SqlServer => match self {
                Self::Int => "INT".to_string(),
                Self::BigInt => "BIGINT".to_string(),
                Self::SmallInt => "SMALLINT".to_string(),
                Self::Float => "REAL".to_string(),
                Self::Double => "FLOAT".to_string(),
                Self::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
                Self::String => format!("NVARCHAR({size})"),
                Self::Text | Self::Json => "NVARCHAR(MAX)".to_string(),
                Self::Boolean => "BIT".to_string(),
                Self::DateTime => "DATETIMEOFFSET".to_string(),
                Self::Date => "DATE".to_string(),
                Self::Time => "TIME".to_string(),
                Self::Bytes => "VARBINARY(MAX)".to_string(),
                Self::Uuid => "UNIQUEIDENTIFIER".to_string(),
            },
            Dialect::Sqlite => match self {
                Self::Int | Self::BigInt | Self::SmallInt => "INTEGER".to_string(),
                Self::Float | Self::Double => "REAL".to_string(),
                Self::Decimal { .. } => "NUMERIC".to_string(),
                Self::String | Self::Text | Self::Json | Self::Uuid => "TEXT".to_string(),
                Self::Boolean => "BOOLEAN".to_string(),
                Self::DateTime => "DATETIME".to_string(),
                Self::Date => "DATE".to_string(),
                Self::Time => "TIME".to_string(),
                Self::Bytes => "BLOB".to_string(),
            },
        }
    }
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A declared field type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// A scalar column type.
    Scalar(ScalarType),
    /// A reference to another model (relation).
    Model(SmolStr),
}

impl FieldType {
    /// Check if this is a relation to another model.
    pub fn is_relation(&self) -> bool {
        matches!(self, Self::Model(_))
    }

    /// Get the type name as a string.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Scalar(s) => s.as_str(),
            Self::Model(name) => name.as_str(),
        }
    }
}

impl From<ScalarType> for FieldType {
    fn from(scalar: ScalarType) -> Self {
        Self::Scalar(scalar)
    }
}

/// Modifier for field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TypeModifier {
    /// Required field.
    #[default]
    Required,
    /// Optional (nullable) field.
    Optional,
    /// Collection field.
    List,
}

impl TypeModifier {
    /// Check if the field is optional.
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional)
    }

    /// Check if the field is a list.
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_on_postgres() {
        assert_eq!(ScalarType::Int.sql_type(Dialect::Postgres, None, true), "SERIAL");
        assert_eq!(ScalarType::BigInt.sql_type(Dialect::Postgres, None, true), "BIGSERIAL");
        assert_eq!(ScalarType::Int.sql_type(Dialect::Postgres, None, false), "INTEGER");
    }

    #[test]
    fn test_string_size() {
        assert_eq!(ScalarType::String.sql_type(Dialect::MySql, None, false), "VARCHAR(255)");
        assert_eq!(
            ScalarType::String.sql_type(Dialect::SqlServer, Some(64), false),
            "NVARCHAR(64)"
        );
        assert_eq!(ScalarType::String.sql_type(Dialect::Sqlite, Some(64), false), "TEXT");
    }

    #[test]
    fn test_dialect_specific_types() {
        assert_eq!(ScalarType::Boolean.sql_type(Dialect::MySql, None, false), "TINYINT(1)");
        assert_eq!(ScalarType::Boolean.sql_type(Dialect::SqlServer, None, false), "BIT");
        assert_eq!(ScalarType::Json.sql_type(Dialect::Postgres, None, false), "JSONB");
        assert_eq!(
            ScalarType::Uuid.sql_type(Dialect::SqlServer, None, false),
            "UNIQUEIDENTIFIER"
        );
        assert_eq!(
            ScalarType::Decimal { precision: 10, scale: 2 }.sql_type(Dialect::Postgres, None, false),
            "DECIMAL(10,2)"
        );
    }

    #[test]
    fn test_field_type_helpers() {
        let relation = FieldType::Model("User".into());
        assert!(relation.is_relation());
        assert_eq!(relation.type_name(), "User");
        assert_eq!(FieldType::from(ScalarType::Text).type_name(), "Text");
    }

    #[test]
    fn test_type_modifier() {
        assert!(TypeModifier::Optional.is_optional());
        assert!(TypeModifier::List.is_list());
        assert!(!TypeModifier::Required.is_optional());
    }
}
