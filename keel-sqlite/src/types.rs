//! Value conversion from SQLite to JSON rows.

use rusqlite::types::ValueRef;
use serde_json::Value as JsonValue;

/// Convert a SQLite ValueRef to a JSON Value. Blobs become lowercase hex.
pub fn from_sqlite_value(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => JsonValue::String(hex::encode(bytes)),
    }
}

/// Get the value of column `index` as JSON.
pub fn get_value_at_index(row: &rusqlite::Row<'_>, index: usize) -> JsonValue {
    row.get_ref(index)
        .map(from_sqlite_value)
        .unwrap_or(JsonValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_sqlite_value() {
        assert_eq!(from_sqlite_value(ValueRef::Null), JsonValue::Null);
        assert_eq!(from_sqlite_value(ValueRef::Integer(42)), JsonValue::from(42));
        assert_eq!(from_sqlite_value(ValueRef::Real(1.5)), JsonValue::from(1.5));
        assert_eq!(from_sqlite_value(ValueRef::Real(f64::NAN)), JsonValue::Null);
        assert_eq!(from_sqlite_value(ValueRef::Text(b"hi")), JsonValue::from("hi"));
        assert_eq!(from_sqlite_value(ValueRef::Blob(&[0xde, 0xad])), JsonValue::from("dead"));
    }
}
