//! Database session abstraction.
//!
//! Drivers implement [`Session`]; everything in this crate that touches a
//! live database goes through it. Calls are awaited one at a time.

use async_trait::async_trait;
use keel_schema::Dialect;
use serde_json::{Map, Value};

use crate::error::MigrateResult;

/// One result row, keyed by column name.
pub type Row = Map<String, Value>;

/// A live connection to one database.
#[async_trait]
pub trait Session: Send + Sync {
    /// Dialect spoken by this session.
    fn dialect(&self) -> Dialect;

    /// Execute one or more statements, discarding results.
    async fn execute(&self, sql: &str) -> MigrateResult<()>;

    /// Run a query and return its rows.
    async fn query(&self, sql: &str) -> MigrateResult<Vec<Row>>;

    /// Base tables in `schema` (dialect default when `None`), sorted by name.
    async fn list_tables(&self, schema: Option<&str>) -> MigrateResult<Vec<String>> {
        let sql = catalog::list_tables(self.dialect(), schema);
        let rows = self.query(&sql).await?;
        let mut tables: Vec<String> = rows
            .iter()
            .filter_map(|row| row_string(row, "table_name"))
            .collect();
        tables.sort();
        Ok(tables)
    }

    /// `(column, type)` pairs for `table`, in ordinal order.
    async fn column_types(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> MigrateResult<Vec<(String, String)>> {
        let sql = catalog::column_types(self.dialect(), table, schema);
        let rows = self.query(&sql).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some((
                    row_string(row, "column_name")?,
                    row_string(row, "data_type").unwrap_or_default(),
                ))
            })
            .collect())
    }
}

/// Read a column as a string, case-insensitively, stringifying scalars.
pub fn row_string(row: &Row, column: &str) -> Option<String> {
    let value = row.get(column).or_else(|| {
        row.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    })?;
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Quote a string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Catalog queries used by the default [`Session`] methods.
pub mod catalog {
    use keel_schema::Dialect;

    use super::quote_literal;

    /// Query listing base tables as `table_name`.
    pub fn list_tables(dialect: Dialect, schema: Option<&str>) -> String {
        match dialect {
            Dialect::Postgres => format!(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = {} AND table_type = 'BASE TABLE' ORDER BY table_name",
                quote_literal(schema.unwrap_or("public"))
            ),
            Dialect::MySql => format!(
                "SELECT TABLE_NAME AS table_name FROM information_schema.tables \
                 WHERE table_schema = {} AND table_type = 'BASE TABLE' ORDER BY TABLE_NAME",
                schema.map(quote_literal).unwrap_or_else(|| "DATABASE()".to_string())
            ),
            Dialect::SqlServer => format!(
                "SELECT TABLE_NAME AS table_name FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_SCHEMA = {} AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
                quote_literal(schema.unwrap_or("dbo"))
            ),
            Dialect::Sqlite => "SELECT name AS table_name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
                .to_string(),
        }
    }

    /// Query listing `column_name` / `data_type` for one table.
    pub fn column_types(dialect: Dialect, table: &str, schema: Option<&str>) -> String {
        match dialect {
            Dialect::Postgres => format!(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = {} AND table_name = {} ORDER BY ordinal_position",
                quote_literal(schema.unwrap_or("public")),
                quote_literal(table)
            ),
            Dialect::MySql => format!(
                "SELECT COLUMN_NAME AS column_name, COLUMN_TYPE AS data_type \
                 FROM information_schema.columns \
                 WHERE table_schema = {} AND table_name = {} ORDER BY ORDINAL_POSITION",
                schema.map(quote_literal).unwrap_or_else(|| "DATABASE()".to_string()),
                quote_literal(table)
            ),
            Dialect::SqlServer => format!(
                "SELECT COLUMN_NAME AS column_name, DATA_TYPE AS data_type \
                 FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {} ORDER BY ORDINAL_POSITION",
                quote_literal(schema.unwrap_or("dbo")),
                quote_literal(table)
            ),
            Dialect::Sqlite => format!(
                "SELECT name AS column_name, type AS data_type FROM pragma_table_info({}) ORDER BY cid",
                quote_literal(table)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_row_string_is_case_insensitive() {
        let r = row(json!({"TABLE_NAME": "users", "n": 3, "missing": null}));
        assert_eq!(row_string(&r, "table_name").as_deref(), Some("users"));
        assert_eq!(row_string(&r, "n").as_deref(), Some("3"));
        assert_eq!(row_string(&r, "missing"), None);
        assert_eq!(row_string(&r, "absent"), None);
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
    }

    #[test]
    fn test_catalog_queries_use_default_schema() {
        let pg = catalog::list_tables(Dialect::Postgres, None);
        assert!(pg.contains("table_schema = 'public'"));
        let mssql = catalog::list_tables(Dialect::SqlServer, None);
        assert!(mssql.contains("TABLE_SCHEMA = 'dbo'"));
        let mysql = catalog::list_tables(Dialect::MySql, None);
        assert!(mysql.contains("DATABASE()"));
        let mysql_named = catalog::list_tables(Dialect::MySql, Some("shop"));
        assert!(mysql_named.contains("'shop'"));
    }

    #[test]
    fn test_column_query_escapes_table() {
        let sql = catalog::column_types(Dialect::Sqlite, "we'ird", None);
        assert!(sql.contains("pragma_table_info('we''ird')"));
    }
}
