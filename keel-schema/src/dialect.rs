//! SQL dialect profiles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Target database engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL.
    #[default]
    #[serde(alias = "postgresql")]
    Postgres,
    /// MySQL / MariaDB.
    MySql,
    /// Microsoft SQL Server.
    #[serde(alias = "mssql")]
    SqlServer,
    /// SQLite, used for tests and local tooling.
    Sqlite,
}

impl Dialect {
    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::SqlServer => "sqlserver",
            Self::Sqlite => "sqlite",
        }
    }

    /// Quote an identifier, doubling any embedded closing quote.
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Self::Postgres | Self::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
            Self::SqlServer => format!("[{}]", ident.replace(']', "]]")),
        }
    }

    /// Quote a possibly schema-qualified table name.
    pub fn quote_table(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(schema) => format!("{}.{}", self.quote(schema), self.quote(table)),
            None => self.quote(table),
        }
    }

    /// Whether `CREATE INDEX ... WHERE` is available.
    pub fn supports_partial_indexes(&self) -> bool {
        !matches!(self, Self::MySql)
    }

    /// Whether `CREATE INDEX IF NOT EXISTS` is available.
    pub fn supports_index_if_not_exists(&self) -> bool {
        matches!(self, Self::Postgres | Self::Sqlite)
    }

    /// Whether `DROP INDEX` must name the owning table.
    pub fn drop_index_names_table(&self) -> bool {
        matches!(self, Self::MySql | Self::SqlServer)
    }

    /// Whether foreign keys can be added or dropped on an existing table.
    pub fn supports_alter_constraints(&self) -> bool {
        !matches!(self, Self::Sqlite)
    }

    /// Schema used when none is configured. `None` means the connection's
    /// current database.
    pub fn default_schema(&self) -> Option<&'static str> {
        match self {
            Self::Postgres => Some("public"),
            Self::SqlServer => Some("dbo"),
            Self::MySql | Self::Sqlite => None,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlserver" | "mssql" => Ok(Self::SqlServer),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            _ => Err(SchemaError::UnknownDialect(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_per_dialect() {
        assert_eq!(Dialect::Postgres.quote("users"), "\"users\"");
        assert_eq!(Dialect::Sqlite.quote("users"), "\"users\"");
        assert_eq!(Dialect::MySql.quote("users"), "`users`");
        assert_eq!(Dialect::SqlServer.quote("users"), "[users]");
    }

    #[test]
    fn test_quote_escapes_closing_char() {
        assert_eq!(Dialect::Postgres.quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::MySql.quote("a`b"), "`a``b`");
        assert_eq!(Dialect::SqlServer.quote("a]b"), "[a]]b]");
    }

    #[test]
    fn test_quote_table() {
        assert_eq!(
            Dialect::SqlServer.quote_table(Some("dbo"), "users"),
            "[dbo].[users]"
        );
        assert_eq!(Dialect::Postgres.quote_table(None, "users"), "\"users\"");
    }

    #[test]
    fn test_feature_profile() {
        assert!(Dialect::Postgres.supports_partial_indexes());
        assert!(Dialect::SqlServer.supports_partial_indexes());
        assert!(Dialect::Sqlite.supports_partial_indexes());
        assert!(!Dialect::MySql.supports_partial_indexes());

        assert!(Dialect::MySql.drop_index_names_table());
        assert!(Dialect::SqlServer.drop_index_names_table());
        assert!(!Dialect::Postgres.drop_index_names_table());
    }

    #[test]
    fn test_from_str() {
        assert_eq!("postgresql".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("MSSQL".parse::<Dialect>().unwrap(), Dialect::SqlServer);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Dialect::SqlServer).unwrap();
        assert_eq!(json, "\"sqlserver\"");
        let parsed: Dialect = serde_json::from_str("\"mssql\"").unwrap();
        assert_eq!(parsed, Dialect::SqlServer);
    }
}
