//! Migration history tracking.
//!
//! The tracking table holds one row per applied version and is the only
//! source of truth for what has been applied.

use chrono::{DateTime, NaiveDateTime, Utc};
use keel_schema::Dialect;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MigrateResult, MigrationError};
use crate::session::{Session, quote_literal, row_string};

/// Default name of the tracking table.
pub const DEFAULT_TRACKING_TABLE: &str = "keel_migrations";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMigration {
    /// Migration version (file name without extension).
    pub version: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

/// DDL creating the tracking table if it does not exist.
pub fn create_table_sql(dialect: Dialect, table: &str) -> String {
    let t = dialect.quote(table);
    let version = dialect.quote("version");
    let applied_at = dialect.quote("applied_at");
    match dialect {
        Dialect::Postgres => format!(
            "CREATE TABLE IF NOT EXISTS {t} ({version} VARCHAR(255) PRIMARY KEY, {applied_at} TIMESTAMPTZ NOT NULL)"
        ),
        Dialect::MySql => format!(
            "CREATE TABLE IF NOT EXISTS {t} ({version} VARCHAR(255) NOT NULL PRIMARY KEY, {applied_at} DATETIME(6) NOT NULL) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
        ),
        Dialect::SqlServer => format!(
            "IF OBJECT_ID(N{}, N'U') IS NULL CREATE TABLE {t} ({version} NVARCHAR(255) NOT NULL PRIMARY KEY, {applied_at} DATETIME2(6) NOT NULL)",
            quote_literal(table)
        ),
        Dialect::Sqlite => format!(
            "CREATE TABLE IF NOT EXISTS {t} ({version} TEXT PRIMARY KEY, {applied_at} TEXT NOT NULL)"
        ),
    }
}

fn timestamp_literal(dialect: Dialect, at: DateTime<Utc>) -> String {
    let formatted = at.format(TIMESTAMP_FORMAT).to_string();
    match dialect {
        Dialect::Postgres => quote_literal(&format!("{formatted}+00")),
        _ => quote_literal(&formatted),
    }
}

/// Parse a timestamp as returned by any supported driver.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(at) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(at.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Tracking table accessor over one session.
pub struct MigrationHistory<'a> {
    session: &'a dyn Session,
    table: String,
}

impl<'a> MigrationHistory<'a> {
    /// Create a history accessor for `table`.
    pub fn new(session: &'a dyn Session, table: impl Into<String>) -> Self {
        Self {
            session,
            table: table.into(),
        }
    }

    /// Tracking table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn quoted_table(&self) -> String {
        self.session.dialect().quote(&self.table)
    }

    /// Create the tracking table if needed.
    pub async fn ensure_table(&self) -> MigrateResult<()> {
        let sql = create_table_sql(self.session.dialect(), &self.table);
        self.session
            .execute(&sql)
            .await
            .map_err(|e| e.during("ensure_table", &self.table))?;
        debug!(table = %self.table, "Ensured tracking table");
        Ok(())
    }

    /// All applied migrations, oldest first (ties by version).
    pub async fn applied(&self) -> MigrateResult<Vec<AppliedMigration>> {
        let dialect = self.session.dialect();
        let sql = format!(
            "SELECT {}, {} FROM {}",
            dialect.quote("version"),
            dialect.quote("applied_at"),
            self.quoted_table()
        );
        let rows = self
            .session
            .query(&sql)
            .await
            .map_err(|e| e.during("read_history", &self.table))?;

        let mut applied = rows
            .iter()
            .map(|row| {
                let version = row_string(row, "version").ok_or_else(|| {
                    MigrationError::validation(format!("row in '{}' has no version", self.table))
                })?;
                let raw = row_string(row, "applied_at").unwrap_or_default();
                let applied_at = parse_timestamp(&raw).ok_or_else(|| {
                    MigrationError::validation(format!(
                        "unreadable applied_at '{raw}' for version '{version}'"
                    ))
                })?;
                Ok(AppliedMigration {
                    version,
                    applied_at,
                })
            })
            .collect::<MigrateResult<Vec<_>>>()?;

        applied.sort_by(|a, b| {
            a.applied_at
                .cmp(&b.applied_at)
                .then_with(|| a.version.cmp(&b.version))
        });
        Ok(applied)
    }

    /// Record `version` as applied at `at`.
    pub async fn record(&self, version: &str, at: DateTime<Utc>) -> MigrateResult<()> {
        let dialect = self.session.dialect();
        let sql = format!(
            "INSERT INTO {} ({}, {}) VALUES ({}, {})",
            self.quoted_table(),
            dialect.quote("version"),
            dialect.quote("applied_at"),
            quote_literal(version),
            timestamp_literal(dialect, at)
        );
        self.session
            .execute(&sql)
            .await
            .map_err(|e| e.during("record", version))
    }

    /// Remove the record of `version`.
    pub async fn remove(&self, version: &str) -> MigrateResult<()> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            self.quoted_table(),
            self.session.dialect().quote("version"),
            quote_literal(version)
        );
        self.session
            .execute(&sql)
            .await
            .map_err(|e| e.during("unrecord", version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockSession, row};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_create_table_sql() {
        let pg = create_table_sql(Dialect::Postgres, DEFAULT_TRACKING_TABLE);
        assert!(pg.starts_with("CREATE TABLE IF NOT EXISTS \"keel_migrations\""));
        assert!(pg.contains("TIMESTAMPTZ"));

        let mysql = create_table_sql(Dialect::MySql, "hist");
        assert!(mysql.contains("`hist`"));
        assert!(mysql.ends_with("ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"));

        let mssql = create_table_sql(Dialect::SqlServer, "hist");
        assert!(mssql.starts_with("IF OBJECT_ID(N'hist', N'U') IS NULL CREATE TABLE [hist]"));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 5, 1, 12, 30, 0).unwrap();
        for raw in [
            "2026-05-01 12:30:00",
            "2026-05-01 12:30:00.000000",
            "2026-05-01T12:30:00",
            "2026-05-01T12:30:00Z",
            "2026-05-01 12:30:00+00",
            "2026-05-01 14:30:00.000000+02:00",
        ] {
            assert_eq!(parse_timestamp(raw), Some(expected), "{raw}");
        }
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[tokio::test]
    async fn test_record_and_remove_sql() {
        let session = MockSession::new(Dialect::Postgres);
        let history = MigrationHistory::new(&session, DEFAULT_TRACKING_TABLE);
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 12, 30, 0).unwrap();

        history.record("20260501123000_001_create_a", at).await.unwrap();
        history.remove("20260501123000_001_create_a").await.unwrap();

        assert_eq!(
            session.executed(),
            vec![
                "INSERT INTO \"keel_migrations\" (\"version\", \"applied_at\") VALUES ('20260501123000_001_create_a', '2026-05-01 12:30:00.000000+00')",
                "DELETE FROM \"keel_migrations\" WHERE \"version\" = '20260501123000_001_create_a'",
            ]
        );
    }

    #[tokio::test]
    async fn test_applied_is_ordered() {
        let session = MockSession::new(Dialect::Sqlite).respond(
            "FROM \"keel_migrations\"",
            vec![
                row([("version", "b"), ("applied_at", "2026-01-02 00:00:00.000000")]),
                row([("version", "c"), ("applied_at", "2026-01-01 00:00:00.000000")]),
                row([("version", "a"), ("applied_at", "2026-01-02 00:00:00.000000")]),
            ],
        );
        let history = MigrationHistory::new(&session, DEFAULT_TRACKING_TABLE);
        let versions: Vec<String> = history
            .applied()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.version)
            .collect();
        assert_eq!(versions, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_execution_failure_carries_context() {
        let session = MockSession::new(Dialect::Sqlite).fail_on("INSERT");
        let history = MigrationHistory::new(&session, DEFAULT_TRACKING_TABLE);
        let err = history.record("v1", Utc::now()).await.unwrap_err();
        match err {
            MigrationError::Execution { operation, context, .. } => {
                assert_eq!(operation, "record");
                assert_eq!(context, "v1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
