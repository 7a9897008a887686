//! Structural teardown of a live database.

use keel_schema::Dialect;
use serde::Serialize;
use tracing::{info, warn};

use crate::clean::{
    MYSQL_FK_OFF, MYSQL_FK_ON, SQLITE_FK_OFF, SQLITE_FK_ON, StatementLog, qualified,
};
use crate::error::MigrateResult;
use crate::session::{Session, quote_literal, row_string};

/// Options for [`reset`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetOptions {
    /// Schema (database on MySQL) to reset; dialect default when `None`.
    pub schema: Option<String>,
    /// Plan without executing.
    pub dry_run: bool,
}

impl ResetOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Enable dry-run.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// How the structure was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetMethod {
    /// Schema dropped and recreated.
    DropSchema,
    /// Database dropped and recreated.
    DropDatabase,
    /// Tables dropped one by one.
    DropTables,
}

/// Outcome of [`reset`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    /// Dialect of the session.
    pub dialect: Dialect,
    /// Tables present before the reset.
    pub tables: Vec<String>,
    /// Statements executed (or planned on dry-run).
    pub statements: Vec<String>,
    /// Teardown method.
    pub method: ResetMethod,
    /// Whether nothing was executed.
    pub dry_run: bool,
}

/// Foreign keys of a SQL Server schema as `constraint_name`, `table_name`.
fn mssql_foreign_keys_sql(schema: &str) -> String {
    format!(
        "SELECT fk.name AS constraint_name, t.name AS table_name \
         FROM sys.foreign_keys fk \
         JOIN sys.tables t ON fk.parent_object_id = t.object_id \
         JOIN sys.schemas s ON t.schema_id = s.schema_id \
         WHERE s.name = {} ORDER BY t.name, fk.name",
        quote_literal(schema)
    )
}

async fn mysql_database(session: &dyn Session, schema: Option<&str>) -> MigrateResult<Option<String>> {
    if let Some(schema) = schema {
        return Ok(Some(schema.to_string()));
    }
    let rows = session.query("SELECT DATABASE() AS db").await?;
    Ok(rows.first().and_then(|row| row_string(row, "db")))
}

/// Drop every table in the target schema.
pub async fn reset(session: &dyn Session, options: &ResetOptions) -> MigrateResult<ResetReport> {
    let dialect = session.dialect();
    let schema = options.schema.as_deref();
    let tables = session.list_tables(schema).await?;

    let (method, planned) = match dialect {
        Dialect::Postgres => (ResetMethod::DropSchema, postgres_plan(schema)),
        Dialect::MySql => match mysql_database(session, schema).await? {
            Some(db) => (ResetMethod::DropDatabase, mysql_database_plan(&db)),
            None => (ResetMethod::DropTables, mysql_tables_plan(schema, &tables)),
        },
        Dialect::SqlServer => (
            ResetMethod::DropTables,
            mssql_plan(session, schema, &tables).await?,
        ),
        Dialect::Sqlite => (ResetMethod::DropTables, sqlite_plan(schema, &tables)),
    };

    if options.dry_run {
        return Ok(ResetReport {
            dialect,
            tables,
            statements: planned,
            method,
            dry_run: true,
        });
    }

    let mut log = StatementLog::new(session, "reset");
    let method = match (dialect, method) {
        (Dialect::MySql, ResetMethod::DropDatabase) => {
            let mut planned = planned.into_iter();
            let dropped = match planned.next() {
                Some(drop) => log.run(drop, "database").await,
                None => Ok(()),
            };
            match dropped {
                Ok(()) => {
                    // The database is gone; recreating it must not fall back.
                    for sql in planned {
                        log.run(sql, "database").await?;
                    }
                    ResetMethod::DropDatabase
                }
                Err(e) => {
                    warn!(error = %e, "Dropping the database failed, dropping tables instead");
                    run_guarded(&mut log, mysql_tables_plan(schema, &tables)).await?;
                    ResetMethod::DropTables
                }
            }
        }
        (Dialect::MySql | Dialect::Sqlite, method) => {
            run_guarded(&mut log, planned).await?;
            method
        }
        (_, method) => {
            for sql in planned {
                log.run(sql, "schema").await?;
            }
            method
        }
    };

    info!(dialect = %dialect, tables = tables.len(), method = ?method, "Reset database");
    Ok(ResetReport {
        dialect,
        tables,
        statements: log.statements,
        method,
        dry_run: false,
    })
}

/// Run a plan whose first and last statements toggle foreign key
/// enforcement; the last one always runs.
async fn run_guarded(log: &mut StatementLog<'_>, mut plan: Vec<String>) -> MigrateResult<()> {
    let restore = plan.pop();
    let mut outcome = Ok(());
    for sql in plan {
        if let Err(e) = log.run(sql, "tables").await {
            outcome = Err(e);
            break;
        }
    }
    if let Some(restore) = restore {
        let restored = log.run(restore, "foreign keys").await;
        outcome?;
        return restored;
    }
    outcome
}

fn postgres_plan(schema: Option<&str>) -> Vec<String> {
    let schema = Dialect::Postgres.quote(schema.unwrap_or("public"));
    vec![
        format!("DROP SCHEMA IF EXISTS {schema} CASCADE"),
        format!("CREATE SCHEMA {schema}"),
        format!("GRANT USAGE, CREATE ON SCHEMA {schema} TO PUBLIC"),
    ]
}

fn mysql_database_plan(database: &str) -> Vec<String> {
    let db = Dialect::MySql.quote(database);
    vec![
        format!("DROP DATABASE IF EXISTS {db}"),
        format!("CREATE DATABASE {db}"),
        format!("USE {db}"),
    ]
}

fn mysql_tables_plan(schema: Option<&str>, tables: &[String]) -> Vec<String> {
    let mut plan = vec![MYSQL_FK_OFF.to_string()];
    plan.extend(
        tables
            .iter()
            .map(|t| format!("DROP TABLE IF EXISTS {}", qualified(Dialect::MySql, schema, t))),
    );
    plan.push(MYSQL_FK_ON.to_string());
    plan
}

async fn mssql_plan(
    session: &dyn Session,
    schema: Option<&str>,
    tables: &[String],
) -> MigrateResult<Vec<String>> {
    let schema_name = schema.unwrap_or("dbo");
    let rows = session.query(&mssql_foreign_keys_sql(schema_name)).await?;

    let mut plan: Vec<String> = rows
        .iter()
        .filter_map(|row| {
            let constraint = row_string(row, "constraint_name")?;
            let table = row_string(row, "table_name")?;
            Some(format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                qualified(Dialect::SqlServer, Some(schema_name), &table),
                Dialect::SqlServer.quote(&constraint)
            ))
        })
        .collect();
    plan.extend(
        tables
            .iter()
            .map(|t| format!("DROP TABLE {}", qualified(Dialect::SqlServer, Some(schema_name), t))),
    );
    Ok(plan)
}

fn sqlite_plan(schema: Option<&str>, tables: &[String]) -> Vec<String> {
    let mut plan = vec![SQLITE_FK_OFF.to_string()];
    plan.extend(
        tables
            .iter()
            .map(|t| format!("DROP TABLE IF EXISTS {}", qualified(Dialect::Sqlite, schema, t))),
    );
    plan.push(SQLITE_FK_ON.to_string());
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockSession, row};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_postgres_drops_schema() {
        let session = MockSession::new(Dialect::Postgres).with_tables(&["users"]);
        let report = reset(&session, &ResetOptions::new()).await.unwrap();
        assert_eq!(report.method, ResetMethod::DropSchema);
        assert_eq!(
            session.executed(),
            vec![
                "DROP SCHEMA IF EXISTS \"public\" CASCADE",
                "CREATE SCHEMA \"public\"",
                "GRANT USAGE, CREATE ON SCHEMA \"public\" TO PUBLIC",
            ]
        );
    }

    #[tokio::test]
    async fn test_mysql_drops_database() {
        let session = MockSession::new(Dialect::MySql)
            .respond("DATABASE()", vec![row([("db", "shop")])])
            .with_tables(&["a"]);
        let report = reset(&session, &ResetOptions::new()).await.unwrap();
        assert_eq!(report.method, ResetMethod::DropDatabase);
        assert_eq!(
            session.executed(),
            vec!["DROP DATABASE IF EXISTS `shop`", "CREATE DATABASE `shop`", "USE `shop`"]
        );
    }

    #[tokio::test]
    async fn test_mysql_falls_back_to_tables() {
        let session = MockSession::new(Dialect::MySql)
            .with_tables(&["a", "b"])
            .fail_on("DROP DATABASE");
        let report = reset(&session, &ResetOptions::new().schema("shop")).await.unwrap();
        assert_eq!(report.method, ResetMethod::DropTables);
        assert_eq!(
            report.statements,
            vec![
                "SET FOREIGN_KEY_CHECKS = 0",
                "DROP TABLE IF EXISTS `shop`.`a`",
                "DROP TABLE IF EXISTS `shop`.`b`",
                "SET FOREIGN_KEY_CHECKS = 1",
            ]
        );
    }

    #[tokio::test]
    async fn test_mysql_recreate_failure_is_reported() {
        let session = MockSession::new(Dialect::MySql)
            .with_tables(&["a"])
            .fail_on("CREATE DATABASE");
        let err = reset(&session, &ResetOptions::new().schema("shop")).await.unwrap_err();
        assert!(err.to_string().contains("reset"));
        assert_eq!(
            session.executed(),
            vec!["DROP DATABASE IF EXISTS `shop`", "CREATE DATABASE `shop`"]
        );
    }

    #[tokio::test]
    async fn test_mssql_drops_constraints_first() {
        let session = MockSession::new(Dialect::SqlServer)
            .with_tables(&["orders", "users"])
            .respond(
                "sys.foreign_keys",
                vec![row([("constraint_name", "fk_orders_user_id"), ("table_name", "orders")])],
            );
        let report = reset(&session, &ResetOptions::new()).await.unwrap();
        assert_eq!(report.method, ResetMethod::DropTables);
        assert_eq!(
            session.executed(),
            vec![
                "ALTER TABLE [dbo].[orders] DROP CONSTRAINT [fk_orders_user_id]",
                "DROP TABLE [dbo].[orders]",
                "DROP TABLE [dbo].[users]",
            ]
        );
        assert!(session.queries()[0].contains("WHERE s.name = 'dbo'"));
    }

    #[tokio::test]
    async fn test_sqlite_restores_foreign_keys_on_error() {
        let session = MockSession::new(Dialect::Sqlite)
            .with_tables(&["a"])
            .fail_on("DROP TABLE");
        assert!(reset(&session, &ResetOptions::new()).await.is_err());
        assert_eq!(
            session.executed().last().map(String::as_str),
            Some("PRAGMA foreign_keys = ON")
        );
    }

    #[tokio::test]
    async fn test_dry_run() {
        let session = MockSession::new(Dialect::Sqlite).with_tables(&["a", "b"]);
        let report = reset(&session, &ResetOptions::new().dry_run(true)).await.unwrap();
        assert!(session.executed().is_empty());
        assert_eq!(report.tables, vec!["a", "b"]);
        assert_eq!(
            report.statements,
            vec![
                "PRAGMA foreign_keys = OFF",
                "DROP TABLE IF EXISTS \"a\"",
                "DROP TABLE IF EXISTS \"b\"",
                "PRAGMA foreign_keys = ON",
            ]
        );
    }
}
