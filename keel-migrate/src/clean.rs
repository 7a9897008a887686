//! Data-only cleaning of a live database.
//!
//! Every table that passes the include/exclude filters is emptied while its
//! structure is kept. Each dialect has its own strategy and fallback.

use keel_schema::Dialect;
use regex_lite::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CleanConfig;
use crate::error::{MigrateResult, MigrationError};
use crate::session::{Session, quote_literal};

/// Options for [`clean`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanOptions {
    /// Schema to clean; dialect default when `None`.
    pub schema: Option<String>,
    /// Table globs to include; empty means all.
    pub include: Vec<String>,
    /// Table globs to skip.
    pub exclude: Vec<String>,
    /// Tables owned by Keel itself.
    pub internal_tables: Vec<String>,
    /// Skip [`Self::internal_tables`].
    pub exclude_internal: bool,
    /// Plan without executing.
    pub dry_run: bool,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            schema: None,
            include: Vec::new(),
            exclude: Vec::new(),
            internal_tables: Vec::new(),
            exclude_internal: true,
            dry_run: false,
        }
    }
}

impl CleanOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options from the `[clean]` section; `tracking_table` is internal.
    pub fn from_config(config: &CleanConfig, tracking_table: &str) -> Self {
        Self {
            schema: config.schema.clone(),
            include: config.include.clone(),
            exclude: config.exclude.clone(),
            internal_tables: vec![tracking_table.to_string()],
            exclude_internal: config.exclude_internal,
            dry_run: false,
        }
    }

    /// Set the schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Add an include glob.
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include.push(pattern.into());
        self
    }

    /// Add an exclude glob.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    /// Mark a table as internal.
    pub fn internal_table(mut self, table: impl Into<String>) -> Self {
        self.internal_tables.push(table.into());
        self
    }

    /// Whether internal tables are skipped.
    pub fn exclude_internal(mut self, exclude: bool) -> Self {
        self.exclude_internal = exclude;
        self
    }

    /// Enable dry-run.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// How rows were removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanMethod {
    /// `TRUNCATE` for every table.
    Truncate,
    /// `DELETE` for every table.
    Delete,
    /// `TRUNCATE` with per-table `DELETE` fallback.
    Mixed,
}

/// Outcome of [`clean`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    /// Dialect of the session.
    pub dialect: Dialect,
    /// Tables selected by the filters.
    pub tables: Vec<String>,
    /// Statements executed (or planned on dry-run).
    pub statements: Vec<String>,
    /// Removal method.
    pub method: CleanMethod,
    /// Number of tables emptied.
    pub affected_tables: usize,
    /// Whether nothing was executed.
    pub dry_run: bool,
}

/// A compiled `*` / `?` table glob.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    /// Compile a glob; `*` matches any run, `?` one character.
    pub fn new(glob: &str) -> MigrateResult<Self> {
        let mut pattern = String::with_capacity(glob.len() + 2);
        pattern.push('^');
        for c in glob.chars() {
            match c {
                '*' => pattern.push_str(".*"),
                '?' => pattern.push('.'),
                c => pattern.push_str(&regex_lite::escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern)
            .map_err(|e| MigrationError::config(format!("invalid table pattern '{glob}': {e}")))?;
        Ok(Self {
            source: glob.to_string(),
            regex,
        })
    }

    /// Original glob text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `name` matches.
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// Include/exclude table selection. Exclusion wins.
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    include: Vec<GlobPattern>,
    exclude: Vec<GlobPattern>,
    internal: Vec<String>,
}

impl TableFilter {
    /// Compile the filters in `options`.
    pub fn from_options(options: &CleanOptions) -> MigrateResult<Self> {
        Ok(Self {
            include: options
                .include
                .iter()
                .map(|g| GlobPattern::new(g))
                .collect::<MigrateResult<_>>()?,
            exclude: options
                .exclude
                .iter()
                .map(|g| GlobPattern::new(g))
                .collect::<MigrateResult<_>>()?,
            internal: if options.exclude_internal {
                options.internal_tables.clone()
            } else {
                Vec::new()
            },
        })
    }

    /// Whether `table` is selected.
    pub fn accepts(&self, table: &str) -> bool {
        if self.internal.iter().any(|t| t == table) {
            return false;
        }
        if self.exclude.iter().any(|p| p.matches(table)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches(table))
    }

    /// Selected tables, in input order.
    pub fn apply(&self, tables: Vec<String>) -> Vec<String> {
        tables.into_iter().filter(|t| self.accepts(t)).collect()
    }
}

/// Executes statements in order and records them.
pub(crate) struct StatementLog<'a> {
    session: &'a dyn Session,
    operation: &'static str,
    pub(crate) statements: Vec<String>,
}

impl<'a> StatementLog<'a> {
    pub(crate) fn new(session: &'a dyn Session, operation: &'static str) -> Self {
        Self {
            session,
            operation,
            statements: Vec::new(),
        }
    }

    /// Run `sql`; the error carries `context`.
    pub(crate) async fn run(&mut self, sql: String, context: &str) -> MigrateResult<()> {
        debug!(operation = self.operation, sql = %sql, "Executing");
        let result = self
            .session
            .execute(&sql)
            .await
            .map_err(|e| e.during(self.operation, context));
        if result.is_ok() {
            self.statements.push(sql);
        }
        result
    }
}

pub(crate) fn qualified(dialect: Dialect, schema: Option<&str>, table: &str) -> String {
    dialect.quote_table(schema.or(dialect.default_schema()), table)
}

/// Planned statements for the primary strategy of `dialect`.
pub fn plan(dialect: Dialect, schema: Option<&str>, tables: &[String]) -> Vec<String> {
    if tables.is_empty() {
        return Vec::new();
    }
    let names: Vec<String> = tables.iter().map(|t| qualified(dialect, schema, t)).collect();
    match dialect {
        Dialect::Postgres => vec![format!(
            "TRUNCATE TABLE {} RESTART IDENTITY CASCADE",
            names.join(", ")
        )],
        Dialect::MySql => {
            let mut statements = vec![MYSQL_FK_OFF.to_string()];
            statements.extend(names.iter().map(|n| format!("TRUNCATE TABLE {n}")));
            statements.push(MYSQL_FK_ON.to_string());
            statements
        }
        Dialect::SqlServer => names.iter().map(|n| format!("TRUNCATE TABLE {n}")).collect(),
        Dialect::Sqlite => {
            let mut statements = vec![SQLITE_FK_OFF.to_string()];
            statements.extend(names.iter().map(|n| format!("DELETE FROM {n}")));
            statements.push(SQLITE_FK_ON.to_string());
            statements
        }
    }
}

pub(crate) const MYSQL_FK_OFF: &str = "SET FOREIGN_KEY_CHECKS = 0";
pub(crate) const MYSQL_FK_ON: &str = "SET FOREIGN_KEY_CHECKS = 1";
pub(crate) const SQLITE_FK_OFF: &str = "PRAGMA foreign_keys = OFF";
pub(crate) const SQLITE_FK_ON: &str = "PRAGMA foreign_keys = ON";
const MSSQL_NOCHECK_ALL: &str = "EXEC sp_MSforeachtable 'ALTER TABLE ? NOCHECK CONSTRAINT ALL'";
const MSSQL_CHECK_ALL: &str = "EXEC sp_MSforeachtable 'ALTER TABLE ? WITH CHECK CHECK CONSTRAINT ALL'";

/// Empty every selected table, keeping structure.
pub async fn clean(session: &dyn Session, options: &CleanOptions) -> MigrateResult<CleanReport> {
    let dialect = session.dialect();
    let filter = TableFilter::from_options(options)?;
    let tables = filter.apply(session.list_tables(options.schema.as_deref()).await?);
    let schema = options.schema.as_deref();

    let primary_method = match dialect {
        Dialect::Sqlite => CleanMethod::Delete,
        _ => CleanMethod::Truncate,
    };

    if options.dry_run || tables.is_empty() {
        debug!(tables = tables.len(), dry_run = options.dry_run, "Clean planned");
        return Ok(CleanReport {
            dialect,
            statements: if options.dry_run {
                plan(dialect, schema, &tables)
            } else {
                Vec::new()
            },
            affected_tables: tables.len(),
            tables,
            method: primary_method,
            dry_run: options.dry_run,
        });
    }

    let mut log = StatementLog::new(session, "clean");
    let method = match dialect {
        Dialect::Postgres => {
            for sql in plan(dialect, schema, &tables) {
                log.run(sql, "all tables").await?;
            }
            CleanMethod::Truncate
        }
        Dialect::MySql => clean_mysql(&mut log, schema, &tables).await?,
        Dialect::SqlServer => clean_mssql(&mut log, schema, &tables).await?,
        Dialect::Sqlite => clean_sqlite(&mut log, schema, &tables).await?,
    };

    info!(dialect = %dialect, tables = tables.len(), method = ?method, "Cleaned database");
    Ok(CleanReport {
        dialect,
        affected_tables: tables.len(),
        tables,
        statements: log.statements,
        method,
        dry_run: false,
    })
}

async fn clean_mysql(
    log: &mut StatementLog<'_>,
    schema: Option<&str>,
    tables: &[String],
) -> MigrateResult<CleanMethod> {
    log.run(MYSQL_FK_OFF.to_string(), "foreign key checks").await?;

    let mut method = CleanMethod::Truncate;
    let mut outcome = Ok(());
    for table in tables {
        let name = qualified(Dialect::MySql, schema, table);
        if let Err(e) = log.run(format!("TRUNCATE TABLE {name}"), table).await {
            warn!(table = %table, error = %e, "TRUNCATE failed, falling back to DELETE");
            method = CleanMethod::Mixed;
            if let Err(e) = log.run(format!("DELETE FROM {name}"), table).await {
                outcome = Err(e);
                break;
            }
        }
    }

    let restore = log.run(MYSQL_FK_ON.to_string(), "foreign key checks").await;
    outcome?;
    restore?;
    Ok(method)
}

async fn clean_mssql(
    log: &mut StatementLog<'_>,
    schema: Option<&str>,
    tables: &[String],
) -> MigrateResult<CleanMethod> {
    let names: Vec<String> = tables
        .iter()
        .map(|t| qualified(Dialect::SqlServer, schema, t))
        .collect();

    let mut truncated = true;
    for (table, name) in tables.iter().zip(&names) {
        if let Err(e) = log.run(format!("TRUNCATE TABLE {name}"), table).await {
            warn!(table = %table, error = %e, "TRUNCATE failed, falling back to DELETE for all tables");
            truncated = false;
            break;
        }
    }
    if truncated {
        return Ok(CleanMethod::Truncate);
    }

    log.run(MSSQL_NOCHECK_ALL.to_string(), "constraints").await?;

    let mut outcome = Ok(());
    for (table, name) in tables.iter().zip(&names) {
        if let Err(e) = log.run(format!("DELETE FROM {name}"), table).await {
            outcome = Err(e);
            break;
        }
        let literal = quote_literal(name);
        let reseed = format!(
            "IF OBJECTPROPERTY(OBJECT_ID({literal}), 'TableHasIdentity') = 1 DBCC CHECKIDENT ({literal}, RESEED, 0)"
        );
        if let Err(e) = log.run(reseed, table).await {
            outcome = Err(e);
            break;
        }
    }

    let restore = log.run(MSSQL_CHECK_ALL.to_string(), "constraints").await;
    outcome?;
    restore?;
    Ok(CleanMethod::Delete)
}

async fn clean_sqlite(
    log: &mut StatementLog<'_>,
    schema: Option<&str>,
    tables: &[String],
) -> MigrateResult<CleanMethod> {
    log.run(SQLITE_FK_OFF.to_string(), "foreign keys").await?;

    let mut outcome = Ok(());
    for table in tables {
        let sql = format!("DELETE FROM {}", qualified(Dialect::Sqlite, schema, table));
        if let Err(e) = log.run(sql, table).await {
            outcome = Err(e);
            break;
        }
    }

    let restore = log.run(SQLITE_FK_ON.to_string(), "foreign keys").await;
    outcome?;
    restore?;
    Ok(CleanMethod::Delete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSession;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_glob_pattern() {
        let glob = GlobPattern::new("user?_*").unwrap();
        assert!(glob.matches("users_history"));
        assert!(!glob.matches("user_history"));
        assert!(!glob.matches("xusers_a"));
        assert!(GlobPattern::new("a.b").unwrap().matches("a.b"));
        assert!(!GlobPattern::new("a.b").unwrap().matches("axb"));
    }

    #[test]
    fn test_filter_exclude_wins() {
        let options = CleanOptions::new()
            .include("users*")
            .exclude("*_history")
            .internal_table("keel_migrations");
        let filter = TableFilter::from_options(&options).unwrap();
        let tables = vec![
            "keel_migrations".to_string(),
            "orders".to_string(),
            "users".to_string(),
            "users_history".to_string(),
        ];
        assert_eq!(filter.apply(tables), vec!["users"]);
    }

    #[test]
    fn test_filter_internal_toggle() {
        let options = CleanOptions::new()
            .internal_table("keel_migrations")
            .exclude_internal(false);
        let filter = TableFilter::from_options(&options).unwrap();
        assert!(filter.accepts("keel_migrations"));
    }

    #[test]
    fn test_from_config() {
        let config = CleanConfig {
            include: vec!["a*".into()],
            ..CleanConfig::default()
        };
        let options = CleanOptions::from_config(&config, "keel_migrations");
        assert_eq!(options.internal_tables, vec!["keel_migrations"]);
        assert!(options.exclude_internal);
        assert_eq!(options.include, vec!["a*"]);
    }

    #[tokio::test]
    async fn test_postgres_single_truncate() {
        let session = MockSession::new(Dialect::Postgres).with_tables(&["users", "orders"]);
        let report = clean(&session, &CleanOptions::new()).await.unwrap();
        assert_eq!(
            session.executed(),
            vec!["TRUNCATE TABLE \"public\".\"orders\", \"public\".\"users\" RESTART IDENTITY CASCADE"]
        );
        assert_eq!(report.method, CleanMethod::Truncate);
        assert_eq!(report.affected_tables, 2);
    }

    #[tokio::test]
    async fn test_mysql_fallback_is_mixed() {
        let session = MockSession::new(Dialect::MySql)
            .with_tables(&["a", "b"])
            .fail_on("TRUNCATE TABLE `b`");
        let report = clean(&session, &CleanOptions::new()).await.unwrap();
        assert_eq!(report.method, CleanMethod::Mixed);
        assert_eq!(
            session.executed(),
            vec![
                "SET FOREIGN_KEY_CHECKS = 0",
                "TRUNCATE TABLE `a`",
                "TRUNCATE TABLE `b`",
                "DELETE FROM `b`",
                "SET FOREIGN_KEY_CHECKS = 1",
            ]
        );
        assert!(!report.statements.contains(&"TRUNCATE TABLE `b`".to_string()));
    }

    #[tokio::test]
    async fn test_mysql_restores_checks_on_error() {
        let session = MockSession::new(Dialect::MySql)
            .with_tables(&["a"])
            .fail_on("`a`");
        let err = clean(&session, &CleanOptions::new()).await.unwrap_err();
        assert!(matches!(err, MigrationError::Execution { .. }));
        assert_eq!(
            session.executed().last().map(String::as_str),
            Some("SET FOREIGN_KEY_CHECKS = 1")
        );
    }

    #[tokio::test]
    async fn test_mssql_truncate() {
        let session = MockSession::new(Dialect::SqlServer).with_tables(&["a", "b"]);
        let report = clean(&session, &CleanOptions::new()).await.unwrap();
        assert_eq!(report.method, CleanMethod::Truncate);
        assert_eq!(
            session.executed(),
            vec!["TRUNCATE TABLE [dbo].[a]", "TRUNCATE TABLE [dbo].[b]"]
        );
    }

    #[tokio::test]
    async fn test_mssql_delete_fallback() {
        let session = MockSession::new(Dialect::SqlServer)
            .with_tables(&["a", "b"])
            .fail_on("TRUNCATE TABLE [dbo].[b]");
        let report = clean(&session, &CleanOptions::new()).await.unwrap();
        assert_eq!(report.method, CleanMethod::Delete);
        assert_eq!(
            session.executed(),
            vec![
                "TRUNCATE TABLE [dbo].[a]",
                "TRUNCATE TABLE [dbo].[b]",
                "EXEC sp_MSforeachtable 'ALTER TABLE ? NOCHECK CONSTRAINT ALL'",
                "DELETE FROM [dbo].[a]",
                "IF OBJECTPROPERTY(OBJECT_ID('[dbo].[a]'), 'TableHasIdentity') = 1 DBCC CHECKIDENT ('[dbo].[a]', RESEED, 0)",
                "DELETE FROM [dbo].[b]",
                "IF OBJECTPROPERTY(OBJECT_ID('[dbo].[b]'), 'TableHasIdentity') = 1 DBCC CHECKIDENT ('[dbo].[b]', RESEED, 0)",
                "EXEC sp_MSforeachtable 'ALTER TABLE ? WITH CHECK CHECK CONSTRAINT ALL'",
            ]
        );
    }

    #[tokio::test]
    async fn test_sqlite_delete() {
        let session = MockSession::new(Dialect::Sqlite).with_tables(&["a"]);
        let report = clean(&session, &CleanOptions::new()).await.unwrap();
        assert_eq!(report.method, CleanMethod::Delete);
        assert_eq!(
            session.executed(),
            vec!["PRAGMA foreign_keys = OFF", "DELETE FROM \"a\"", "PRAGMA foreign_keys = ON"]
        );
    }

    #[tokio::test]
    async fn test_dry_run_executes_nothing() {
        let session = MockSession::new(Dialect::Postgres).with_tables(&["users", "users_history", "orders"]);
        let options = CleanOptions::new()
            .include("users*")
            .exclude("*_history")
            .dry_run(true);
        let report = clean(&session, &options).await.unwrap();

        assert!(session.executed().is_empty());
        assert!(report.dry_run);
        assert_eq!(report.tables, vec!["users"]);
        assert_eq!(report.affected_tables, 1);
        assert_eq!(
            report.statements,
            vec!["TRUNCATE TABLE \"public\".\"users\" RESTART IDENTITY CASCADE"]
        );
    }

    #[tokio::test]
    async fn test_no_tables_is_noop() {
        let session = MockSession::new(Dialect::MySql);
        let report = clean(&session, &CleanOptions::new()).await.unwrap();
        assert!(session.executed().is_empty());
        assert_eq!(report.affected_tables, 0);
    }
}
