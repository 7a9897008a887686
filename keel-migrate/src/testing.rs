//! Recording [`Session`] double.
//!
//! Enabled for this crate's tests and, through the `testing` feature, for
//! downstream crates.

use std::collections::BTreeMap;

use async_trait::async_trait;
use keel_schema::Dialect;
use parking_lot::Mutex;

use crate::error::{MigrateResult, MigrationError};
use crate::session::{Row, Session};

#[derive(Debug, Default)]
struct MockState {
    executed: Vec<String>,
    queries: Vec<String>,
    failures: Vec<String>,
    responses: Vec<(String, Vec<Row>)>,
    tables: Vec<String>,
    columns: BTreeMap<String, Vec<(String, String)>>,
}

/// A session that records SQL instead of running it.
///
/// Statements containing a registered failure needle return a
/// [`MigrationError::Database`]; queries return the rows of the first
/// response whose needle they contain.
#[derive(Debug)]
pub struct MockSession {
    dialect: Dialect,
    state: Mutex<MockState>,
}

impl MockSession {
    /// Create a mock for `dialect`.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Fail any statement or query containing `needle`.
    pub fn fail_on(self, needle: impl Into<String>) -> Self {
        self.state.lock().failures.push(needle.into());
        self
    }

    /// Answer queries containing `needle` with `rows`.
    pub fn respond(self, needle: impl Into<String>, rows: Vec<Row>) -> Self {
        self.state.lock().responses.push((needle.into(), rows));
        self
    }

    /// Tables reported by [`Session::list_tables`].
    pub fn with_tables(self, tables: &[&str]) -> Self {
        self.state.lock().tables = tables.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Columns reported by [`Session::column_types`] for `table`.
    pub fn with_columns(self, table: &str, columns: &[(&str, &str)]) -> Self {
        self.state.lock().columns.insert(
            table.to_string(),
            columns
                .iter()
                .map(|(name, ty)| (name.to_string(), ty.to_string()))
                .collect(),
        );
        self
    }

    /// Stop failing statements containing `needle`.
    pub fn clear_failure(&self, needle: &str) {
        self.state.lock().failures.retain(|f| f != needle);
    }

    /// Statements passed to [`Session::execute`], failed ones included.
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().executed.clone()
    }

    /// Statements passed to [`Session::query`].
    pub fn queries(&self) -> Vec<String> {
        self.state.lock().queries.clone()
    }

    fn check(state: &MockState, sql: &str) -> MigrateResult<()> {
        match state.failures.iter().find(|needle| sql.contains(needle.as_str())) {
            Some(needle) => Err(MigrationError::database(format!(
                "mock failure on '{needle}'"
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Session for MockSession {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn execute(&self, sql: &str) -> MigrateResult<()> {
        let mut state = self.state.lock();
        state.executed.push(sql.to_string());
        Self::check(&state, sql)
    }

    async fn query(&self, sql: &str) -> MigrateResult<Vec<Row>> {
        let mut state = self.state.lock();
        state.queries.push(sql.to_string());
        Self::check(&state, sql)?;
        Ok(state
            .responses
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn list_tables(&self, _schema: Option<&str>) -> MigrateResult<Vec<String>> {
        let mut tables = self.state.lock().tables.clone();
        tables.sort();
        Ok(tables)
    }

    async fn column_types(
        &self,
        table: &str,
        _schema: Option<&str>,
    ) -> MigrateResult<Vec<(String, String)>> {
        Ok(self
            .state
            .lock()
            .columns
            .get(table)
            .cloned()
            .unwrap_or_default())
    }
}

/// Build a row from `(column, value)` pairs.
pub fn row<I, K, V>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<serde_json::Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
