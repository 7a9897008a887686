//! Live schema capture and comparison.
//!
//! Two databases (or one database at two points in time) are compared at the
//! table and column level:
//!
//! ```text
//! + table audit_log
//! - column users.nickname (text)
//! ~ column users.age: integer -> bigint
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use keel_schema::normalize_sql;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MigrateResult;
use crate::session::Session;

/// Tables and column types read from a live database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSchema {
    /// Table name to column name to reported type.
    pub tables: BTreeMap<String, BTreeMap<String, String>>,
}

impl LiveSchema {
    /// Read every base table of `schema` through `session`.
    pub async fn capture(session: &dyn Session, schema: Option<&str>) -> MigrateResult<Self> {
        let mut tables = BTreeMap::new();
        for table in session.list_tables(schema).await? {
            let columns = session.column_types(&table, schema).await?;
            tables.insert(table, columns.into_iter().collect());
        }
        debug!(tables = tables.len(), "Captured live schema");
        Ok(Self { tables })
    }

    /// Add a table by hand.
    pub fn with_table(mut self, table: &str, columns: &[(&str, &str)]) -> Self {
        self.tables.insert(
            table.to_string(),
            columns
                .iter()
                .map(|(c, t)| (c.to_string(), t.to_string()))
                .collect(),
        );
        self
    }
}

/// One difference between two live schemas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveChange {
    /// Table only on the right.
    AddedTable(String),
    /// Table only on the left.
    RemovedTable(String),
    /// Column only on the right.
    AddedColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Column type.
        data_type: String,
    },
    /// Column only on the left.
    RemovedColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Column type.
        data_type: String,
    },
    /// Column on both sides with different types.
    ChangedType {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Type on the left.
        from: String,
        /// Type on the right.
        to: String,
    },
}

impl fmt::Display for LiveChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddedTable(t) => write!(f, "+ table {t}"),
            Self::RemovedTable(t) => write!(f, "- table {t}"),
            Self::AddedColumn {
                table,
                column,
                data_type,
            } => write!(f, "+ column {table}.{column} ({data_type})"),
            Self::RemovedColumn {
                table,
                column,
                data_type,
            } => write!(f, "- column {table}.{column} ({data_type})"),
            Self::ChangedType {
                table,
                column,
                from,
                to,
            } => write!(f, "~ column {table}.{column}: {from} -> {to}"),
        }
    }
}

/// Differences from `left` to `right`, ordered by table then column.
pub fn compare(left: &LiveSchema, right: &LiveSchema) -> Vec<LiveChange> {
    let names: BTreeSet<&String> = left.tables.keys().chain(right.tables.keys()).collect();
    let mut changes = Vec::new();

    for name in names {
        let (l, r) = match (left.tables.get(name), right.tables.get(name)) {
            (Some(l), Some(r)) => (l, r),
            (None, Some(_)) => {
                changes.push(LiveChange::AddedTable(name.clone()));
                continue;
            }
            (Some(_), None) => {
                changes.push(LiveChange::RemovedTable(name.clone()));
                continue;
            }
            (None, None) => continue,
        };

        let columns: BTreeSet<&String> = l.keys().chain(r.keys()).collect();
        for column in columns {
            match (l.get(column), r.get(column)) {
                (None, Some(ty)) => changes.push(LiveChange::AddedColumn {
                    table: name.clone(),
                    column: column.clone(),
                    data_type: ty.clone(),
                }),
                (Some(ty), None) => changes.push(LiveChange::RemovedColumn {
                    table: name.clone(),
                    column: column.clone(),
                    data_type: ty.clone(),
                }),
                (Some(from), Some(to)) if normalize_sql(from) != normalize_sql(to) => {
                    changes.push(LiveChange::ChangedType {
                        table: name.clone(),
                        column: column.clone(),
                        from: from.clone(),
                        to: to.clone(),
                    })
                }
                _ => {}
            }
        }
    }

    changes
}

/// [`compare`] rendered as tagged lines.
pub fn compare_lines(left: &LiveSchema, right: &LiveSchema) -> Vec<String> {
    compare(left, right).iter().map(ToString::to_string).collect()
}
