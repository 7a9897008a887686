//! Persisted schema baseline (`schema.lock.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use keel_schema::{ForeignKey, IndexDefinition, TableSchema};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MigrateResult, MigrationError};
use crate::file::write_atomic;

/// File name of the schema snapshot inside the migrations directory.
pub const SNAPSHOT_FILE: &str = "schema.lock.json";

/// Last materialized picture of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Column name to full definition.
    pub columns: BTreeMap<String, String>,
    /// Column names in declaration order.
    pub order: Vec<String>,
    /// Foreign keys.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    /// Indexes.
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
}

impl From<&TableSchema> for TableSnapshot {
    fn from(table: &TableSchema) -> Self {
        Self {
            columns: table.column_types(),
            order: table.column_order(),
            foreign_keys: table.foreign_keys.clone(),
            indexes: table.indexes.clone(),
        }
    }
}

/// Versioned baseline of every table generation has seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Incremented on every change.
    pub version: u64,
    /// Tables by name.
    #[serde(default)]
    pub tables: BTreeMap<String, TableSnapshot>,
}

impl SchemaSnapshot {
    /// Look up a table.
    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.get(name)
    }

    /// Replace the recorded state of `table`.
    pub fn record(&mut self, table: &TableSchema) {
        self.tables.insert(table.name.clone(), TableSnapshot::from(table));
    }

    /// Check that every `order` entry matches a column.
    pub fn validate(&self) -> MigrateResult<()> {
        for (name, table) in &self.tables {
            let ordered: std::collections::BTreeSet<&String> = table.order.iter().collect();
            let keyed: std::collections::BTreeSet<&String> = table.columns.keys().collect();
            if ordered != keyed || ordered.len() != table.order.len() {
                return Err(MigrationError::validation(format!(
                    "snapshot table '{name}' has inconsistent column order"
                )));
            }
        }
        Ok(())
    }
}

/// Reads and writes the snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Store for the snapshot inside `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SNAPSHOT_FILE),
        }
    }

    /// Snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot; an absent file is an empty baseline.
    pub async fn load(&self) -> MigrateResult<SchemaSnapshot> {
        if !tokio::fs::try_exists(&self.path).await? {
            debug!(path = %self.path.display(), "No snapshot, starting from empty baseline");
            return Ok(SchemaSnapshot::default());
        }
        let content = tokio::fs::read(&self.path).await?;
        let snapshot: SchemaSnapshot = serde_json::from_slice(&content).map_err(|e| {
            MigrationError::validation(format!("{}: {e}", self.path.display()))
        })?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Write the snapshot atomically.
    pub async fn save(&self, snapshot: &SchemaSnapshot) -> MigrateResult<()> {
        let content = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.path, &content).await?;
        debug!(path = %self.path.display(), version = snapshot.version, "Wrote snapshot");
        Ok(())
    }
}
