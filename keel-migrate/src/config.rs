//! Configuration file parsing for `keel.toml`.
//!
//! ```toml
//! [migrations]
//! dir = "db/migrations"
//! dialect = "postgres"
//! tracking_table = "keel_migrations"
//! manifest_mode = "repair"
//! adopt_untracked = true
//!
//! [clean]
//! schema = "public"
//! include = ["users*"]
//! exclude = ["*_history"]
//! ```

use std::path::{Path, PathBuf};

use keel_schema::Dialect;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};
use crate::history::DEFAULT_TRACKING_TABLE;
use crate::manifest::{MANIFEST_FILE, ManifestMode};
use crate::snapshot::SNAPSHOT_FILE;

/// Main configuration structure for `keel.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeelConfig {
    /// Migration generation and application settings.
    #[serde(default)]
    pub migrations: MigrationsConfig,

    /// Clean (truncate) settings.
    #[serde(default)]
    pub clean: CleanConfig,
}

impl KeelConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrationError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> MigrateResult<Self> {
        toml::from_str(content).map_err(|e| MigrationError::config(e.to_string()))
    }
}

/// How the manifest ledger reacts to directory drift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestModeSetting {
    /// Any issue aborts generation.
    #[default]
    Strict,
    /// Issues are corrected in place.
    Repair,
}

/// `[migrations]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationsConfig {
    /// Directory holding migration files and lock files.
    pub dir: PathBuf,
    /// Target dialect.
    pub dialect: Dialect,
    /// Name of the applied-migrations tracking table.
    pub tracking_table: String,
    /// Manifest validation mode.
    pub manifest_mode: ManifestModeSetting,
    /// In repair mode, absorb migration files missing from the manifest.
    pub adopt_untracked: bool,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./migrations"),
            dialect: Dialect::default(),
            tracking_table: DEFAULT_TRACKING_TABLE.to_string(),
            manifest_mode: ManifestModeSetting::default(),
            adopt_untracked: false,
        }
    }
}

impl MigrationsConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the migrations directory.
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Set the dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set the tracking table name.
    pub fn tracking_table(mut self, table: impl Into<String>) -> Self {
        self.tracking_table = table.into();
        self
    }

    /// Set the manifest mode.
    pub fn manifest_mode(mut self, mode: ManifestMode) -> Self {
        match mode {
            ManifestMode::Strict => {
                self.manifest_mode = ManifestModeSetting::Strict;
                self.adopt_untracked = false;
            }
            ManifestMode::Repair { adopt_untracked } => {
                self.manifest_mode = ManifestModeSetting::Repair;
                self.adopt_untracked = adopt_untracked;
            }
        }
        self
    }

    /// Resolved manifest mode.
    pub fn mode(&self) -> ManifestMode {
        match self.manifest_mode {
            ManifestModeSetting::Strict => ManifestMode::Strict,
            ManifestModeSetting::Repair => ManifestMode::Repair {
                adopt_untracked: self.adopt_untracked,
            },
        }
    }

    /// Path of `schema.lock.json`.
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    /// Path of `manifest.lock.json`.
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }
}

/// `[clean]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanConfig {
    /// Schema (or database on MySQL) to clean. Dialect default when unset.
    pub schema: Option<String>,
    /// Glob patterns of tables to include. Empty means all.
    pub include: Vec<String>,
    /// Glob patterns of tables to skip. Exclusion wins over inclusion.
    pub exclude: Vec<String>,
    /// Skip the migration tracking table.
    pub exclude_internal: bool,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            schema: None,
            include: Vec::new(),
            exclude: Vec::new(),
            exclude_internal: true,
        }
    }
}
