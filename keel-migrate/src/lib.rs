//! # keel-migrate
//!
//! Migration engine for Keel.
//!
//! This crate provides functionality for:
//! - Diffing model schemas against a persisted snapshot (`schema.lock.json`)
//! - Reversible SQL generation for PostgreSQL, MySQL and SQL Server
//! - A hash-signed manifest (`manifest.lock.json`) guarding the migration directory
//! - Applying and rolling back migrations, tracked in a database table
//! - Comparing live schemas
//! - Cleaning (truncate) and resetting (drop) live databases
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌─────────────┐
//! │ Model        │────▶│ Schema Differ  │────▶│ SQL Gen     │
//! │ Registry     │     │ (vs snapshot)  │     └─────────────┘
//! └──────────────┘     └────────────────┘            │
//!                                                    ▼
//!                      ┌────────────────┐     ┌─────────────┐
//!                      │ Manifest       │◀───▶│ Migration   │
//!                      │ Ledger         │     │ Files       │
//!                      └────────────────┘     └─────────────┘
//!                                                    │
//!                                                    ▼
//!                                             ┌─────────────┐
//!                                             │ Runner +    │
//!                                             │ History Tbl │
//!                                             └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use keel_migrate::{MigrationGenerator, MigrationRunner, MigrationsConfig};
//!
//! async fn migrate(session: &dyn keel_migrate::Session, registry: &keel_schema::ModelRegistry)
//!     -> keel_migrate::MigrateResult<()>
//! {
//!     let config = MigrationsConfig::new().dir("./migrations");
//!
//!     let report = MigrationGenerator::new(&config).generate(registry).await?;
//!     println!("Wrote {} migrations", report.files.len());
//!
//!     let applied = MigrationRunner::new(session, &config).up().await?;
//!     println!("Applied {applied:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Migration Files
//!
//! One file per changed table, both directions in the same file:
//!
//! ```text
//! migrations/
//! ├── 20260101120000_001_create_users.sql
//! ├── 20260101120000_002_create_orders.sql
//! ├── 20260214093000_001_alter_users.sql
//! ├── manifest.lock.json
//! └── schema.lock.json
//! ```

pub mod clean;
pub mod config;
pub mod diff;
pub mod error;
pub mod file;
pub mod generate;
pub mod history;
pub mod live;
pub mod manifest;
pub mod reset;
pub mod runner;
pub mod session;
pub mod snapshot;
pub mod sql;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clean::{CleanMethod, CleanOptions, CleanReport, GlobPattern, TableFilter, clean};
pub use config::{CleanConfig, KeelConfig, ManifestModeSetting, MigrationsConfig};
pub use diff::{
    AlteredColumn, ColumnDiff, ColumnEntry, ForeignKeyDiff, IndexDiff, SchemaDiff, SchemaDiffer,
    TableAlterDiff, diff_columns,
};
pub use error::{MigrateResult, MigrationError};
pub use file::{MigrationFile, MigrationFileManager, MigrationName, migration_file_name};
pub use generate::{GenerationReport, MigrationGenerator};
pub use history::{AppliedMigration, DEFAULT_TRACKING_TABLE, MigrationHistory};
pub use live::{LiveChange, LiveSchema, compare, compare_lines};
pub use manifest::{
    IssueKind, MANIFEST_FILE, ManifestEntry, ManifestIssue, ManifestLedger, ManifestLock,
    ManifestMode, RepairReport, sha256_hex,
};
pub use reset::{ResetMethod, ResetOptions, ResetReport, reset};
pub use runner::{MigrationRunner, MigrationStatus, RollbackTarget};
pub use session::{Row, Session};
pub use snapshot::{SNAPSHOT_FILE, SchemaSnapshot, SnapshotStore, TableSnapshot};
pub use sql::{MigrationSql, SqlGenerator};
