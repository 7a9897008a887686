//! Migration generation pipeline.
//!
//! Models are built into table schemas, diffed against the snapshot, and
//! rendered into one migration file per changed table. Files, manifest and
//! snapshot are updated together; a failure removes what was written.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use keel_schema::{ModelRegistry, SchemaBuilder, TableSchema};
use tracing::{debug, info, warn};

use crate::config::MigrationsConfig;
use crate::diff::{SchemaDiff, SchemaDiffer};
use crate::error::MigrateResult;
use crate::file::{MigrationFile, MigrationFileManager, migration_file_name};
use crate::manifest::{ManifestLedger, ManifestLock, RepairReport};
use crate::snapshot::{SchemaSnapshot, SnapshotStore};
use crate::sql::SqlGenerator;

/// Outcome of one generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Written migration files, in apply order.
    pub files: Vec<PathBuf>,
    /// Tables no model describes any more.
    pub orphaned_tables: Vec<String>,
    /// Changes made while enforcing the manifest.
    pub repair: RepairReport,
    /// Snapshot version after the run.
    pub snapshot_version: u64,
    /// Manifest version after the run.
    pub manifest_version: u64,
}

impl GenerationReport {
    /// Whether no migration was written.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Generates migrations for the directory in a [`MigrationsConfig`].
#[derive(Debug, Clone)]
pub struct MigrationGenerator {
    config: MigrationsConfig,
}

impl MigrationGenerator {
    /// Create a generator.
    pub fn new(config: &MigrationsConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Diff without writing anything.
    pub async fn plan(&self, registry: &ModelRegistry) -> MigrateResult<SchemaDiff> {
        let schema = SchemaBuilder::new(self.config.dialect).build(registry)?;
        let snapshot = SnapshotStore::new(&self.config.dir).load().await?;
        Ok(SchemaDiffer::new(&schema).with_baseline(&snapshot).diff())
    }

    /// Generate migrations stamped with the current time.
    pub async fn generate(&self, registry: &ModelRegistry) -> MigrateResult<GenerationReport> {
        self.generate_at(registry, Utc::now()).await
    }

    /// Generate migrations stamped with `now`.
    pub async fn generate_at(
        &self,
        registry: &ModelRegistry,
        now: DateTime<Utc>,
    ) -> MigrateResult<GenerationReport> {
        let files = MigrationFileManager::new(&self.config.dir);
        files.ensure_dir().await?;

        let ledger = ManifestLedger::new(&self.config.dir);
        let mut lock = ledger.load().await?;
        let repair = ledger.enforce(&mut lock, self.config.mode(), now).await?;

        let schema = SchemaBuilder::new(self.config.dialect).build(registry)?;
        let store = SnapshotStore::new(&self.config.dir);
        let mut snapshot = store.load().await?;
        let diff = SchemaDiffer::new(&schema).with_baseline(&snapshot).diff();

        for table in &diff.orphaned_tables {
            warn!(table = %table, "Table is in the snapshot but no model describes it; leaving it in place");
        }

        let mut report = GenerationReport {
            orphaned_tables: diff.orphaned_tables.clone(),
            repair,
            snapshot_version: snapshot.version,
            manifest_version: lock.version,
            ..GenerationReport::default()
        };

        if diff.is_empty() {
            debug!("No schema changes");
            return Ok(report);
        }
        debug!(summary = %diff.summary(), "Schema changes detected");

        let generator = SqlGenerator::new(self.config.dialect);
        let mut migrations: Vec<(MigrationFile, &TableSchema)> = Vec::new();
        for table in schema.tables.values() {
            let (action, sql) = if let Some(created) =
                diff.create_tables.iter().find(|t| t.name == table.name)
            {
                ("create", generator.create_table(created))
            } else if let Some(altered) = diff.alter_tables.iter().find(|a| a.table == table.name) {
                ("alter", generator.alter_table(altered)?)
            } else {
                continue;
            };
            if sql.is_empty() {
                warn!(table = %table.name, "Table changed but produced no SQL; skipping");
                continue;
            }

            let sequence = migrations.len() as u32 + 1;
            let name = migration_file_name(now, sequence, action, &table.name);
            migrations.push((MigrationFile::new(name, sql), table));
        }

        if migrations.is_empty() {
            debug!("Schema changes produced no migration");
            return Ok(report);
        }

        let previous_lock = lock.clone();
        let mut written = Vec::new();
        let outcome = self
            .commit(&files, &ledger, &store, &mut lock, &mut snapshot, &migrations, &mut written, now)
            .await;

        if let Err(e) = outcome {
            for name in &written {
                if let Err(cleanup) = files.remove(name).await {
                    warn!(file = %name, error = %cleanup, "Failed to remove partially generated migration");
                }
            }
            if lock.version != previous_lock.version {
                if let Err(cleanup) = ledger.save(&previous_lock).await {
                    warn!(error = %cleanup, "Failed to restore manifest");
                }
            }
            return Err(e);
        }

        report.files = migrations
            .iter()
            .map(|(file, _)| files.path_of(&file.name))
            .collect();
        report.snapshot_version = snapshot.version;
        report.manifest_version = lock.version;

        info!(
            count = report.files.len(),
            snapshot_version = snapshot.version,
            "Generated migrations"
        );
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn commit(
        &self,
        files: &MigrationFileManager,
        ledger: &ManifestLedger,
        store: &SnapshotStore,
        lock: &mut ManifestLock,
        snapshot: &mut SchemaSnapshot,
        migrations: &[(MigrationFile, &TableSchema)],
        written: &mut Vec<String>,
        now: DateTime<Utc>,
    ) -> MigrateResult<()> {
        for (file, _) in migrations {
            let path = files.write(file).await?;
            written.push(file.name.clone());
            debug!(path = %path.display(), "Wrote migration");
        }

        let mut next_lock = lock.clone();
        for (file, _) in migrations {
            next_lock.append(file.name.clone(), file.render().as_bytes(), now);
        }
        next_lock.touch(now);
        ledger.save(&next_lock).await?;
        *lock = next_lock;

        for (_, table) in migrations {
            snapshot.record(table);
        }
        snapshot.version += 1;
        store.save(snapshot).await?;

        Ok(())
    }
}
