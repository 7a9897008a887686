//! Applying and rolling back migration files.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::MigrationsConfig;
use crate::error::{MigrateResult, MigrationError};
use crate::file::{MIGRATION_SUFFIX, MigrationFileManager, version_of};
use crate::history::{AppliedMigration, MigrationHistory};
use crate::session::Session;

/// How far to roll back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackTarget {
    /// Undo the most recent `n` migrations.
    Steps(usize),
    /// Undo everything applied after this version; the version itself stays.
    Version(String),
}

/// Applied and pending migrations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Applied migrations, oldest first.
    pub applied: Vec<AppliedMigration>,
    /// Versions with a file but no tracking row, in apply order.
    pub pending: Vec<String>,
    /// Applied versions whose file is gone.
    pub missing: Vec<String>,
}

impl MigrationStatus {
    /// Whether everything on disk has been applied.
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Runs migration files against one session.
pub struct MigrationRunner<'a> {
    session: &'a dyn Session,
    files: MigrationFileManager,
    history: MigrationHistory<'a>,
}

impl<'a> MigrationRunner<'a> {
    /// Create a runner for the migrations in `config.dir`.
    pub fn new(session: &'a dyn Session, config: &MigrationsConfig) -> Self {
        Self {
            session,
            files: MigrationFileManager::new(&config.dir),
            history: MigrationHistory::new(session, config.tracking_table.clone()),
        }
    }

    /// Tracking table accessor.
    pub fn history(&self) -> &MigrationHistory<'a> {
        &self.history
    }

    /// Create the tracking table if needed.
    pub async fn ensure_table(&self) -> MigrateResult<()> {
        self.history.ensure_table().await
    }

    /// Apply every pending migration in file name order.
    ///
    /// Stops at the first failure; the failing version stays unrecorded.
    pub async fn up(&self) -> MigrateResult<Vec<String>> {
        self.history.ensure_table().await?;
        let applied: BTreeSet<String> = self
            .history
            .applied()
            .await?
            .into_iter()
            .map(|m| m.version)
            .collect();

        let mut done = Vec::new();
        for name in self.files.list_migrations().await? {
            let version = version_of(&name).to_string();
            if applied.contains(&version) {
                continue;
            }

            let migration = self.files.read(&name).await?;
            if !migration.up.is_empty() {
                self.session
                    .execute(&migration.up)
                    .await
                    .map_err(|e| e.during("apply", &version))?;
            }
            self.history.record(&version, Utc::now()).await?;

            info!(version = %version, "Applied migration");
            done.push(version);
        }

        if done.is_empty() {
            debug!("No pending migrations");
        }
        Ok(done)
    }

    /// Roll back the most recently applied migration.
    pub async fn down(&self) -> MigrateResult<Vec<String>> {
        self.rollback(RollbackTarget::Steps(1)).await
    }

    /// Roll back migrations, most recently applied first.
    pub async fn rollback(&self, target: RollbackTarget) -> MigrateResult<Vec<String>> {
        self.history.ensure_table().await?;
        let mut applied = self.history.applied().await?;
        applied.reverse();

        let selected: Vec<String> = match &target {
            RollbackTarget::Steps(n) => applied.into_iter().take(*n).map(|m| m.version).collect(),
            RollbackTarget::Version(stop) => {
                if !applied.iter().any(|m| &m.version == stop) {
                    return Err(MigrationError::not_found(format!(
                        "rollback target '{stop}' is not applied"
                    )));
                }
                applied
                    .into_iter()
                    .map(|m| m.version)
                    .take_while(|v| v != stop)
                    .collect()
            }
        };

        let mut done = Vec::new();
        for version in selected {
            let name = format!("{version}{MIGRATION_SUFFIX}");
            let migration = self.files.read(&name).await?;
            if migration.down.is_empty() {
                return Err(MigrationError::not_found(format!(
                    "Down section of migration '{version}'"
                )));
            }

            self.session
                .execute(&migration.down)
                .await
                .map_err(|e| e.during("rollback", &version))?;
            self.history.remove(&version).await?;

            info!(version = %version, "Rolled back migration");
            done.push(version);
        }
        Ok(done)
    }

    /// Compare the tracking table with the files on disk.
    pub async fn status(&self) -> MigrateResult<MigrationStatus> {
        self.history.ensure_table().await?;
        let applied = self.history.applied().await?;
        let on_disk: Vec<String> = self
            .files
            .list_migrations()
            .await?
            .iter()
            .map(|name| version_of(name).to_string())
            .collect();

        let applied_versions: BTreeSet<&str> = applied.iter().map(|m| m.version.as_str()).collect();
        let disk_versions: BTreeSet<&str> = on_disk.iter().map(String::as_str).collect();

        let pending = on_disk
            .iter()
            .filter(|v| !applied_versions.contains(v.as_str()))
            .cloned()
            .collect();
        let missing = applied
            .iter()
            .filter(|m| !disk_versions.contains(m.version.as_str()))
            .map(|m| m.version.clone())
            .collect();

        Ok(MigrationStatus {
            applied,
            pending,
            missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::MigrationFile;
    use crate::sql::MigrationSql;
    use crate::testing::{MockSession, row};
    use keel_schema::Dialect;
    use pretty_assertions::assert_eq;

    async fn setup(files: &[(&str, &str, &str)]) -> (tempfile::TempDir, MigrationsConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = MigrationsConfig::new().dir(dir.path()).dialect(Dialect::Sqlite);
        let manager = MigrationFileManager::new(dir.path());
        for (name, up, down) in files {
            manager
                .write(&MigrationFile::new(
                    *name,
                    MigrationSql {
                        up: up.to_string(),
                        down: down.to_string(),
                    },
                ))
                .await
                .unwrap();
        }
        (dir, config)
    }

    fn applied_rows(versions: &[(&str, &str)]) -> Vec<crate::session::Row> {
        versions
            .iter()
            .map(|(v, at)| row([("version", *v), ("applied_at", *at)]))
            .collect()
    }

    #[tokio::test]
    async fn test_up_applies_pending_in_order() {
        let (_dir, config) = setup(&[
            ("2_b.sql", "CREATE TABLE b (x);", "DROP TABLE b;"),
            ("1_a.sql", "CREATE TABLE a (x);", "DROP TABLE a;"),
            ("3_c.sql", "CREATE TABLE c (x);", "DROP TABLE c;"),
        ])
        .await;
        let session = MockSession::new(Dialect::Sqlite).respond(
            "FROM \"keel_migrations\"",
            applied_rows(&[("1_a", "2026-01-01 00:00:00")]),
        );
        let runner = MigrationRunner::new(&session, &config);

        assert_eq!(runner.up().await.unwrap(), vec!["2_b", "3_c"]);

        let executed = session.executed();
        assert!(executed[0].starts_with("CREATE TABLE IF NOT EXISTS \"keel_migrations\""));
        assert_eq!(executed[1], "CREATE TABLE b (x);");
        assert!(executed[2].starts_with("INSERT INTO \"keel_migrations\""));
        assert!(executed[2].contains("'2_b'"));
        assert_eq!(executed[3], "CREATE TABLE c (x);");
        assert!(!executed.iter().any(|s| s.contains("CREATE TABLE a")));
    }

    #[tokio::test]
    async fn test_up_is_fail_fast() {
        let (_dir, config) = setup(&[
            ("1_a.sql", "CREATE TABLE a (x);", "DROP TABLE a;"),
            ("2_b.sql", "CREATE TABLE b (x);", "DROP TABLE b;"),
        ])
        .await;
        let session = MockSession::new(Dialect::Sqlite).fail_on("CREATE TABLE a");
        let runner = MigrationRunner::new(&session, &config);

        let err = runner.up().await.unwrap_err();
        match err {
            MigrationError::Execution { operation, context, .. } => {
                assert_eq!(operation, "apply");
                assert_eq!(context, "1_a");
            }
            other => panic!("unexpected error: {other}"),
        }
        let executed = session.executed();
        assert!(!executed.iter().any(|s| s.starts_with("INSERT")));
        assert!(!executed.iter().any(|s| s.contains("CREATE TABLE b")));
    }

    #[tokio::test]
    async fn test_rollback_steps_most_recent_first() {
        let (_dir, config) = setup(&[
            ("1_a.sql", "CREATE TABLE a (x);", "DROP TABLE a;"),
            ("2_b.sql", "CREATE TABLE b (x);", "DROP TABLE b;"),
            ("3_c.sql", "CREATE TABLE c (x);", "DROP TABLE c;"),
        ])
        .await;
        let session = MockSession::new(Dialect::Sqlite).respond(
            "FROM \"keel_migrations\"",
            applied_rows(&[
                ("1_a", "2026-01-01 00:00:00"),
                ("2_b", "2026-01-02 00:00:00"),
                ("3_c", "2026-01-02 00:00:00"),
            ]),
        );
        let runner = MigrationRunner::new(&session, &config);

        assert_eq!(
            runner.rollback(RollbackTarget::Steps(2)).await.unwrap(),
            vec!["3_c", "2_b"]
        );
        let executed = session.executed();
        assert_eq!(executed[1], "DROP TABLE c;");
        assert!(executed[2].starts_with("DELETE FROM \"keel_migrations\""));
        assert_eq!(executed[3], "DROP TABLE b;");
    }

    #[tokio::test]
    async fn test_rollback_to_version() {
        let (_dir, config) = setup(&[
            ("1_a.sql", "SELECT 1;", "SELECT -1;"),
            ("2_b.sql", "SELECT 2;", "SELECT -2;"),
        ])
        .await;
        let session = MockSession::new(Dialect::Sqlite).respond(
            "FROM \"keel_migrations\"",
            applied_rows(&[("1_a", "2026-01-01 00:00:00"), ("2_b", "2026-01-02 00:00:00")]),
        );
        let runner = MigrationRunner::new(&session, &config);

        assert_eq!(
            runner
                .rollback(RollbackTarget::Version("1_a".into()))
                .await
                .unwrap(),
            vec!["2_b"]
        );
        let err = runner
            .rollback(RollbackTarget::Version("9_z".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rollback_missing_down_is_not_found() {
        let (_dir, config) = setup(&[("1_a.sql", "SELECT 1;", "")]).await;

        let session = MockSession::new(Dialect::Sqlite).respond(
            "FROM \"keel_migrations\"",
            applied_rows(&[("1_a", "2026-01-01 00:00:00")]),
        );
        let err = MigrationRunner::new(&session, &config).down().await.unwrap_err();
        assert!(matches!(err, MigrationError::NotFound(_)));
        assert!(!session.executed().iter().any(|s| s.starts_with("DELETE")));

        let session = MockSession::new(Dialect::Sqlite).respond(
            "FROM \"keel_migrations\"",
            applied_rows(&[("1_a", "2026-01-01 00:00:00"), ("0_gone", "2026-01-02 00:00:00")]),
        );
        let err = MigrationRunner::new(&session, &config).down().await.unwrap_err();
        assert!(matches!(err, MigrationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_status() {
        let (_dir, config) = setup(&[
            ("1_a.sql", "SELECT 1;", "SELECT -1;"),
            ("2_b.sql", "SELECT 2;", "SELECT -2;"),
        ])
        .await;
        let session = MockSession::new(Dialect::Sqlite).respond(
            "FROM \"keel_migrations\"",
            applied_rows(&[("1_a", "2026-01-01 00:00:00"), ("0_old", "2025-01-01 00:00:00")]),
        );
        let runner = MigrationRunner::new(&session, &config);

        let status = runner.status().await.unwrap();
        assert_eq!(status.applied.len(), 2);
        assert_eq!(status.pending, vec!["2_b"]);
        assert_eq!(status.missing, vec!["0_old"]);
        assert!(!status.is_up_to_date());
    }
}
