//! Migration file management.
//!
//! A migration is one `.sql` file holding both directions:
//!
//! ```sql
//! -- +migrate Up
//! CREATE TABLE "a" (...);
//!
//! -- +migrate Down
//! DROP TABLE IF EXISTS "a";
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{MigrateResult, MigrationError};
use crate::sql::MigrationSql;

/// Extension of migration files.
pub const MIGRATION_SUFFIX: &str = ".sql";
/// Suffix of the Up half of a split migration.
pub const SPLIT_UP_SUFFIX: &str = ".up.sql";
/// Suffix of the Down half of a split migration.
pub const SPLIT_DOWN_SUFFIX: &str = ".down.sql";

/// Marker opening the Up section.
pub const UP_MARKER: &str = "-- +migrate Up";
/// Marker opening the Down section.
pub const DOWN_MARKER: &str = "-- +migrate Down";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Up,
    Down,
}

fn marker_of(line: &str) -> Option<Marker> {
    let rest = line.trim().strip_prefix("--")?.trim_start();
    let rest = rest.strip_prefix("+migrate")?;
    match rest.split_whitespace().next()?.to_ascii_lowercase().as_str() {
        "up" => Some(Marker::Up),
        "down" => Some(Marker::Down),
        _ => None,
    }
}

/// Build a migration file name: `{YYYYMMDDHHMMSS}_{seq:03}_{action}_{table}.sql`.
pub fn migration_file_name(at: DateTime<Utc>, sequence: u32, action: &str, table: &str) -> String {
    format!(
        "{}_{sequence:03}_{action}_{table}{MIGRATION_SUFFIX}",
        at.format("%Y%m%d%H%M%S")
    )
}

/// Components of a migration file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationName {
    /// `YYYYMMDDHHMMSS`.
    pub timestamp: String,
    /// Sequence within one generation run.
    pub sequence: u32,
    /// `create` or `alter`.
    pub action: String,
    /// Table the migration targets.
    pub table: String,
}

impl MigrationName {
    /// Parse a migration file name.
    pub fn parse(file_name: &str) -> MigrateResult<Self> {
        let invalid = || MigrationError::validation(format!("invalid migration file name '{file_name}'"));

        let stem = file_name.strip_suffix(MIGRATION_SUFFIX).ok_or_else(invalid)?;
        let mut parts = stem.splitn(4, '_');
        let timestamp = parts.next().ok_or_else(invalid)?;
        let sequence = parts.next().ok_or_else(invalid)?;
        let action = parts.next().ok_or_else(invalid)?;
        let table = parts.next().ok_or_else(invalid)?;

        if timestamp.len() != 14 || !timestamp.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if sequence.len() < 3 || !sequence.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if action.is_empty() || !action.chars().all(|c| c.is_ascii_lowercase()) || table.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            timestamp: timestamp.to_string(),
            sequence: sequence.parse().map_err(|_| invalid())?,
            action: action.to_string(),
            table: table.to_string(),
        })
    }
}

/// Version recorded for a migration file: its name without extension.
pub fn version_of(file_name: &str) -> &str {
    file_name.strip_suffix(MIGRATION_SUFFIX).unwrap_or(file_name)
}

/// A migration with both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// File name, including extension.
    pub name: String,
    /// Up SQL content.
    pub up: String,
    /// Down SQL content.
    pub down: String,
}

impl MigrationFile {
    /// Create a new migration file.
    pub fn new(name: impl Into<String>, sql: MigrationSql) -> Self {
        Self {
            name: name.into(),
            up: sql.up,
            down: sql.down,
        }
    }

    /// Version recorded in the tracking table.
    pub fn version(&self) -> &str {
        version_of(&self.name)
    }

    /// File content.
    pub fn render(&self) -> String {
        format!(
            "{UP_MARKER}\n{}\n\n{DOWN_MARKER}\n{}\n",
            self.up.trim(),
            self.down.trim()
        )
    }

    /// Parse file content. Requires exactly one Up and one Down marker, Up first.
    pub fn parse(name: impl Into<String>, content: &str) -> MigrateResult<Self> {
        let name = name.into();
        let mut up: Option<Vec<&str>> = None;
        let mut down: Option<Vec<&str>> = None;
        let mut current: Option<Marker> = None;

        for (line_no, line) in content.lines().enumerate() {
            match marker_of(line) {
                Some(Marker::Up) => {
                    if up.is_some() {
                        return Err(MigrationError::validation(format!(
                            "{name}:{}: duplicate Up marker",
                            line_no + 1
                        )));
                    }
                    if down.is_some() {
                        return Err(MigrationError::validation(format!(
                            "{name}:{}: Up marker after Down marker",
                            line_no + 1
                        )));
                    }
                    up = Some(Vec::new());
                    current = Some(Marker::Up);
                }
                Some(Marker::Down) => {
                    if down.is_some() {
                        return Err(MigrationError::validation(format!(
                            "{name}:{}: duplicate Down marker",
                            line_no + 1
                        )));
                    }
                    if up.is_none() {
                        return Err(MigrationError::validation(format!(
                            "{name}:{}: Down marker before Up marker",
                            line_no + 1
                        )));
                    }
                    down = Some(Vec::new());
                    current = Some(Marker::Down);
                }
                None => match current {
                    Some(Marker::Up) => up.get_or_insert_with(Vec::new).push(line),
                    Some(Marker::Down) => down.get_or_insert_with(Vec::new).push(line),
                    None => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() && !trimmed.starts_with("--") {
                            return Err(MigrationError::validation(format!(
                                "{name}:{}: statement before Up marker",
                                line_no + 1
                            )));
                        }
                    }
                },
            }
        }

        let up = up.ok_or_else(|| MigrationError::validation(format!("{name}: missing Up marker")))?;
        let down =
            down.ok_or_else(|| MigrationError::validation(format!("{name}: missing Down marker")))?;

        Ok(Self {
            name,
            up: up.join("\n").trim().to_string(),
            down: down.join("\n").trim().to_string(),
        })
    }
}

/// Migration file reader/writer.
#[derive(Debug, Clone)]
pub struct MigrationFileManager {
    migrations_dir: PathBuf,
}

impl MigrationFileManager {
    /// Create a new file manager.
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    /// Get the migrations directory.
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Full path of a file in the migrations directory.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.migrations_dir.join(name)
    }

    /// Ensure the migrations directory exists.
    pub async fn ensure_dir(&self) -> MigrateResult<()> {
        tokio::fs::create_dir_all(&self.migrations_dir).await?;
        Ok(())
    }

    /// Every `*.sql` file name, sorted.
    pub async fn list_sql_files(&self) -> MigrateResult<Vec<String>> {
        let mut names = Vec::new();

        if !tokio::fs::try_exists(&self.migrations_dir).await? {
            return Ok(names);
        }

        let mut entries = tokio::fs::read_dir(&self.migrations_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(MIGRATION_SUFFIX) {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Single-file migrations in ascending name order.
    pub async fn list_migrations(&self) -> MigrateResult<Vec<String>> {
        Ok(self
            .list_sql_files()
            .await?
            .into_iter()
            .filter(|n| !n.ends_with(SPLIT_UP_SUFFIX) && !n.ends_with(SPLIT_DOWN_SUFFIX))
            .collect())
    }

    /// Read and parse a migration.
    pub async fn read(&self, name: &str) -> MigrateResult<MigrationFile> {
        let path = self.path_of(name);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MigrationError::not_found(format!(
                    "migration file '{}'",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        MigrationFile::parse(name, &content)
    }

    /// Write a new migration; an existing file with the same name is an error.
    pub async fn write(&self, migration: &MigrationFile) -> MigrateResult<PathBuf> {
        self.ensure_dir().await?;
        let path = self.path_of(&migration.name);

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => MigrationError::validation(format!(
                    "migration file '{}' already exists",
                    migration.name
                )),
                _ => MigrationError::Io(e),
            })?;
        file.write_all(migration.render().as_bytes()).await?;
        file.flush().await?;

        debug!(path = %path.display(), "Wrote migration file");
        Ok(path)
    }

    /// Delete a migration file if present.
    pub async fn remove(&self, name: &str) -> MigrateResult<()> {
        match tokio::fs::remove_file(self.path_of(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `content` to a sibling temp file, then rename it over `path`.
pub(crate) async fn write_atomic(path: &Path, content: &[u8]) -> MigrateResult<()> {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, content).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}
