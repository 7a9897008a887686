//! Manifest integrity ledger (`manifest.lock.json`).
//!
//! Every migration file is recorded with the SHA-256 of its content. Before
//! generation the directory is scanned against the ledger; drift is either
//! fatal ([`ManifestMode::Strict`]) or corrected in place
//! ([`ManifestMode::Repair`]).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{MigrateResult, MigrationError};
use crate::file::{
    MIGRATION_SUFFIX, MigrationFileManager, SPLIT_DOWN_SUFFIX, SPLIT_UP_SUFFIX, write_atomic,
};

/// File name of the manifest inside the migrations directory.
pub const MANIFEST_FILE: &str = "manifest.lock.json";

/// SHA-256 of `content` as lowercase hex.
pub fn sha256_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// One signed migration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// File name, including extension.
    pub name: String,
    /// SHA-256 hex of the file content.
    pub sql_sha256: String,
    /// When the entry was recorded.
    pub created_utc: DateTime<Utc>,
}

/// The whole ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestLock {
    /// Incremented on every change.
    pub version: u64,
    /// Entries ordered by name.
    #[serde(default)]
    pub migrations: Vec<ManifestEntry>,
    /// Time of the last change.
    #[serde(default)]
    pub updated_utc: Option<DateTime<Utc>>,
}

impl ManifestLock {
    /// Look up an entry by file name.
    pub fn entry(&self, name: &str) -> Option<&ManifestEntry> {
        self.migrations.iter().find(|e| e.name == name)
    }

    /// Check name uniqueness and suffixes.
    pub fn validate(&self) -> MigrateResult<()> {
        let mut seen = BTreeSet::new();
        for entry in &self.migrations {
            if !entry.name.ends_with(MIGRATION_SUFFIX) {
                return Err(MigrationError::validation(format!(
                    "manifest entry '{}' is not a {MIGRATION_SUFFIX} file",
                    entry.name
                )));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(MigrationError::validation(format!(
                    "duplicate manifest entry '{}'",
                    entry.name
                )));
            }
        }
        Ok(())
    }

    /// Add an entry for a freshly written file.
    pub fn append(&mut self, name: impl Into<String>, content: &[u8], now: DateTime<Utc>) {
        self.migrations.push(ManifestEntry {
            name: name.into(),
            sql_sha256: sha256_hex(content),
            created_utc: now,
        });
    }

    /// Bump the version, re-sort, and stamp the update time.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.migrations.sort_by(|a, b| a.name.cmp(&b.name));
        self.updated_utc = Some(now);
    }
}

/// Kind of drift between the directory and the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// File content no longer matches the recorded hash.
    HashMismatch,
    /// Recorded file is gone.
    MissingFile,
    /// File exists but is not recorded.
    UntrackedMigration,
    /// A split `.up.sql` / `.down.sql` file has no partner.
    MissingPair,
}

impl IssueKind {
    /// Stable identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HashMismatch => "hash_mismatch",
            Self::MissingFile => "missing_file",
            Self::UntrackedMigration => "untracked_migration",
            Self::MissingPair => "missing_pair",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single integrity problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestIssue {
    /// Issue kind.
    pub kind: IssueKind,
    /// File the issue concerns.
    pub file: String,
    /// Recorded hash, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Hash found on disk, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl ManifestIssue {
    fn new(kind: IssueKind, file: impl Into<String>) -> Self {
        Self {
            kind,
            file: file.into(),
            expected: None,
            actual: None,
        }
    }
}

impl fmt::Display for ManifestIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.file)?;
        if let (Some(expected), Some(actual)) = (&self.expected, &self.actual) {
            write!(f, " (expected {expected}, found {actual})")?;
        }
        Ok(())
    }
}

/// How drift is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ManifestMode {
    /// Any issue aborts.
    #[default]
    Strict,
    /// Fix what can be fixed.
    Repair {
        /// Record untracked files instead of leaving them unresolved.
        adopt_untracked: bool,
    },
}

/// What a repair pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Entries whose hash was recomputed.
    pub rehashed: Vec<String>,
    /// Entries removed because their file is gone.
    pub pruned: Vec<String>,
    /// Untracked files added to the ledger.
    pub adopted: Vec<String>,
    /// Issues left in place.
    pub unresolved: Vec<ManifestIssue>,
}

impl RepairReport {
    /// Whether the ledger was modified.
    pub fn changed(&self) -> bool {
        !self.rehashed.is_empty() || !self.pruned.is_empty() || !self.adopted.is_empty()
    }
}

/// Reads, verifies and writes the manifest of one migrations directory.
#[derive(Debug, Clone)]
pub struct ManifestLedger {
    files: MigrationFileManager,
    path: PathBuf,
}

impl ManifestLedger {
    /// Ledger for the migrations in `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            files: MigrationFileManager::new(dir),
            path: dir.join(MANIFEST_FILE),
        }
    }

    /// Manifest file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the manifest; an absent file is an empty ledger.
    pub async fn load(&self) -> MigrateResult<ManifestLock> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(ManifestLock::default());
        }
        let content = tokio::fs::read(&self.path).await?;
        let lock: ManifestLock = serde_json::from_slice(&content)
            .map_err(|e| MigrationError::validation(format!("{}: {e}", self.path.display())))?;
        lock.validate()?;
        Ok(lock)
    }

    /// Write the manifest atomically.
    pub async fn save(&self, lock: &ManifestLock) -> MigrateResult<()> {
        lock.validate()?;
        let content = serde_json::to_vec_pretty(lock)?;
        write_atomic(&self.path, &content).await?;
        debug!(path = %self.path.display(), version = lock.version, "Wrote manifest");
        Ok(())
    }

    /// Compare the directory against `lock`. Issues are sorted by file then kind.
    pub async fn scan(&self, lock: &ManifestLock) -> MigrateResult<Vec<ManifestIssue>> {
        let on_disk: BTreeSet<String> = self.files.list_sql_files().await?.into_iter().collect();
        let recorded: BTreeMap<&str, &ManifestEntry> =
            lock.migrations.iter().map(|e| (e.name.as_str(), e)).collect();
        let mut issues = Vec::new();

        for (name, entry) in &recorded {
            if !on_disk.contains(*name) {
                issues.push(ManifestIssue::new(IssueKind::MissingFile, *name));
                continue;
            }
            let actual = sha256_hex(&tokio::fs::read(self.files.path_of(name)).await?);
            if actual != entry.sql_sha256 {
                issues.push(ManifestIssue {
                    expected: Some(entry.sql_sha256.clone()),
                    actual: Some(actual),
                    ..ManifestIssue::new(IssueKind::HashMismatch, *name)
                });
            }
        }

        for name in &on_disk {
            if !recorded.contains_key(name.as_str()) {
                issues.push(ManifestIssue::new(IssueKind::UntrackedMigration, name));
            }
            if let Some(partner) = split_partner(name) {
                if !on_disk.contains(&partner) {
                    issues.push(ManifestIssue::new(IssueKind::MissingPair, name));
                }
            }
        }

        issues.sort_by(|a, b| a.file.cmp(&b.file).then(a.kind.cmp(&b.kind)));
        Ok(issues)
    }

    /// Load the manifest and scan the directory against it.
    pub async fn validate(&self) -> MigrateResult<Vec<ManifestIssue>> {
        let lock = self.load().await?;
        self.scan(&lock).await
    }

    /// Apply `mode` to the current drift.
    ///
    /// Strict mode fails with the first issue. Repair mode rewrites `lock`
    /// (and the file) when anything was fixed.
    pub async fn enforce(
        &self,
        lock: &mut ManifestLock,
        mode: ManifestMode,
        now: DateTime<Utc>,
    ) -> MigrateResult<RepairReport> {
        let issues = self.scan(lock).await?;
        let mut report = RepairReport::default();

        let adopt_untracked = match mode {
            ManifestMode::Strict => {
                if let Some(issue) = issues.into_iter().next() {
                    return Err(MigrationError::integrity(issue.kind, issue.file));
                }
                return Ok(report);
            }
            ManifestMode::Repair { adopt_untracked } => adopt_untracked,
        };

        for issue in issues {
            match issue.kind {
                IssueKind::HashMismatch => {
                    if let (Some(actual), Some(entry)) = (
                        issue.actual.as_ref(),
                        lock.migrations.iter_mut().find(|e| e.name == issue.file),
                    ) {
                        entry.sql_sha256 = actual.clone();
                        report.rehashed.push(issue.file);
                    }
                }
                IssueKind::MissingFile => {
                    lock.migrations.retain(|e| e.name != issue.file);
                    report.pruned.push(issue.file);
                }
                IssueKind::UntrackedMigration if adopt_untracked => {
                    let content = tokio::fs::read(self.files.path_of(&issue.file)).await?;
                    lock.append(issue.file.clone(), &content, now);
                    report.adopted.push(issue.file);
                }
                IssueKind::UntrackedMigration | IssueKind::MissingPair => {
                    warn!(kind = %issue.kind, file = %issue.file, "Unresolved manifest issue");
                    report.unresolved.push(issue);
                }
            }
        }

        if report.changed() {
            lock.touch(now);
            self.save(lock).await?;
            info!(
                rehashed = report.rehashed.len(),
                pruned = report.pruned.len(),
                adopted = report.adopted.len(),
                "Repaired manifest"
            );
        }

        Ok(report)
    }
}

fn split_partner(name: &str) -> Option<String> {
    if let Some(stem) = name.strip_suffix(SPLIT_UP_SUFFIX) {
        Some(format!("{stem}{SPLIT_DOWN_SUFFIX}"))
    } else {
        name.strip_suffix(SPLIT_DOWN_SUFFIX)
            .map(|stem| format!("{stem}{SPLIT_UP_SUFFIX}"))
    }
}
