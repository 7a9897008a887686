//! Integration tests for the generate → apply → rollback pipeline.
//!
//! These tests drive real migrations against an in-memory SQLite database.

use chrono::{DateTime, TimeZone, Utc};
use keel::migrate::{
    IssueKind, LiveSchema, ManifestLedger, MigrationFileManager, MigrationGenerator,
    MigrationRunner, MigrationsConfig, RollbackTarget, Session, SnapshotStore, compare_lines,
};
use keel::schema::{Dialect, FieldDescriptor, ModelDescriptor, ModelRegistry, ScalarType};
use keel_sqlite::SqliteSession;
use pretty_assertions::assert_eq;

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap()
}

fn user(profile_field: &str) -> ModelDescriptor {
    ModelDescriptor::new("User")
        .field(
            FieldDescriptor::scalar("ID", ScalarType::Int)
                .tag("primaryKey;autoIncrement")
                .unwrap(),
        )
        .field(
            FieldDescriptor::scalar("Email", ScalarType::String)
                .tag("uniqueIndex")
                .unwrap(),
        )
        .field(FieldDescriptor::scalar(profile_field, ScalarType::String).optional())
        .field(
            FieldDescriptor::relation("Posts", "Post")
                .list()
                .tag("foreignKey:author_id;constraint:OnDelete:CASCADE")
                .unwrap(),
        )
}

fn post() -> ModelDescriptor {
    ModelDescriptor::new("Post")
        .field(
            FieldDescriptor::scalar("ID", ScalarType::Int)
                .tag("primaryKey;autoIncrement")
                .unwrap(),
        )
        .field(
            FieldDescriptor::scalar("AuthorID", ScalarType::Int)
                .tag("index")
                .unwrap(),
        )
        .field(FieldDescriptor::scalar("Title", ScalarType::String))
        .field(
            FieldDescriptor::relation("Author", "User")
                .tag("constraint:OnDelete:CASCADE")
                .unwrap(),
        )
}

fn registry(profile_field: &str) -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry.register(user(profile_field)).unwrap();
    registry.register(post()).unwrap();
    registry
}

fn config(dir: &std::path::Path) -> MigrationsConfig {
    MigrationsConfig::new().dir(dir).dialect(Dialect::Sqlite)
}

async fn user_tables(session: &SqliteSession) -> LiveSchema {
    let mut live = LiveSchema::capture(session, None).await.unwrap();
    live.tables.remove("keel_migrations");
    live
}

#[tokio::test]
async fn test_generate_apply_and_roll_back() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let generator = MigrationGenerator::new(&config);
    let session = SqliteSession::open_in_memory().await.unwrap();
    let runner = MigrationRunner::new(&session, &config);

    let first = generator.generate_at(&registry("Nickname"), at(1)).await.unwrap();
    assert_eq!(first.files.len(), 2);
    assert_eq!(
        runner.up().await.unwrap(),
        vec!["20260301090000_001_create_user", "20260301090000_002_create_post"]
    );

    let applied = user_tables(&session).await;
    assert_eq!(
        applied.tables["post"].keys().collect::<Vec<_>>(),
        vec!["author_id", "id", "title"]
    );
    session
        .execute("INSERT INTO \"user\" (\"email\") VALUES ('a@example.com')")
        .await
        .unwrap();
    session
        .execute("INSERT INTO \"post\" (\"author_id\", \"title\") VALUES (1, 'hello')")
        .await
        .unwrap();

    let second = generator.generate_at(&registry("Bio"), at(2)).await.unwrap();
    assert_eq!(second.files.len(), 1);
    let before = user_tables(&session).await;

    assert_eq!(runner.up().await.unwrap(), vec!["20260302090000_001_alter_user"]);
    let after = user_tables(&session).await;
    assert_eq!(
        compare_lines(&before, &after),
        vec!["+ column user.bio (TEXT)", "- column user.nickname (TEXT)"]
    );

    assert_eq!(
        runner.down().await.unwrap(),
        vec!["20260302090000_001_alter_user"]
    );
    assert!(compare_lines(&before, &user_tables(&session).await).is_empty());

    let status = runner.status().await.unwrap();
    assert_eq!(status.applied.len(), 2);
    assert_eq!(status.pending, vec!["20260302090000_001_alter_user"]);

    runner.rollback(RollbackTarget::Steps(10)).await.unwrap();
    assert!(user_tables(&session).await.tables.is_empty());
    assert_eq!(runner.status().await.unwrap().pending.len(), 3);
}

#[tokio::test]
async fn test_up_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let session = SqliteSession::open_in_memory().await.unwrap();
    MigrationGenerator::new(&config)
        .generate_at(&registry("Nickname"), at(1))
        .await
        .unwrap();

    let runner = MigrationRunner::new(&session, &config);
    assert_eq!(runner.up().await.unwrap().len(), 2);
    assert!(runner.up().await.unwrap().is_empty());
    assert!(runner.status().await.unwrap().is_up_to_date());
}

#[tokio::test]
async fn test_failed_migration_stays_unapplied() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let session = SqliteSession::open_in_memory().await.unwrap();
    MigrationGenerator::new(&config)
        .generate_at(&registry("Nickname"), at(1))
        .await
        .unwrap();
    session.execute("CREATE TABLE \"post\" (x INTEGER)").await.unwrap();

    let runner = MigrationRunner::new(&session, &config);
    let err = runner.up().await.unwrap_err();
    assert!(err.to_string().contains("20260301090000_002_create_post"));

    let status = runner.status().await.unwrap();
    assert_eq!(status.applied.len(), 1);
    assert_eq!(status.pending, vec!["20260301090000_002_create_post"]);
}

#[tokio::test]
async fn test_rollback_to_version() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let generator = MigrationGenerator::new(&config);
    let session = SqliteSession::open_in_memory().await.unwrap();
    let runner = MigrationRunner::new(&session, &config);

    generator.generate_at(&registry("Nickname"), at(1)).await.unwrap();
    generator.generate_at(&registry("Bio"), at(2)).await.unwrap();
    runner.up().await.unwrap();

    let undone = runner
        .rollback(RollbackTarget::Version("20260301090000_001_create_user".into()))
        .await
        .unwrap();
    assert_eq!(
        undone,
        vec!["20260302090000_001_alter_user", "20260301090000_002_create_post"]
    );
    assert_eq!(
        session.list_tables(None).await.unwrap(),
        vec!["keel_migrations", "user"]
    );
}

#[tokio::test]
async fn test_generation_is_idempotent_and_deterministic() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    for dir in [&first, &second] {
        let generator = MigrationGenerator::new(&config(dir.path()));
        generator.generate_at(&registry("Nickname"), at(1)).await.unwrap();
        let again = generator.generate_at(&registry("Nickname"), at(5)).await.unwrap();
        assert!(again.is_empty());
    }

    let names = MigrationFileManager::new(first.path()).list_migrations().await.unwrap();
    assert_eq!(names.len(), 2);
    for name in names.iter().map(String::as_str).chain(["manifest.lock.json", "schema.lock.json"]) {
        assert_eq!(
            std::fs::read(first.path().join(name)).unwrap(),
            std::fs::read(second.path().join(name)).unwrap(),
            "{name}"
        );
    }

    let snapshot = SnapshotStore::new(first.path()).load().await.unwrap();
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.table("post").unwrap().foreign_keys[0].name, "fk_post_author_id");
}

#[tokio::test]
async fn test_tampered_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    MigrationGenerator::new(&config(dir.path()))
        .generate_at(&registry("Nickname"), at(1))
        .await
        .unwrap();

    let target = dir.path().join("20260301090000_002_create_post.sql");
    let mut content = std::fs::read_to_string(&target).unwrap();
    content.push_str("-- edited by hand\n");
    std::fs::write(&target, content).unwrap();

    let issues = ManifestLedger::new(dir.path()).validate().await.unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::HashMismatch);
    assert_eq!(issues[0].file, "20260301090000_002_create_post.sql");

    let err = MigrationGenerator::new(&config(dir.path()))
        .generate_at(&registry("Bio"), at(2))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("hash_mismatch"));
}
