//! SQLite [`Session`] over a single `tokio-rusqlite` connection.

use std::path::Path;

use async_trait::async_trait;
use keel_migrate::{MigrateResult, MigrationError, Row, Session};
use keel_schema::Dialect;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::types::get_value_at_index;

fn driver_error(e: tokio_rusqlite::Error) -> MigrationError {
    MigrationError::database(format!("SQLite error: {e}"))
}

/// A SQLite database used as a migration target.
///
/// Foreign key enforcement is switched on when the connection opens.
pub struct SqliteSession {
    conn: Connection,
}

impl SqliteSession {
    /// Open (or create) a database file.
    pub async fn open(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(path = %path.display(), "Opening SQLite database");
        let conn = Connection::open(path).await.map_err(driver_error)?;
        Self::init(conn).await
    }

    /// Open a private in-memory database.
    pub async fn open_in_memory() -> MigrateResult<Self> {
        let conn = Connection::open_in_memory().await.map_err(driver_error)?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> MigrateResult<Self> {
        let session = Self { conn };
        session.execute("PRAGMA foreign_keys = ON").await?;
        Ok(session)
    }
}

#[async_trait]
impl Session for SqliteSession {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&self, sql: &str) -> MigrateResult<()> {
        let sql = sql.to_string();
        debug!(sql = %sql, "Executing batch");

        self.conn
            .call(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await
            .map_err(driver_error)
    }

    async fn query(&self, sql: &str) -> MigrateResult<Vec<Row>> {
        let sql = sql.to_string();
        debug!(sql = %sql, "Executing query");

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let columns: Vec<String> = stmt
                    .column_names()
                    .iter()
                    .map(|s| s.to_string())
                    .collect();

                let rows = stmt.query_map([], |row| {
                    let mut map = Row::new();
                    for (i, col) in columns.iter().enumerate() {
                        map.insert(col.clone(), get_value_at_index(row, i));
                    }
                    Ok(map)
                })?;

                let results: Result<Vec<_>, _> = rows.collect();
                Ok(results?)
            })
            .await
            .map_err(driver_error)
    }
}
