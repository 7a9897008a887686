//! PostgreSQL [`Session`] over a single `tokio-postgres` client.

use async_trait::async_trait;
use keel_migrate::{MigrateResult, MigrationError, Row, Session};
use keel_schema::Dialect;
use serde_json::Value as JsonValue;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::{debug, error};

fn driver_error(e: tokio_postgres::Error) -> MigrationError {
    MigrationError::database(format!("PostgreSQL error: {e}"))
}

/// A PostgreSQL database used as a migration target.
///
/// Statements go through the simple query protocol, so multi-statement
/// migration bodies run as one batch and every column is returned as text.
pub struct PgSession {
    client: Client,
}

impl PgSession {
    /// Connect with a `postgres://` URL or key/value connection string.
    pub async fn connect(url: &str) -> MigrateResult<Self> {
        debug!("Connecting to PostgreSQL");
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .map_err(driver_error)?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection error");
            }
        });

        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// Convert simple-query messages to rows; `NULL` becomes JSON null.
pub fn rows_from_messages(messages: &[SimpleQueryMessage]) -> Vec<Row> {
    messages
        .iter()
        .filter_map(|message| match message {
            SimpleQueryMessage::Row(row) => {
                let mut map = Row::new();
                for (i, column) in row.columns().iter().enumerate() {
                    let value = row
                        .get(i)
                        .map(|s| JsonValue::String(s.to_string()))
                        .unwrap_or(JsonValue::Null);
                    map.insert(column.name().to_string(), value);
                }
                Some(map)
            }
            _ => None,
        })
        .collect()
}

#[async_trait]
impl Session for PgSession {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&self, sql: &str) -> MigrateResult<()> {
        debug!(sql = %sql, "Executing batch");
        self.client.batch_execute(sql).await.map_err(driver_error)
    }

    async fn query(&self, sql: &str) -> MigrateResult<Vec<Row>> {
        debug!(sql = %sql, "Executing query");
        let messages = self.client.simple_query(sql).await.map_err(driver_error)?;
        Ok(rows_from_messages(&messages))
    }
}
