//! Error types for the migration engine.

use keel_schema::{Dialect, SchemaError};
use thiserror::Error;

use crate::manifest::IssueKind;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Model description or schema building error.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed manifest or migration file.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The migration directory does not match the manifest.
    #[error("Integrity error: {kind} for '{file}'")]
    Integrity {
        /// Issue kind.
        kind: IssueKind,
        /// Offending file name.
        file: String,
    },

    /// A SQL statement failed.
    #[error("Execution error during {operation} ({context}): {message}")]
    Execution {
        /// Operation being performed (`apply`, `rollback`, `clean`, ...).
        operation: String,
        /// Migration version or table the statement belonged to.
        context: String,
        /// Driver message.
        message: String,
    },

    /// Database driver error outside of a tracked operation.
    #[error("Database error: {0}")]
    Database(String),

    /// Missing migration, section or dialect capability.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl MigrationError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an integrity error.
    pub fn integrity(kind: IssueKind, file: impl Into<String>) -> Self {
        Self::Integrity {
            kind,
            file: file.into(),
        }
    }

    /// Create an execution error.
    pub fn execution(
        operation: impl Into<String>,
        context: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        Self::Execution {
            operation: operation.into(),
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a not found error for an operation the dialect cannot perform.
    pub fn unsupported(dialect: Dialect, operation: impl AsRef<str>) -> Self {
        Self::NotFound(format!(
            "{} is not supported on {dialect}",
            operation.as_ref()
        ))
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap a failure in an execution error for `operation` on `context`.
    ///
    /// Errors that already carry execution context pass through unchanged.
    pub fn during(self, operation: &str, context: &str) -> Self {
        match self {
            Self::Execution { .. } => self,
            Self::Database(message) => Self::execution(operation, context, message),
            other => other,
        }
    }
}
