//! # keel-sqlite
//!
//! SQLite [`Session`](keel_migrate::Session) for Keel.
//!
//! SQLite is a local and test target: migrations generated for the
//! `sqlite` dialect can be applied, rolled back, cleaned and reset against
//! a file or an in-memory database.
//!
//! ```rust,ignore
//! use keel_migrate::{MigrationRunner, MigrationsConfig};
//! use keel_sqlite::SqliteSession;
//!
//! let session = SqliteSession::open_in_memory().await?;
//! let config = MigrationsConfig::new().dialect(keel_schema::Dialect::Sqlite);
//! MigrationRunner::new(&session, &config).up().await?;
//! ```

pub mod session;
pub mod types;

pub use session::SqliteSession;
