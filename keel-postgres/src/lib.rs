//! # keel-postgres
//!
//! PostgreSQL [`Session`](keel_migrate::Session) for Keel.
//!
//! ```rust,ignore
//! use keel_migrate::{CleanOptions, clean};
//! use keel_postgres::PgSession;
//!
//! let session = PgSession::connect("postgres://localhost/app").await?;
//! let report = clean(&session, &CleanOptions::new().exclude("*_history")).await?;
//! println!("Truncated {} tables", report.affected_tables);
//! ```

pub mod session;

pub use session::{PgSession, rows_from_messages};
