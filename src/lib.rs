//! # Keel
//!
//! Model-driven schema migrations for PostgreSQL, MySQL and SQL Server.
//!
//! Keel provides:
//! - Typed model descriptors turned into canonical table schemas
//! - Snapshot-based diffing and reversible, dialect-correct SQL migrations
//! - A hash-signed manifest that detects tampering in the migration directory
//! - A migration runner with a tracking table, rollback by steps or version
//! - Live schema comparison, plus per-dialect clean (truncate) and reset
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keel::prelude::*;
//!
//! struct User;
//!
//! impl Entity for User {
//!     fn describe() -> ModelDescriptor {
//!         ModelDescriptor::new("User")
//!             .field(FieldDescriptor::scalar("ID", ScalarType::Int))
//!             .field(FieldDescriptor::scalar("Email", ScalarType::String))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), keel::MigrationError> {
//!     let config = KeelConfig::from_file("keel.toml")?;
//!
//!     let mut registry = ModelRegistry::new();
//!     registry.register_entity::<User>()?;
//!
//!     let report = MigrationGenerator::new(&config.migrations)
//!         .generate(&registry)
//!         .await?;
//!     println!("{} new migrations", report.files.len());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Model descriptors and the schema builder.
pub mod schema {
    pub use keel_schema::*;
}

/// Migration generation, integrity ledger, runner, clean and reset.
pub mod migrate {
    pub use keel_migrate::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::migrate::{
        CleanOptions, KeelConfig, ManifestLedger, ManifestMode, MigrationGenerator,
        MigrationRunner, MigrationsConfig, ResetOptions, RollbackTarget, Session, clean, reset,
    };
    pub use crate::schema::{
        Dialect, Entity, FieldDescriptor, FieldOptions, ModelDescriptor, ModelRegistry,
        ScalarType, SchemaBuilder,
    };
}

// Re-export key types at the crate root
pub use migrate::{MigrateResult, MigrationError};
pub use schema::{SchemaError, SchemaResult};
