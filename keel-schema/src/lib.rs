//! # keel-schema
//!
//! Describes data models and turns them into canonical table schemas.
//!
//! Models are plain [`ModelDescriptor`] values, written by hand or produced by
//! an [`Entity`] implementation, collected in a [`ModelRegistry`]. The
//! [`SchemaBuilder`] resolves column names and dialect-specific types, index
//! definitions (composite, unique, soft-delete aware) and foreign keys
//! inferred from relation fields.
//!
//! ## Example
//!
//! ```rust
//! use keel_schema::{Dialect, FieldDescriptor, ModelDescriptor, ModelRegistry, ScalarType, SchemaBuilder};
//!
//! # fn main() -> keel_schema::SchemaResult<()> {
//! let mut registry = ModelRegistry::new();
//! registry.register(
//!     ModelDescriptor::new("User")
//!         .field(FieldDescriptor::scalar("ID", ScalarType::Int).tag("primaryKey;autoIncrement")?)
//!         .field(FieldDescriptor::scalar("Email", ScalarType::String).tag("uniqueIndex")?),
//! )?;
//!
//! let built = SchemaBuilder::new(Dialect::Postgres).build(&registry)?;
//! let users = built.table("user").unwrap();
//! assert_eq!(users.column_order(), vec!["id", "email"]);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod dialect;
pub mod error;
pub mod field;
pub mod model;
pub mod naming;
pub mod relation;
pub mod table;
pub mod types;

pub use builder::{ACTIVE_INDEX_SUFFIX, BuiltSchema, SOFT_DELETE_COLUMN, SchemaBuilder};
pub use dialect::Dialect;
pub use error::{SchemaError, SchemaResult};
pub use field::{DEFAULT_INDEX_PRIORITY, FieldDescriptor, FieldOptions, IndexTag};
pub use model::{Entity, ModelDescriptor, ModelRegistry};
pub use naming::to_snake_case;
pub use relation::{Relation, RelationKind};
pub use table::{
    ColumnDefinition, ForeignKey, IndexDefinition, ReferentialAction, TableSchema, normalize_sql,
};
pub use types::{FieldType, ScalarType, TypeModifier};
