//! Field descriptors and tag options.
//!
//! Options can be built with setters or parsed from a tag string:
//!
//! ```text
//! column:owner_id;type:varchar(64);not null;default:0;index:idx_org,priority:2;
//! uniqueIndex;primaryKey;autoIncrement;foreignKey:owner_id;constraint:OnDelete:CASCADE;-
//! ```

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{SchemaError, SchemaResult};
use crate::table::ReferentialAction;
use crate::types::{FieldType, ScalarType, TypeModifier};

/// Priority used when an index tag does not set one.
pub const DEFAULT_INDEX_PRIORITY: i32 = 10;

/// Index membership declared on a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTag {
    /// Shared index name. `None` creates an implicit single-column index.
    pub name: Option<String>,
    /// Position of this column within a composite index; lower sorts first.
    pub priority: i32,
    /// Unique index.
    pub unique: bool,
    /// Explicit partial-index predicate.
    pub predicate: Option<String>,
}

impl IndexTag {
    /// An implicit index for this field.
    pub fn implicit() -> Self {
        Self {
            name: None,
            priority: DEFAULT_INDEX_PRIORITY,
            unique: false,
            predicate: None,
        }
    }

    /// A named (possibly composite) index.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::implicit()
        }
    }

    /// Set the column priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Mark the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Parse the argument list of `index:` / `uniqueIndex:`.
    fn parse_args(args: &str, unique: bool, tag: &str) -> SchemaResult<Self> {
        let mut index = Self::implicit();
        index.unique = unique;

        for (position, part) in args.split(',').map(str::trim).enumerate() {
            if part.is_empty() {
                continue;
            }
            let (key, value) = match part.split_once(':') {
                Some((k, v)) => (k.trim().to_ascii_lowercase(), Some(v.trim())),
                None => (part.to_ascii_lowercase(), None),
            };
            match (key.as_str(), value) {
                ("priority", Some(v)) => {
                    index.priority = v.parse().map_err(|_| {
                        SchemaError::invalid_tag(tag, format!("priority `{v}` is not an integer"))
                    })?;
                }
                ("unique", None) => index.unique = true,
                ("where", Some(v)) if !v.is_empty() => index.predicate = Some(v.to_string()),
                (_, None) if position == 0 => index.name = Some(part.to_string()),
                _ => {
                    return Err(SchemaError::invalid_tag(
                        tag,
                        format!("unrecognized index option `{part}`"),
                    ));
                }
            }
        }

        Ok(index)
    }
}

/// Column options for a field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOptions {
    /// Explicit column name.
    pub column: Option<String>,
    /// Explicit SQL type, used verbatim.
    pub sql_type: Option<String>,
    /// String length.
    pub size: Option<u32>,
    /// Primary key column.
    pub primary_key: bool,
    /// Auto-increment / identity column.
    pub auto_increment: bool,
    /// Inline UNIQUE constraint.
    pub unique: bool,
    /// Force NOT NULL.
    pub not_null: bool,
    /// Default value expression, used verbatim.
    pub default: Option<String>,
    /// Skip the field entirely.
    pub ignore: bool,
    /// Soft-delete marker column.
    pub soft_delete: bool,
    /// Index memberships.
    pub indexes: Vec<IndexTag>,
    /// Foreign-key column for a relation field.
    pub foreign_key: Option<String>,
    /// Referenced column for a relation field.
    pub references: Option<String>,
    /// ON DELETE action for a relation field.
    pub on_delete: Option<ReferentialAction>,
    /// ON UPDATE action for a relation field.
    pub on_update: Option<ReferentialAction>,
}

impl FieldOptions {
    /// Parse a GORM-style tag string.
    pub fn parse(tag: &str) -> SchemaResult<Self> {
        let mut options = Self::default();

        for part in tag.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = match part.split_once(':') {
                Some((k, v)) => (k.trim().to_ascii_lowercase(), Some(v.trim())),
                None => (part.to_ascii_lowercase(), None),
            };

            match (key.as_str(), value) {
                ("-", None) => options.ignore = true,
                ("column", Some(v)) if !v.is_empty() => options.column = Some(v.to_string()),
                ("type", Some(v)) if !v.is_empty() => options.sql_type = Some(v.to_string()),
                ("size", Some(v)) => {
                    options.size = Some(v.parse().map_err(|_| {
                        SchemaError::invalid_tag(part, format!("size `{v}` is not a number"))
                    })?);
                }
                ("primarykey" | "primary_key", None) => options.primary_key = true,
                ("autoincrement" | "auto_increment", None) => options.auto_increment = true,
                ("unique", None) => options.unique = true,
                ("not null" | "notnull", None) => options.not_null = true,
                ("default", Some(v)) => options.default = Some(v.to_string()),
                ("softdelete" | "soft_delete", None) => options.soft_delete = true,
                ("index", None) => options.indexes.push(IndexTag::implicit()),
                ("index", Some(args)) => {
                    options.indexes.push(IndexTag::parse_args(args, false, part)?);
                }
                ("uniqueindex", None) => options.indexes.push(IndexTag::implicit().unique()),
                ("uniqueindex", Some(args)) => {
                    options.indexes.push(IndexTag::parse_args(args, true, part)?);
                }
                ("foreignkey", Some(v)) if !v.is_empty() => {
                    options.foreign_key = Some(v.to_string());
                }
                ("references", Some(v)) if !v.is_empty() => {
                    options.references = Some(v.to_string());
                }
                ("constraint", Some(v)) => options.parse_constraint(v, part)?,
                _ => {
                    return Err(SchemaError::invalid_tag(
                        part,
                        "unrecognized or incomplete tag option",
                    ));
                }
            }
        }

        Ok(options)
    }

    /// Parse `OnDelete:CASCADE,OnUpdate:SET NULL`.
    fn parse_constraint(&mut self, spec: &str, tag: &str) -> SchemaResult<()> {
        for clause in spec.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let (event, action) = clause
                .split_once(':')
                .ok_or_else(|| SchemaError::invalid_tag(tag, format!("expected `Event:ACTION`, got `{clause}`")))?;
            let action = ReferentialAction::parse(action).ok_or_else(|| {
                SchemaError::invalid_tag(tag, format!("unknown referential action `{action}`"))
            })?;
            match event.trim().to_ascii_lowercase().as_str() {
                "ondelete" => self.on_delete = Some(action),
                "onupdate" => self.on_update = Some(action),
                other => {
                    return Err(SchemaError::invalid_tag(
                        tag,
                        format!("unknown constraint event `{other}`"),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A field of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Declared field name.
    pub name: SmolStr,
    /// Declared type.
    pub field_type: FieldType,
    /// Required / optional / list.
    pub modifier: TypeModifier,
    /// Exported (public) field. Unexported fields are not mapped.
    pub exported: bool,
    /// Column options.
    pub options: FieldOptions,
}

impl FieldDescriptor {
    /// Create a required, exported field.
    pub fn new(name: impl Into<SmolStr>, field_type: impl Into<FieldType>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            modifier: TypeModifier::Required,
            exported: true,
            options: FieldOptions::default(),
        }
    }

    /// Create a scalar field.
    pub fn scalar(name: impl Into<SmolStr>, scalar: ScalarType) -> Self {
        Self::new(name, FieldType::Scalar(scalar))
    }

    /// Create a relation field referencing `model`.
    pub fn relation(name: impl Into<SmolStr>, model: impl Into<SmolStr>) -> Self {
        Self::new(name, FieldType::Model(model.into()))
    }

    /// Make the field optional.
    pub fn optional(mut self) -> Self {
        self.modifier = TypeModifier::Optional;
        self
    }

    /// Make the field a collection.
    pub fn list(mut self) -> Self {
        self.modifier = TypeModifier::List;
        self
    }

    /// Mark the field unexported.
    pub fn private(mut self) -> Self {
        self.exported = false;
        self
    }

    /// Replace the options.
    pub fn with_options(mut self, options: FieldOptions) -> Self {
        self.options = options;
        self
    }

    /// Parse a tag string into the field's options.
    pub fn tag(mut self, tag: &str) -> SchemaResult<Self> {
        self.options = FieldOptions::parse(tag)?;
        Ok(self)
    }

    /// Whether the field maps to a column or relation at all.
    pub fn is_mapped(&self) -> bool {
        self.exported && !self.options.ignore
    }
}
