//! Canonical table descriptions produced by the schema builder.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};

/// Collapse whitespace and lowercase a SQL fragment for comparison.
pub fn normalize_sql(fragment: &str) -> String {
    fragment
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Full type definition (type plus constraints), unquoted name excluded.
    pub definition: String,
    /// Declaration order within the model.
    pub position: usize,
}

/// Referential action for a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferentialAction {
    /// Cascade the operation.
    Cascade,
    /// Restrict the operation (error if references exist).
    Restrict,
    /// No action (deferred check).
    NoAction,
    /// Set to null.
    SetNull,
    /// Set to default value.
    SetDefault,
}

impl ReferentialAction {
    /// Parse from tag text such as `CASCADE`, `SET NULL` or `SetNull`.
    pub fn parse(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();
        match key.as_str() {
            "CASCADE" => Some(Self::Cascade),
            "RESTRICT" => Some(Self::Restrict),
            "NOACTION" => Some(Self::NoAction),
            "SETNULL" => Some(Self::SetNull),
            "SETDEFAULT" => Some(Self::SetDefault),
            _ => None,
        }
    }

    /// Get the SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
            Self::NoAction => "NO ACTION",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// A foreign-key constraint attached to its owning table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,
    /// Column on the owning table.
    pub column: String,
    /// Referenced table.
    pub references_table: String,
    /// Referenced column.
    pub references_column: String,
    /// ON DELETE action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<ReferentialAction>,
    /// ON UPDATE action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<ReferentialAction>,
}

/// An index on one table.
///
/// Identity is the name. Two definitions are equal when name, column order,
/// uniqueness and normalized predicate all match.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Index name.
    pub name: String,
    /// Ordered column list.
    pub columns: Vec<String>,
    /// Unique index.
    #[serde(default)]
    pub unique: bool,
    /// Partial index predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

impl IndexDefinition {
    /// Create a non-unique index.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique: false,
            predicate: None,
        }
    }

    /// Mark the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Restrict the index with a predicate.
    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    /// Columns trimmed and lowercased.
    pub fn normalized_columns(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.trim().to_lowercase()).collect()
    }

    /// Predicate with whitespace collapsed and lowercased.
    pub fn normalized_predicate(&self) -> Option<String> {
        self.predicate
            .as_deref()
            .map(normalize_sql)
            .filter(|p| !p.is_empty())
    }
}

impl PartialEq for IndexDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.normalized_columns() == other.normalized_columns()
            && self.unique == other.unique
            && self.normalized_predicate() == other.normalized_predicate()
    }
}

/// Columns, foreign keys and indexes of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDefinition>,
    /// Foreign keys owned by this table, sorted by name.
    pub foreign_keys: Vec<ForeignKey>,
    /// Indexes, sorted by name.
    pub indexes: Vec<IndexDefinition>,
}

impl TableSchema {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Append a column. Column names are unique within a table.
    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        definition: impl Into<String>,
    ) -> SchemaResult<()> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(SchemaError::duplicate(
                "column",
                format!("{}.{}", self.name, name),
            ));
        }
        let position = self.columns.len();
        self.columns.push(ColumnDefinition {
            name,
            definition: definition.into(),
            position,
        });
        Ok(())
    }

    /// Check whether a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Look up a column.
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column name to definition map.
    pub fn column_types(&self) -> BTreeMap<String, String> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.definition.clone()))
            .collect()
    }

    /// Column names in declaration order.
    pub fn column_order(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_column_rejects_duplicates() {
        let mut table = TableSchema::new("users");
        table.add_column("id", "SERIAL PRIMARY KEY").unwrap();
        let err = table.add_column("id", "INTEGER").unwrap_err();
        assert!(err.to_string().contains("users.id"));
    }

    #[test]
    fn test_column_positions_follow_declaration() {
        let mut table = TableSchema::new("users");
        table.add_column("name", "TEXT").unwrap();
        table.add_column("email", "TEXT").unwrap();
        assert_eq!(table.column_order(), vec!["name", "email"]);
        assert_eq!(table.column("email").map(|c| c.position), Some(1));
        let types = table.column_types();
        assert_eq!(types.keys().collect::<Vec<_>>(), vec!["email", "name"]);
    }

    #[test]
    fn test_index_equality_normalizes_predicate() {
        let a = IndexDefinition::new("idx", vec!["a".into()]).with_predicate("\"deleted_at\"  IS NULL");
        let b = IndexDefinition::new("idx", vec!["a".into()]).with_predicate("\"deleted_at\" is null");
        assert_eq!(a, b);
    }

    #[test]
    fn test_index_equality_is_order_sensitive() {
        let a = IndexDefinition::new("idx", vec!["a".into(), "b".into()]);
        let b = IndexDefinition::new("idx", vec!["b".into(), "a".into()]);
        assert_ne!(a, b);
        assert_ne!(a.clone(), a.clone().unique());
    }

    #[test]
    fn test_referential_action_parse() {
        assert_eq!(ReferentialAction::parse("CASCADE"), Some(ReferentialAction::Cascade));
        assert_eq!(ReferentialAction::parse("SET NULL"), Some(ReferentialAction::SetNull));
        assert_eq!(ReferentialAction::parse("NoAction"), Some(ReferentialAction::NoAction));
        assert_eq!(ReferentialAction::parse("explode"), None);
        assert_eq!(ReferentialAction::SetDefault.as_sql(), "SET DEFAULT");
    }

    #[test]
    fn test_normalize_sql() {
        assert_eq!(normalize_sql("  VARCHAR(255)   NOT\tNULL "), "varchar(255) not null");
    }
}
