//! Relations inferred between models.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// How a relation field maps to a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    /// The foreign-key column lives on the declaring model.
    BelongsTo,
    /// The foreign-key column lives on the referenced model; single value.
    HasOne,
    /// The foreign-key column lives on the referenced model; collection.
    HasMany,
}

impl RelationKind {
    /// Whether the declaring model owns the foreign-key column.
    pub fn owned_by_declaring_model(&self) -> bool {
        matches!(self, Self::BelongsTo)
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BelongsTo => write!(f, "belongs-to"),
            Self::HasOne => write!(f, "has-one"),
            Self::HasMany => write!(f, "has-many"),
        }
    }
}

/// A resolved relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Declaring model.
    pub model: SmolStr,
    /// Declaring field.
    pub field: SmolStr,
    /// Referenced model.
    pub target: SmolStr,
    /// Relation kind.
    pub kind: RelationKind,
    /// Table holding the foreign-key column.
    pub owner_table: String,
    /// Foreign-key column.
    pub column: String,
    /// Referenced table.
    pub references_table: String,
    /// Referenced column.
    pub references_column: String,
}

impl Relation {
    /// Constraint name for the foreign key.
    pub fn constraint_name(&self) -> String {
        format!("fk_{}_{}", self.owner_table, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_name() {
        let relation = Relation {
            model: "Order".into(),
            field: "Customer".into(),
            target: "Customer".into(),
            kind: RelationKind::BelongsTo,
            owner_table: "order".into(),
            column: "customer_id".into(),
            references_table: "customer".into(),
            references_column: "id".into(),
        };
        assert_eq!(relation.constraint_name(), "fk_order_customer_id");
        assert!(relation.kind.owned_by_declaring_model());
        assert_eq!(RelationKind::HasMany.to_string(), "has-many");
    }
}
