//! Schema diffing between the snapshot baseline and the current models.
//!
//! Every result is sorted by name so output never depends on map iteration
//! order.

use std::collections::{BTreeMap, BTreeSet};

use keel_schema::{BuiltSchema, ForeignKey, IndexDefinition, TableSchema, normalize_sql};

use crate::snapshot::{SchemaSnapshot, TableSnapshot};

/// A column and its full definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnEntry {
    /// Column name.
    pub name: String,
    /// Full definition.
    pub definition: String,
}

/// A column whose definition changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlteredColumn {
    /// Column name.
    pub name: String,
    /// Definition in the baseline.
    pub before: String,
    /// Definition in the current model.
    pub after: String,
}

/// Column-level differences of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnDiff {
    /// Present only in the current model.
    pub added: Vec<ColumnEntry>,
    /// Present only in the baseline.
    pub removed: Vec<ColumnEntry>,
    /// Present in both with different normalized definitions.
    pub altered: Vec<AlteredColumn>,
}

impl ColumnDiff {
    /// Check if there are any differences.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.altered.is_empty()
    }
}

/// Compare two column maps.
pub fn diff_columns(
    baseline: &BTreeMap<String, String>,
    current: &BTreeMap<String, String>,
) -> ColumnDiff {
    let mut diff = ColumnDiff::default();

    for (name, definition) in current {
        match baseline.get(name) {
            None => diff.added.push(ColumnEntry {
                name: name.clone(),
                definition: definition.clone(),
            }),
            Some(before) if normalize_sql(before) != normalize_sql(definition) => {
                diff.altered.push(AlteredColumn {
                    name: name.clone(),
                    before: before.clone(),
                    after: definition.clone(),
                });
            }
            Some(_) => {}
        }
    }

    for (name, definition) in baseline {
        if !current.contains_key(name) {
            diff.removed.push(ColumnEntry {
                name: name.clone(),
                definition: definition.clone(),
            });
        }
    }

    diff
}

/// Index differences of one table. A changed index is removed and re-added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDiff {
    /// Indexes to create.
    pub added: Vec<IndexDefinition>,
    /// Indexes to drop.
    pub removed: Vec<IndexDefinition>,
}

impl IndexDiff {
    /// Check if there are any differences.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compare two index lists by name.
pub fn diff_indexes(baseline: &[IndexDefinition], current: &[IndexDefinition]) -> IndexDiff {
    let (added, removed) = diff_named(baseline, current, |i| i.name.as_str());
    IndexDiff { added, removed }
}

/// Foreign-key differences of one table. A changed key is removed and re-added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForeignKeyDiff {
    /// Constraints to add.
    pub added: Vec<ForeignKey>,
    /// Constraints to drop.
    pub removed: Vec<ForeignKey>,
}

impl ForeignKeyDiff {
    /// Check if there are any differences.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compare two foreign-key lists by constraint name.
pub fn diff_foreign_keys(baseline: &[ForeignKey], current: &[ForeignKey]) -> ForeignKeyDiff {
    let (added, removed) = diff_named(baseline, current, |fk| fk.name.as_str());
    ForeignKeyDiff { added, removed }
}

fn diff_named<T, F>(baseline: &[T], current: &[T], name: F) -> (Vec<T>, Vec<T>)
where
    T: Clone + PartialEq,
    F: Fn(&T) -> &str,
{
    let before: BTreeMap<&str, &T> = baseline.iter().map(|item| (name(item), item)).collect();
    let after: BTreeMap<&str, &T> = current.iter().map(|item| (name(item), item)).collect();

    let mut added = Vec::new();
    let mut removed = Vec::new();

    for key in before.keys().chain(after.keys()).collect::<BTreeSet<_>>() {
        match (before.get(key), after.get(key)) {
            (None, Some(new)) => added.push((*new).clone()),
            (Some(old), None) => removed.push((*old).clone()),
            (Some(old), Some(new)) if old != new => {
                removed.push((*old).clone());
                added.push((*new).clone());
            }
            _ => {}
        }
    }

    (added, removed)
}

/// All differences of one existing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableAlterDiff {
    /// Table name.
    pub table: String,
    /// Column changes.
    pub columns: ColumnDiff,
    /// Index changes.
    pub indexes: IndexDiff,
    /// Foreign-key changes.
    pub foreign_keys: ForeignKeyDiff,
}

impl TableAlterDiff {
    /// Compare a baseline table with its current definition.
    pub fn between(baseline: &TableSnapshot, current: &TableSchema) -> Self {
        Self {
            table: current.name.clone(),
            columns: diff_columns(&baseline.columns, &current.column_types()),
            indexes: diff_indexes(&baseline.indexes, &current.indexes),
            foreign_keys: diff_foreign_keys(&baseline.foreign_keys, &current.foreign_keys),
        }
    }

    /// Check if there are any differences.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.indexes.is_empty() && self.foreign_keys.is_empty()
    }
}

/// Differences between the snapshot and the current models.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    /// Tables absent from the snapshot.
    pub create_tables: Vec<TableSchema>,
    /// Tables present in both with changes.
    pub alter_tables: Vec<TableAlterDiff>,
    /// Snapshot tables no model describes any more. Never dropped.
    pub orphaned_tables: Vec<String>,
}

impl SchemaDiff {
    /// Check if there is anything to generate.
    pub fn is_empty(&self) -> bool {
        self.create_tables.is_empty() && self.alter_tables.is_empty()
    }

    /// Get a human-readable summary of the diff.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.create_tables.is_empty() {
            parts.push(format!("Create {} tables", self.create_tables.len()));
        }
        if !self.alter_tables.is_empty() {
            parts.push(format!("Alter {} tables", self.alter_tables.len()));
        }
        if !self.orphaned_tables.is_empty() {
            parts.push(format!("{} orphaned tables", self.orphaned_tables.len()));
        }
        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Computes a [`SchemaDiff`].
pub struct SchemaDiffer<'a> {
    target: &'a BuiltSchema,
    baseline: Option<&'a SchemaSnapshot>,
}

impl<'a> SchemaDiffer<'a> {
    /// Diff `target` against an empty baseline.
    pub fn new(target: &'a BuiltSchema) -> Self {
        Self {
            target,
            baseline: None,
        }
    }

    /// Set the baseline snapshot.
    pub fn with_baseline(mut self, baseline: &'a SchemaSnapshot) -> Self {
        self.baseline = Some(baseline);
        self
    }

    /// Compute the diff. Tables keep model registration order.
    pub fn diff(&self) -> SchemaDiff {
        let mut diff = SchemaDiff::default();

        for table in self.target.tables.values() {
            match self.baseline.and_then(|b| b.table(&table.name)) {
                None => diff.create_tables.push(table.clone()),
                Some(recorded) => {
                    let alter = TableAlterDiff::between(recorded, table);
                    if !alter.is_empty() {
                        diff.alter_tables.push(alter);
                    }
                }
            }
        }

        if let Some(baseline) = self.baseline {
            diff.orphaned_tables = baseline
                .tables
                .keys()
                .filter(|name| !self.target.tables.contains_key(name.as_str()))
                .cloned()
                .collect();
        }

        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn columns(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_column_diff() {
        let a = columns(&[("a", "TEXT"), ("b", "INTEGER NOT NULL"), ("c", "TEXT")]);
        let b = columns(&[("a", "text"), ("b", "BIGINT NOT NULL"), ("d", "TEXT")]);

        let diff = diff_columns(&a, &b);
        assert_eq!(diff.added.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["d"]);
        assert_eq!(diff.removed.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(
            diff.altered,
            vec![AlteredColumn {
                name: "b".into(),
                before: "INTEGER NOT NULL".into(),
                after: "BIGINT NOT NULL".into(),
            }]
        );
    }

    #[test]
    fn test_whitespace_and_case_are_not_changes() {
        let a = columns(&[("a", "VARCHAR(255)   NOT NULL")]);
        let b = columns(&[("a", " varchar(255) not\tnull ")]);
        assert!(diff_columns(&a, &b).is_empty());
    }

    #[test]
    fn test_column_diff_symmetry() {
        let a = columns(&[("a", "TEXT"), ("b", "INTEGER"), ("x", "TEXT")]);
        let b = columns(&[("a", "TEXT"), ("c", "INTEGER"), ("x", "BLOB")]);

        let forward = diff_columns(&a, &b);
        let backward = diff_columns(&b, &a);
        assert_eq!(forward.added, backward.removed);
        assert_eq!(forward.removed, backward.added);
        assert_eq!(forward.altered.len(), backward.altered.len());
        for (f, r) in forward.altered.iter().zip(&backward.altered) {
            assert_eq!(f.name, r.name);
            assert_eq!(f.before, r.after);
            assert_eq!(f.after, r.before);
        }
    }

    #[test]
    fn test_index_change_is_remove_then_add() {
        let old = vec![
            IndexDefinition::new("idx_a", vec!["a".into()]),
            IndexDefinition::new("idx_keep", vec!["k".into()]),
        ];
        let new = vec![
            IndexDefinition::new("idx_a", vec!["a".into(), "b".into()]),
            IndexDefinition::new("idx_keep", vec!["K ".into()]),
            IndexDefinition::new("idx_new", vec!["n".into()]).unique(),
        ];

        let diff = diff_indexes(&old, &new);
        assert_eq!(diff.removed, vec![old[0].clone()]);
        assert_eq!(
            diff.added.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            vec!["idx_a", "idx_new"]
        );
    }

    #[test]
    fn test_foreign_key_diff() {
        let fk = ForeignKey {
            name: "fk_order_user_id".into(),
            column: "user_id".into(),
            references_table: "user".into(),
            references_column: "id".into(),
            on_delete: None,
            on_update: None,
        };
        let diff = diff_foreign_keys(&[], std::slice::from_ref(&fk));
        assert_eq!(diff.added, vec![fk.clone()]);
        assert!(diff_foreign_keys(&[fk.clone()], &[fk]).is_empty());
    }

    #[test]
    fn test_schema_differ() {
        let mut users = TableSchema::new("users");
        users.add_column("id", "INTEGER").unwrap();
        users.add_column("name", "TEXT").unwrap();
        let mut orders = TableSchema::new("orders");
        orders.add_column("id", "INTEGER").unwrap();

        let mut built = BuiltSchema::default();
        built.tables.insert("users".into(), users.clone());
        built.tables.insert("orders".into(), orders.clone());

        let mut old_users = TableSchema::new("users");
        old_users.add_column("id", "INTEGER").unwrap();
        let mut legacy = TableSchema::new("legacy");
        legacy.add_column("id", "INTEGER").unwrap();

        let mut snapshot = SchemaSnapshot::default();
        snapshot.record(&old_users);
        snapshot.record(&legacy);

        let diff = SchemaDiffer::new(&built).with_baseline(&snapshot).diff();
        assert_eq!(diff.create_tables, vec![orders]);
        assert_eq!(diff.alter_tables.len(), 1);
        assert_eq!(diff.alter_tables[0].columns.added[0].name, "name");
        assert_eq!(diff.orphaned_tables, vec!["legacy"]);
        assert_eq!(diff.summary(), "Create 1 tables, Alter 1 tables, 1 orphaned tables");

        snapshot.record(&users);
        snapshot.record(&built.tables["orders"]);
        let diff = SchemaDiffer::new(&built).with_baseline(&snapshot).diff();
        assert!(diff.is_empty());
    }
}
