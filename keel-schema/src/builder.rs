//! Builds table schemas from registered models.

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::debug;

use crate::dialect::Dialect;
use crate::error::{SchemaError, SchemaResult};
use crate::field::{FieldDescriptor, IndexTag};
use crate::model::{ModelDescriptor, ModelRegistry};
use crate::naming::to_snake_case;
use crate::relation::{Relation, RelationKind};
use crate::table::{ForeignKey, IndexDefinition, TableSchema};
use crate::types::{FieldType, ScalarType};

/// Column name recognized as the soft-delete marker.
pub const SOFT_DELETE_COLUMN: &str = "deleted_at";

/// Suffix appended to indexes restricted to live rows.
pub const ACTIVE_INDEX_SUFFIX: &str = "_active";

/// Output of [`SchemaBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct BuiltSchema {
    /// Tables keyed by name, in registry order.
    pub tables: IndexMap<String, TableSchema>,
    /// Resolved relations, in declaration order.
    pub relations: Vec<Relation>,
}

impl BuiltSchema {
    /// Look up a table.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }
}

/// Per-model facts gathered while laying out columns.
struct ModelLayout {
    table: String,
    primary_key: Option<String>,
}

struct IndexMember {
    tag: IndexTag,
    column: String,
    ordinal: usize,
}

/// Turns a [`ModelRegistry`] into dialect-specific [`TableSchema`]s.
#[derive(Debug, Clone, Copy)]
pub struct SchemaBuilder {
    dialect: Dialect,
}

impl SchemaBuilder {
    /// Create a builder for `dialect`.
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Target dialect.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Build every registered model.
    ///
    /// Output is deterministic for a given registry: tables follow
    /// registration order, indexes and foreign keys are sorted by name.
    pub fn build(&self, registry: &ModelRegistry) -> SchemaResult<BuiltSchema> {
        let mut built = BuiltSchema::default();
        let mut layouts: IndexMap<SmolStr, ModelLayout> = IndexMap::new();

        for model in registry.models() {
            let (table, layout) = self.layout_model(model)?;
            if built.tables.contains_key(&table.name) {
                return Err(SchemaError::duplicate("table", table.name));
            }
            debug!(
                model = %model.name,
                table = %table.name,
                columns = table.columns.len(),
                indexes = table.indexes.len(),
                "Laid out model"
            );
            built.tables.insert(table.name.clone(), table);
            layouts.insert(model.name.clone(), layout);
        }

        for model in registry.models() {
            for field in model.fields.iter().filter(|f| f.is_mapped()) {
                let FieldType::Model(target_name) = &field.field_type else {
                    continue;
                };
                let target = registry.get(target_name).ok_or_else(|| {
                    SchemaError::unknown_type(model.name.as_str(), field.name.as_str(), target_name.as_str())
                })?;

                let relation = self.infer_relation(model, field, target, &layouts, &built)?;
                debug!(
                    model = %model.name,
                    field = %field.name,
                    kind = %relation.kind,
                    owner = %relation.owner_table,
                    column = %relation.column,
                    "Resolved relation"
                );

                let fk = ForeignKey {
                    name: relation.constraint_name(),
                    column: relation.column.clone(),
                    references_table: relation.references_table.clone(),
                    references_column: relation.references_column.clone(),
                    on_delete: field.options.on_delete,
                    on_update: field.options.on_update,
                };

                if let Some(owner) = built.tables.get_mut(&relation.owner_table) {
                    // Both sides of a relation can describe the same constraint.
                    if !owner.foreign_keys.iter().any(|existing| existing.name == fk.name) {
                        owner.foreign_keys.push(fk);
                    }
                }
                built.relations.push(relation);
            }
        }

        for table in built.tables.values_mut() {
            table.foreign_keys.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Ok(built)
    }

    fn layout_model(&self, model: &ModelDescriptor) -> SchemaResult<(TableSchema, ModelLayout)> {
        let table_name = model.table_name();
        let mut table = TableSchema::new(&table_name);
        let mut primary_keys = Vec::new();
        let mut deleted_at: Option<String> = None;
        let mut members = Vec::new();

        for (ordinal, field) in model.fields.iter().enumerate() {
            if !field.is_mapped() {
                continue;
            }
            let scalar = match &field.field_type {
                FieldType::Scalar(scalar) => *scalar,
                FieldType::Model(_) => continue,
            };
            if field.modifier.is_list() {
                return Err(SchemaError::invalid_field(
                    model.name.as_str(),
                    field.name.as_str(),
                    "collections of scalar values cannot be mapped to a column",
                ));
            }

            let column = field
                .options
                .column
                .clone()
                .unwrap_or_else(|| to_snake_case(&field.name));
            let definition = self.column_definition(model, field, scalar)?;
            table.add_column(&column, definition)?;

            if field.options.primary_key {
                primary_keys.push(column.clone());
            }
            if deleted_at.is_none() && (field.options.soft_delete || column == SOFT_DELETE_COLUMN) {
                deleted_at = Some(column.clone());
            }
            for tag in &field.options.indexes {
                members.push(IndexMember {
                    tag: tag.clone(),
                    column: column.clone(),
                    ordinal,
                });
            }
        }

        if primary_keys.len() > 1 {
            return Err(SchemaError::invalid_model(
                model.name.as_str(),
                format!("composite primary keys are not supported ({})", primary_keys.join(", ")),
            ));
        }
        let primary_key = primary_keys
            .pop()
            .or_else(|| table.has_column("id").then(|| "id".to_string()));

        let mut indexes = resolve_indexes(&table_name, members)?;
        if let Some(marker) = &deleted_at {
            self.restrict_to_live_rows(&mut indexes, marker);
        }
        table.indexes = indexes;

        Ok((
            table,
            ModelLayout {
                table: table_name,
                primary_key,
            },
        ))
    }

    /// Full column definition: type followed by constraints.
    fn column_definition(
        &self,
        model: &ModelDescriptor,
        field: &FieldDescriptor,
        scalar: ScalarType,
    ) -> SchemaResult<String> {
        let options = &field.options;
        if options.auto_increment && options.sql_type.is_none() && !scalar.is_integer() {
            return Err(SchemaError::invalid_field(
                model.name.as_str(),
                field.name.as_str(),
                "autoIncrement requires an integer type",
            ));
        }

        let mut parts = vec![options.sql_type.clone().unwrap_or_else(|| {
            scalar.sql_type(self.dialect, options.size, options.auto_increment)
        })];

        if options.auto_increment && self.dialect == Dialect::SqlServer {
            parts.push("IDENTITY(1,1)".to_string());
        }
        if options.primary_key {
            parts.push("PRIMARY KEY".to_string());
        }
        if options.auto_increment && self.dialect == Dialect::MySql {
            parts.push("AUTO_INCREMENT".to_string());
        }
        if !options.primary_key && (options.not_null || !field.modifier.is_optional()) {
            parts.push("NOT NULL".to_string());
        }
        if options.unique && !options.primary_key {
            parts.push("UNIQUE".to_string());
        }
        if let Some(default) = &options.default {
            parts.push(format!("DEFAULT {default}"));
        }

        Ok(parts.join(" "))
    }

    /// Rewrite plain indexes into `{marker} IS NULL` partial indexes.
    fn restrict_to_live_rows(&self, indexes: &mut [IndexDefinition], marker: &str) {
        if !self.dialect.supports_partial_indexes() {
            return;
        }
        let predicate = format!("{} IS NULL", self.dialect.quote(marker));
        for index in indexes.iter_mut() {
            if index.predicate.is_some() || index.columns.iter().any(|c| c == marker) {
                continue;
            }
            index.predicate = Some(predicate.clone());
            index.name.push_str(ACTIVE_INDEX_SUFFIX);
        }
        indexes.sort_by(|a, b| a.name.cmp(&b.name));
    }

    fn infer_relation(
        &self,
        model: &ModelDescriptor,
        field: &FieldDescriptor,
        target: &ModelDescriptor,
        layouts: &IndexMap<SmolStr, ModelLayout>,
        built: &BuiltSchema,
    ) -> SchemaResult<Relation> {
        let relation_error =
            |message: String| SchemaError::invalid_relation(model.name.as_str(), field.name.as_str(), message);
        let layout_of = |name: &SmolStr| {
            layouts
                .get(name)
                .ok_or_else(|| SchemaError::unknown_type(model.name.as_str(), field.name.as_str(), name.as_str()))
        };

        let this = layout_of(&model.name)?;
        let other = layout_of(&target.name)?;
        let this_table = table_of(built, &this.table)?;
        let explicit = field.options.foreign_key.as_deref();

        let (kind, owner, referenced, column) = if field.modifier.is_list() {
            let wanted = explicit
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}_id", to_snake_case(&model.name)));
            (RelationKind::HasMany, other, this, wanted)
        } else {
            let belongs_to = explicit
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}_id", to_snake_case(&field.name)));
            match resolve_column(this_table, &belongs_to) {
                Some(column) => (RelationKind::BelongsTo, this, other, column),
                None => {
                    let wanted = explicit
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("{}_id", to_snake_case(&model.name)));
                    (RelationKind::HasOne, other, this, wanted)
                }
            }
        };

        let owner_table = table_of(built, &owner.table)?;
        let column = resolve_column(owner_table, &column).ok_or_else(|| {
            relation_error(format!(
                "{kind} foreign-key column `{column}` does not exist on table `{}`",
                owner.table
            ))
        })?;

        let references_column = field
            .options
            .references
            .clone()
            .or_else(|| referenced.primary_key.clone())
            .ok_or_else(|| {
                relation_error(format!("table `{}` has no primary key to reference", referenced.table))
            })?;
        if !table_of(built, &referenced.table)?.has_column(&references_column) {
            return Err(relation_error(format!(
                "referenced column `{references_column}` does not exist on table `{}`",
                referenced.table
            )));
        }

        Ok(Relation {
            model: model.name.clone(),
            field: field.name.clone(),
            target: target.name.clone(),
            kind,
            owner_table: owner.table.clone(),
            column,
            references_table: referenced.table.clone(),
            references_column,
        })
    }
}

fn table_of<'a>(built: &'a BuiltSchema, name: &str) -> SchemaResult<&'a TableSchema> {
    built
        .tables
        .get(name)
        .ok_or_else(|| SchemaError::invalid_model(name, "table was not laid out"))
}

/// Match a foreign-key reference by column name or by declared field name.
fn resolve_column(table: &TableSchema, name: &str) -> Option<String> {
    if table.has_column(name) {
        return Some(name.to_string());
    }
    let snake = to_snake_case(name);
    table.has_column(&snake).then_some(snake)
}

/// Group index tags into definitions sorted by name.
fn resolve_indexes(table: &str, members: Vec<IndexMember>) -> SchemaResult<Vec<IndexDefinition>> {
    let mut named: IndexMap<String, Vec<IndexMember>> = IndexMap::new();
    let mut indexes = Vec::new();

    for member in members {
        match &member.tag.name {
            Some(name) => named.entry(name.clone()).or_default().push(member),
            None => {
                let prefix = if member.tag.unique { "uidx" } else { "idx" };
                indexes.push(IndexDefinition {
                    name: format!("{prefix}_{table}_{}_{}", member.column, member.ordinal),
                    columns: vec![member.column],
                    unique: member.tag.unique,
                    predicate: member.tag.predicate,
                });
            }
        }
    }

    for (name, mut group) in named {
        group.sort_by_key(|m| (m.tag.priority, m.ordinal));
        let mut columns: Vec<String> = Vec::with_capacity(group.len());
        for member in &group {
            if !columns.contains(&member.column) {
                columns.push(member.column.clone());
            }
        }
        indexes.push(IndexDefinition {
            name,
            columns,
            unique: group.iter().any(|m| m.tag.unique),
            predicate: group.iter().find_map(|m| m.tag.predicate.clone()),
        });
    }

    indexes.sort_by(|a, b| a.name.cmp(&b.name));
    if let Some(pair) = indexes.windows(2).find(|pair| pair[0].name == pair[1].name) {
        return Err(SchemaError::duplicate("index", format!("{table}.{}", pair[0].name)));
    }

    Ok(indexes)
}
