//! SQL generation for migrations.
//!
//! Every statement is generated together with its inverse. Down statements
//! run in the reverse order of their Up counterparts.

use keel_schema::{Dialect, ForeignKey, IndexDefinition, TableSchema};

use crate::diff::TableAlterDiff;
use crate::error::{MigrateResult, MigrationError};

/// SQL for one migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSql {
    /// SQL to apply the migration.
    pub up: String,
    /// SQL to rollback the migration.
    pub down: String,
}

impl MigrationSql {
    /// Check if the migration is empty.
    pub fn is_empty(&self) -> bool {
        self.up.trim().is_empty()
    }
}

/// Paired Up/Down statements in application order.
#[derive(Debug, Default)]
pub struct StatementPlan {
    up: Vec<String>,
    down: Vec<Vec<String>>,
}

impl StatementPlan {
    /// Create an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one statement and its inverse.
    pub fn push(&mut self, up: impl Into<String>, down: impl Into<String>) {
        self.up.push(up.into());
        self.down.push(vec![down.into()]);
    }

    /// Add a group of statements and the group that undoes it.
    pub fn push_group(&mut self, up: Vec<String>, down: Vec<String>) {
        if up.is_empty() && down.is_empty() {
            return;
        }
        self.up.extend(up);
        self.down.push(down);
    }

    /// Render the plan; down groups are reversed.
    pub fn finish(self) -> MigrationSql {
        MigrationSql {
            up: self.up.join("\n"),
            down: self
                .down
                .into_iter()
                .rev()
                .flatten()
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Type, nullability, default and key flags split out of a column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnParts {
    /// Data type, e.g. `VARCHAR(255)`.
    pub data_type: String,
    /// Column rejects NULL.
    pub not_null: bool,
    /// Default expression.
    pub default: Option<String>,
    /// Inline `UNIQUE` constraint.
    pub unique: bool,
    /// Inline `PRIMARY KEY`.
    pub primary_key: bool,
    /// Identity / auto-increment column.
    pub identity: bool,
}

const CONSTRAINT_KEYWORDS: &[&str] = &[
    "NOT",
    "NULL",
    "PRIMARY",
    "UNIQUE",
    "DEFAULT",
    "AUTO_INCREMENT",
    "AUTOINCREMENT",
    "REFERENCES",
    "CHECK",
    "COLLATE",
    "CONSTRAINT",
    "GENERATED",
];

fn is_constraint_keyword(token: &str) -> bool {
    let upper = token.to_ascii_uppercase();
    CONSTRAINT_KEYWORDS.contains(&upper.as_str()) || upper.starts_with("IDENTITY")
}

impl ColumnParts {
    /// Split a definition such as `VARCHAR(64) NOT NULL DEFAULT 'x'`.
    pub fn parse(definition: &str) -> Self {
        let tokens: Vec<&str> = definition.split_whitespace().collect();
        let type_end = tokens
            .iter()
            .position(|t| is_constraint_keyword(t))
            .unwrap_or(tokens.len());
        let upper = definition.to_ascii_uppercase();

        let default = tokens
            .iter()
            .position(|t| t.eq_ignore_ascii_case("DEFAULT"))
            .map(|start| {
                tokens[start + 1..]
                    .iter()
                    .take_while(|t| !is_constraint_keyword(t))
                    .copied()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|d| !d.is_empty());

        let primary_key = upper.contains("PRIMARY KEY");
        let identity = tokens.iter().any(|t| {
            let t = t.to_ascii_uppercase();
            t.starts_with("IDENTITY") || t == "AUTO_INCREMENT" || t == "AUTOINCREMENT" || t == "GENERATED"
        });

        Self {
            data_type: tokens[..type_end].join(" "),
            not_null: upper.contains("NOT NULL") || primary_key,
            default,
            unique: tokens.iter().any(|t| t.eq_ignore_ascii_case("UNIQUE")),
            primary_key,
            identity,
        }
    }
}

/// `definition` without its inline `UNIQUE` keyword.
fn without_unique(definition: &str) -> String {
    definition
        .split_whitespace()
        .filter(|t| !t.eq_ignore_ascii_case("UNIQUE"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Generates dialect-correct migration SQL.
#[derive(Debug, Clone, Copy)]
pub struct SqlGenerator {
    dialect: Dialect,
}

impl SqlGenerator {
    /// Create a generator for `dialect`.
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Target dialect.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn q(&self, ident: &str) -> String {
        self.dialect.quote(ident)
    }

    /// Migration creating `table` and its indexes.
    pub fn create_table(&self, table: &TableSchema) -> MigrationSql {
        let mut plan = StatementPlan::new();
        plan.push(self.create_table_statement(table), self.drop_table(&table.name));

        let mut indexes: Vec<&IndexDefinition> = table.indexes.iter().collect();
        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        for index in indexes {
            plan.push(
                self.create_index(&table.name, index),
                self.drop_index(&table.name, index),
            );
        }

        plan.finish()
    }

    /// Migration applying `diff` to an existing table.
    pub fn alter_table(&self, diff: &TableAlterDiff) -> MigrateResult<MigrationSql> {
        let table = diff.table.as_str();
        let mut plan = StatementPlan::new();

        for index in &diff.indexes.removed {
            plan.push(self.drop_index(table, index), self.create_index(table, index));
        }

        for fk in &diff.foreign_keys.removed {
            plan.push(self.drop_foreign_key(table, fk)?, self.add_foreign_key(table, fk)?);
        }

        for column in &diff.columns.added {
            plan.push(
                self.add_column(table, &column.name, &column.definition),
                self.drop_column(table, &column.name),
            );
        }

        for column in &diff.columns.removed {
            plan.push(
                self.drop_column(table, &column.name),
                self.add_column(table, &column.name, &column.definition),
            );
        }

        for column in &diff.columns.altered {
            plan.push_group(
                self.alter_column(table, &column.name, &column.before, &column.after)?,
                self.alter_column(table, &column.name, &column.after, &column.before)?,
            );
        }

        for index in &diff.indexes.added {
            plan.push(self.create_index(table, index), self.drop_index(table, index));
        }

        for fk in &diff.foreign_keys.added {
            plan.push(self.add_foreign_key(table, fk)?, self.drop_foreign_key(table, fk)?);
        }

        Ok(plan.finish())
    }

    /// `CREATE TABLE` with columns sorted by name and foreign keys sorted by name.
    pub fn create_table_statement(&self, table: &TableSchema) -> String {
        let mut columns: Vec<_> = table.columns.iter().collect();
        columns.sort_by(|a, b| a.name.cmp(&b.name));

        let mut lines: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", self.q(&c.name), c.definition))
            .collect();

        let mut fks: Vec<&ForeignKey> = table.foreign_keys.iter().collect();
        fks.sort_by(|a, b| a.name.cmp(&b.name));
        lines.extend(
            fks.into_iter()
                .map(|fk| format!("CONSTRAINT {} {}", self.q(&fk.name), self.foreign_key_clause(fk))),
        );

        let suffix = match self.dialect {
            Dialect::MySql => " ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            _ => "",
        };

        format!(
            "CREATE TABLE {} (\n    {}\n){};",
            self.q(&table.name),
            lines.join(",\n    "),
            suffix
        )
    }

    /// `DROP TABLE`.
    pub fn drop_table(&self, table: &str) -> String {
        match self.dialect {
            Dialect::Postgres => format!("DROP TABLE IF EXISTS {} CASCADE;", self.q(table)),
            _ => format!("DROP TABLE IF EXISTS {};", self.q(table)),
        }
    }

    /// Add a column.
    pub fn add_column(&self, table: &str, column: &str, definition: &str) -> String {
        let keyword = match self.dialect {
            Dialect::SqlServer => "ADD",
            _ => "ADD COLUMN",
        };
        format!(
            "ALTER TABLE {} {} {} {};",
            self.q(table),
            keyword,
            self.q(column),
            definition
        )
    }

    /// Drop a column.
    pub fn drop_column(&self, table: &str, column: &str) -> String {
        format!("ALTER TABLE {} DROP COLUMN {};", self.q(table), self.q(column))
    }

    /// Statements changing `column` from `from` to `to`.
    pub fn alter_column(
        &self,
        table: &str,
        column: &str,
        from: &str,
        to: &str,
    ) -> MigrateResult<Vec<String>> {
        let table_q = self.q(table);
        let column_q = self.q(column);
        let before = ColumnParts::parse(from);
        let after = ColumnParts::parse(to);

        if self.dialect != Dialect::Sqlite
            && (before.primary_key != after.primary_key || before.identity != after.identity)
        {
            return Err(MigrationError::unsupported(
                self.dialect,
                format!("changing the primary key or identity of column {table}.{column}"),
            ));
        }

        match self.dialect {
            Dialect::Postgres => {
                let mut statements = Vec::new();

                if !before.data_type.eq_ignore_ascii_case(&after.data_type) {
                    let target = postgres_storage_type(&after.data_type);
                    statements.push(format!(
                        "ALTER TABLE {table_q} ALTER COLUMN {column_q} TYPE {target} USING {column_q}::{target};"
                    ));
                }
                if before.not_null != after.not_null {
                    let action = if after.not_null { "SET" } else { "DROP" };
                    statements.push(format!(
                        "ALTER TABLE {table_q} ALTER COLUMN {column_q} {action} NOT NULL;"
                    ));
                }
                if before.default != after.default {
                    statements.push(match &after.default {
                        Some(default) => format!(
                            "ALTER TABLE {table_q} ALTER COLUMN {column_q} SET DEFAULT {default};"
                        ),
                        None => format!("ALTER TABLE {table_q} ALTER COLUMN {column_q} DROP DEFAULT;"),
                    });
                }
                if before.unique != after.unique {
                    // Inline UNIQUE constraints are named `{table}_{column}_key` by PostgreSQL.
                    let constraint = self.q(&format!("{table}_{column}_key"));
                    statements.push(if after.unique {
                        format!("ALTER TABLE {table_q} ADD CONSTRAINT {constraint} UNIQUE ({column_q});")
                    } else {
                        format!("ALTER TABLE {table_q} DROP CONSTRAINT IF EXISTS {constraint};")
                    });
                }
                if statements.is_empty() {
                    return Err(MigrationError::unsupported(
                        self.dialect,
                        format!("changing column {table}.{column} from `{from}` to `{to}`"),
                    ));
                }
                Ok(statements)
            }
            Dialect::MySql => {
                let mut statements = Vec::new();
                let (from_plain, to_plain) = (without_unique(from), without_unique(to));
                if from_plain != to_plain {
                    statements.push(format!(
                        "ALTER TABLE {table_q} MODIFY COLUMN {column_q} {to_plain};"
                    ));
                }
                if before.unique != after.unique {
                    // MySQL names the index of an inline UNIQUE after the column.
                    statements.push(if after.unique {
                        format!("ALTER TABLE {table_q} ADD UNIQUE INDEX {column_q} ({column_q});")
                    } else {
                        format!("ALTER TABLE {table_q} DROP INDEX {column_q};")
                    });
                }
                if statements.is_empty() {
                    return Err(MigrationError::unsupported(
                        self.dialect,
                        format!("changing column {table}.{column} from `{from}` to `{to}`"),
                    ));
                }
                Ok(statements)
            }
            Dialect::SqlServer => {
                if before.unique != after.unique {
                    return Err(MigrationError::unsupported(
                        self.dialect,
                        format!("changing the UNIQUE constraint of column {table}.{column}"),
                    ));
                }
                let nullability = if after.not_null { "NOT NULL" } else { "NULL" };
                Ok(vec![format!(
                    "ALTER TABLE {table_q} ALTER COLUMN {column_q} {} {nullability};",
                    after.data_type
                )])
            }
            Dialect::Sqlite => Err(MigrationError::unsupported(
                self.dialect,
                format!("changing the type of column {table}.{column}"),
            )),
        }
    }

    /// `CREATE INDEX`.
    pub fn create_index(&self, table: &str, index: &IndexDefinition) -> String {
        let unique = if index.unique { "UNIQUE " } else { "" };
        let if_not_exists = if self.dialect.supports_index_if_not_exists() {
            "IF NOT EXISTS "
        } else {
            ""
        };
        let columns = index
            .columns
            .iter()
            .map(|c| self.q(c))
            .collect::<Vec<_>>()
            .join(", ");
        let predicate = match &index.predicate {
            Some(predicate) if self.dialect.supports_partial_indexes() => {
                format!(" WHERE {predicate}")
            }
            _ => String::new(),
        };

        format!(
            "CREATE {unique}INDEX {if_not_exists}{} ON {} ({columns}){predicate};",
            self.q(&index.name),
            self.q(table)
        )
    }

    /// `DROP INDEX`.
    pub fn drop_index(&self, table: &str, index: &IndexDefinition) -> String {
        if self.dialect.drop_index_names_table() {
            format!("DROP INDEX {} ON {};", self.q(&index.name), self.q(table))
        } else {
            format!("DROP INDEX IF EXISTS {};", self.q(&index.name))
        }
    }

    /// Add a foreign-key constraint to an existing table.
    pub fn add_foreign_key(&self, table: &str, fk: &ForeignKey) -> MigrateResult<String> {
        if !self.dialect.supports_alter_constraints() {
            return Err(MigrationError::unsupported(
                self.dialect,
                format!("adding constraint {} to an existing table", fk.name),
            ));
        }
        Ok(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} {};",
            self.q(table),
            self.q(&fk.name),
            self.foreign_key_clause(fk)
        ))
    }

    /// Drop a foreign-key constraint.
    pub fn drop_foreign_key(&self, table: &str, fk: &ForeignKey) -> MigrateResult<String> {
        match self.dialect {
            Dialect::Sqlite => Err(MigrationError::unsupported(
                self.dialect,
                format!("dropping constraint {} from an existing table", fk.name),
            )),
            Dialect::MySql => Ok(format!(
                "ALTER TABLE {} DROP FOREIGN KEY {};",
                self.q(table),
                self.q(&fk.name)
            )),
            _ => Ok(format!(
                "ALTER TABLE {} DROP CONSTRAINT {};",
                self.q(table),
                self.q(&fk.name)
            )),
        }
    }

    fn foreign_key_clause(&self, fk: &ForeignKey) -> String {
        let mut clause = format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            self.q(&fk.column),
            self.q(&fk.references_table),
            self.q(&fk.references_column)
        );
        if let Some(action) = fk.on_delete {
            clause.push_str(&format!(" ON DELETE {}", action.as_sql()));
        }
        if let Some(action) = fk.on_update {
            clause.push_str(&format!(" ON UPDATE {}", action.as_sql()));
        }
        clause
    }
}

/// Serial pseudo-types are only valid in `CREATE TABLE`.
fn postgres_storage_type(data_type: &str) -> String {
    match data_type.to_ascii_uppercase().as_str() {
        "SERIAL" => "INTEGER".to_string(),
        "BIGSERIAL" => "BIGINT".to_string(),
        "SMALLSERIAL" => "SMALLINT".to_string(),
        _ => data_type.to_string(),
    }
}
