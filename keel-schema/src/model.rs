//! Model descriptors and the registry that holds them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{SchemaError, SchemaResult};
use crate::field::FieldDescriptor;
use crate::naming::to_snake_case;

/// Description of one data model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Declared type name.
    pub name: SmolStr,
    /// Explicit table name.
    pub table_name: Option<String>,
    /// Fields in declaration order.
    pub fields: Vec<FieldDescriptor>,
}

impl ModelDescriptor {
    /// Create a model with no fields.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            table_name: None,
            fields: Vec::new(),
        }
    }

    /// Override the table name.
    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Append a field.
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Resolved table name.
    pub fn table_name(&self) -> String {
        self.table_name
            .clone()
            .unwrap_or_else(|| to_snake_case(&self.name))
    }

    /// Look up a field by declared name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A type that can describe itself as a model.
pub trait Entity {
    /// Build the model descriptor.
    fn describe() -> ModelDescriptor;
}

/// Ordered set of models to build a schema from.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: IndexMap<SmolStr, ModelDescriptor>,
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor. Model names are unique.
    pub fn register(&mut self, model: ModelDescriptor) -> SchemaResult<&mut Self> {
        if self.models.contains_key(&model.name) {
            return Err(SchemaError::duplicate("model", model.name.as_str()));
        }
        self.models.insert(model.name.clone(), model);
        Ok(self)
    }

    /// Register an [`Entity`] type.
    pub fn register_entity<E: Entity>(&mut self) -> SchemaResult<&mut Self> {
        self.register(E::describe())
    }

    /// Look up a model by name.
    pub fn get(&self, name: &str) -> Option<&ModelDescriptor> {
        self.models.get(name)
    }

    /// Models in registration order.
    pub fn models(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether no model is registered.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarType;

    struct Account;

    impl Entity for Account {
        fn describe() -> ModelDescriptor {
            ModelDescriptor::new("APIAccount")
                .field(FieldDescriptor::scalar("ID", ScalarType::Int))
                .field(FieldDescriptor::scalar("Name", ScalarType::String))
        }
    }

    #[test]
    fn test_table_name_defaults_to_snake_case() {
        assert_eq!(Account::describe().table_name(), "api_account");
        assert_eq!(ModelDescriptor::new("User").table("people").table_name(), "people");
    }

    #[test]
    fn test_registry_preserves_order() {
        let mut registry = ModelRegistry::new();
        registry
            .register(ModelDescriptor::new("Zebra"))
            .unwrap()
            .register(ModelDescriptor::new("Apple"))
            .unwrap();
        let names: Vec<_> = registry.models().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Zebra", "Apple"]);
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = ModelRegistry::new();
        registry.register_entity::<Account>().unwrap();
        assert!(registry.register_entity::<Account>().is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_field() {
        let model = Account::describe();
        assert!(model.get_field("Name").is_some());
        assert!(model.get_field("Missing").is_none());
    }
}
