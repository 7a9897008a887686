//! Error types for model description and schema building.

use miette::Diagnostic;
use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur while describing models or building table schemas.
#[derive(Error, Debug, Diagnostic)]
pub enum SchemaError {
    /// Invalid model definition.
    #[error("invalid model `{name}`: {message}")]
    #[diagnostic(code(keel::schema::invalid_model))]
    InvalidModel { name: String, message: String },

    /// Invalid field definition.
    #[error("invalid field `{model}.{field}`: {message}")]
    #[diagnostic(code(keel::schema::invalid_field))]
    InvalidField {
        model: String,
        field: String,
        message: String,
    },

    /// Invalid relation definition.
    #[error("invalid relation `{model}.{field}`: {message}")]
    #[diagnostic(
        code(keel::schema::invalid_relation),
        help("declare the foreign-key column on the owning model or set `foreignKey:`")
    )]
    InvalidRelation {
        model: String,
        field: String,
        message: String,
    },

    /// Duplicate definition.
    #[error("duplicate {kind} `{name}`")]
    #[diagnostic(code(keel::schema::duplicate))]
    Duplicate { kind: String, name: String },

    /// Unknown model reference.
    #[error("unknown type `{type_name}` in `{model}.{field}`")]
    #[diagnostic(code(keel::schema::unknown_type))]
    UnknownType {
        model: String,
        field: String,
        type_name: String,
    },

    /// Malformed field tag.
    #[error("invalid tag `{tag}`: {message}")]
    #[diagnostic(code(keel::schema::invalid_tag))]
    InvalidTag { tag: String, message: String },

    /// Unrecognized dialect name.
    #[error("unknown dialect `{0}`")]
    #[diagnostic(
        code(keel::schema::unknown_dialect),
        help("expected one of: postgres, mysql, sqlserver, sqlite")
    )]
    UnknownDialect(String),
}

impl SchemaError {
    /// Create an invalid model error.
    pub fn invalid_model(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidModel {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid field error.
    pub fn invalid_field(
        model: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            model: model.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an invalid relation error.
    pub fn invalid_relation(
        model: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidRelation {
            model: model.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a duplicate definition error.
    pub fn duplicate(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Duplicate {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an unknown type error.
    pub fn unknown_type(
        model: impl Into<String>,
        field: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        Self::UnknownType {
            model: model.into(),
            field: field.into(),
            type_name: type_name.into(),
        }
    }

    /// Create an invalid tag error.
    pub fn invalid_tag(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTag {
            tag: tag.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_relation_display() {
        let err = SchemaError::invalid_relation("Order", "Customer", "missing column `customer_id`");
        let msg = err.to_string();
        assert!(msg.contains("Order.Customer"));
        assert!(msg.contains("customer_id"));
    }

    #[test]
    fn test_duplicate_display() {
        let err = SchemaError::duplicate("model", "User");
        assert_eq!(err.to_string(), "duplicate model `User`");
    }

    #[test]
    fn test_diagnostic_code() {
        let err = SchemaError::invalid_tag("index:", "empty index name");
        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("keel::schema::invalid_tag"));
    }

    #[test]
    fn test_unknown_dialect_help() {
        let err = SchemaError::UnknownDialect("oracle".to_string());
        assert!(err.help().is_some());
        assert!(err.to_string().contains("oracle"));
    }
}
