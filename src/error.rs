//! Error types for model operations.
//!
//! Every failing operation on a [`Model`](crate::Model) returns a [`ModelError`] and
//! keeps a copy of it as the model's last error.

use crate::engine::EngineError;
use indexmap::IndexMap;

/// Result alias used throughout the crate
pub type ModelResult<T> = Result<T, ModelError>;

/// Validation failure state
///
/// Non-batch validation stops at the first failing rule and carries its message.
/// Batch validation collects the first failing message of every field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrors {
    /// First failing rule's message
    Single(String),
    /// Field (or comma-joined field list) to message
    Fields(IndexMap<String, String>),
}

impl ValidationErrors {
    /// Message recorded for `field`, if any
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        match self {
            ValidationErrors::Single(_) => None,
            ValidationErrors::Fields(map) => map.get(field).map(String::as_str),
        }
    }

    /// Number of recorded messages
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            ValidationErrors::Single(_) => 1,
            ValidationErrors::Fields(map) => map.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationErrors::Single(msg) => write!(f, "{msg}"),
            ValidationErrors::Fields(map) => {
                let mut first = true;
                for (field, msg) in map {
                    if !first {
                        write!(f, "; ")?;
                    }
                    write!(f, "{field}: {msg}")?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

/// Error type for model operations
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Empty or malformed input to create/add/save
    InvalidData(String),
    /// Field rejected by the whitelist under strict mode
    UnknownField { field: String, value: String },
    /// Where-key rejected under strict mode
    InvalidCondition { key: String, value: String },
    /// Composite key arguments don't match the key arity
    IncompleteCompositeKey { expected: usize, given: usize },
    /// save/delete could not derive a where-clause
    MissingCondition,
    /// delete refused an unconditioned where
    EmptyDeleteGuard,
    /// Validation rules rejected the record
    Validation(ValidationErrors),
    /// The engine reported no columns for the table
    SchemaUnavailable(String),
    /// Database engine failure, surfaced as-is
    Engine(EngineError),
    /// Schema cache read/write failure
    Cache(String),
    /// Name not present in the model's method table
    UnknownMethod(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::InvalidData(msg) => write!(f, "Invalid data object: {msg}"),
            ModelError::UnknownField { field, value } => {
                write!(f, "Illegal data field: [{field} => {value}]")
            }
            ModelError::InvalidCondition { key, value } => {
                write!(f, "Illegal query condition: [{key} => {value}]")
            }
            ModelError::IncompleteCompositeKey { expected, given } => write!(
                f,
                "Incomplete composite key: expected {expected} value(s), got {given}"
            ),
            ModelError::MissingCondition => {
                write!(f, "No condition could be derived for this operation")
            }
            ModelError::EmptyDeleteGuard => {
                write!(f, "Refusing to delete without a condition")
            }
            ModelError::Validation(errors) => write!(f, "Validation failed: {errors}"),
            ModelError::SchemaUnavailable(table) => {
                write!(f, "No column information available for table {table}")
            }
            ModelError::Engine(e) => write!(f, "Database error: {e}"),
            ModelError::Cache(msg) => write!(f, "Schema cache error: {msg}"),
            ModelError::UnknownMethod(name) => write!(f, "Method {name} does not exist"),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::Engine(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineError> for ModelError {
    fn from(err: EngineError) -> Self {
        ModelError::Engine(err)
    }
}

impl From<ValidationErrors> for ModelError {
    fn from(errors: ValidationErrors) -> Self {
        ModelError::Validation(errors)
    }
}
