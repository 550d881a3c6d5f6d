//! Error types for the class API compiler
//!
//! - [`DefinitionError`]: a class definition cannot be compiled
//! - [`ResolveError`]: a single field or operation failed while resolving a request
//! - [`ApiError`]: anything surfaced by the schema assembler and the CLI

use thiserror::Error;

use crate::ids::IdError;
use crate::storage::StorageError;

/// Result type for API assembly operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors raised while compiling class definitions into a schema.
///
/// Any of these aborts compilation for the whole project.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("Parse error: Cannot use reserved prefix \"{prefix}\" in class \"{class}\"")]
    ReservedClassPrefix { prefix: String, class: String },

    #[error("Parse error: Cannot use reserved class name \"{0}\"")]
    ReservedClassName(String),

    #[error("Parse error: Cannot use reserved field \"{field}\" in class \"{class}\"")]
    ReservedField { field: String, class: String },

    #[error("Parse error: Cannot use reserved prefix \"{prefix}\" in field \"{field}\" of class \"{class}\"")]
    ReservedFieldPrefix {
        prefix: String,
        field: String,
        class: String,
    },

    #[error("Parse error: Array must have a length of 1")]
    ArrayLength,

    #[error("Parse error: \"relation\" needs a \"ref\"")]
    MissingRef,

    #[error("Parse error: Found a reference to missing class \"{0}\"")]
    MissingClass(String),

    #[error("Parse error: Cannot parse field \"{field}\" of class \"{class}\"")]
    UnparsableField { field: String, class: String },

    #[error("Cannot create fields for {0}, queries for one and multiple have the same name !")]
    NameCollision(String),

    #[error("Invalid class definition: {0}")]
    InvalidFormat(String),
}

/// Errors raised by resolvers. The display text is what callers see in the
/// response error list.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Object \"{0}\" not found")]
    NotFound(String),

    #[error("Object \"{0}\" marked as removed")]
    Removed(String),

    #[error("File not found")]
    FileNotFound,

    #[error("There is no \"{class}\" with id \"{id}\" !")]
    MissingReference { class: String, id: String },

    #[error("Usage of \"{0}\" mutation is not allowed")]
    MutationNotAllowed(String),

    #[error("Invalid RegExp at {class}/{field}")]
    InvalidRegExp { class: String, field: String },

    #[error("Unknown class \"{0}\"")]
    UnknownClass(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Unexpected parent value for {0}")]
    Downcast(&'static str),

    #[error(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Top-level errors for schema assembly and tooling
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("Error generating schema: {0}")]
    Schema(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<async_graphql::dynamic::SchemaError> for ApiError {
    fn from(value: async_graphql::dynamic::SchemaError) -> Self {
        ApiError::Schema(value.to_string())
    }
}
