//! Field type tokens
//!
//! Maps the primitive type tokens of a class definition to GraphQL scalars.

use async_graphql::dynamic::{Scalar, TypeRef};
use async_graphql::Value as GqlValue;

/// Opaque storage identifier scalar
pub const OBJECT_ID_TYPE: &str = "ObjectIDType";

/// Arbitrary JSON scalar
pub const MIXED_TYPE: &str = "MixedType";

/// Primitive type of a declared field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    String,
    Boolean,
    Int,
    Float,
    Mixed,
    Relation,
}

impl ScalarKind {
    /// Map a case-insensitive type token, `None` when unrecognized
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "string" => Some(Self::String),
            "boolean" => Some(Self::Boolean),
            "int" | "integer" => Some(Self::Int),
            "float" | "number" => Some(Self::Float),
            "object" | "mixed" => Some(Self::Mixed),
            "relation" => Some(Self::Relation),
            _ => None,
        }
    }

    /// GraphQL type name. Relations map to the identifier scalar.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::String => TypeRef::STRING,
            Self::Boolean => TypeRef::BOOLEAN,
            Self::Int => TypeRef::INT,
            Self::Float => TypeRef::FLOAT,
            Self::Mixed => MIXED_TYPE,
            Self::Relation => OBJECT_ID_TYPE,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }
}

/// Custom scalars every compiled schema registers
pub fn custom_scalars() -> Vec<Scalar> {
    vec![
        Scalar::new(OBJECT_ID_TYPE)
            .description("Storage identifier, raw or encoded as a global id")
            .validator(|value| matches!(value, GqlValue::String(_))),
        Scalar::new(MIXED_TYPE).description("Arbitrary JSON value"),
    ]
}
