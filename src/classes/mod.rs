//! Class Registry
//!
//! Validates raw class definitions and normalizes each class into an
//! immutable [`ClassHelper`]:
//!
//! - class names may not start with a reserved prefix or use a reserved name
//! - field names are camel-cased and checked against the reserved field set
//! - every field spec is resolved to a [`FieldKind`]; relations must point at a
//!   registered class or at the built-in `file` class
//!
//! The registry is built in two passes. All class names are collected first,
//! so relations can reference classes declared later, or the class itself.

pub mod definition;
pub mod scalar;

use std::collections::HashMap;

use async_graphql::dynamic::TypeRef;
use tracing::debug;

use crate::error::DefinitionError;
use crate::names::{camel_case, upper_first};

pub use definition::{parse_definitions, ClassDefinition, FieldOptions, FieldSpec};
pub use scalar::{ScalarKind, MIXED_TYPE, OBJECT_ID_TYPE};

/// Class name prefixes nobody may declare
pub const RESERVED_CLASS_PREFIXES: &[&str] = &["_"];

/// Class names nobody may declare
pub const RESERVED_CLASS_NAMES: &[&str] = &["File"];

/// Field names used by system fields and the definition format itself
pub const RESERVED_FIELDS: &[&str] = &[
    "id",
    "_id",
    "mongoId",
    "createdAt",
    "updatedAt",
    "clientMutationId",
    "options",
    "fields",
];

pub const RESERVED_FIELD_PREFIXES: &[&str] = &["_"];

/// Built-in relation target backed by the file store
pub const FILE_CLASS: &str = "File";

// =============================================================================
// Fields
// =============================================================================

/// Resolved shape of a declared field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(ScalarKind),
    List(ScalarKind),
    /// Singular relation to the named class
    Relation(String),
    /// To-many relation to the named class
    RelationList(String),
}

/// Where a field descriptor is used. Drives [`ClassField::type_ref`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMode {
    /// Object type fields: relations resolved, nothing forced non-null
    Detail,
    /// Lookup arguments, create and update inputs: raw ids, nothing required
    Input,
    /// Replace inputs: raw ids, required as declared
    StrictInput,
}

/// A validated class field
#[derive(Debug, Clone, PartialEq)]
pub struct ClassField {
    /// Camel-cased name, also the key under `data` in storage
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: Option<String>,
}

impl ClassField {
    /// Target class of a relation field
    pub fn relation_target(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Relation(target) | FieldKind::RelationList(target) => Some(target),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, FieldKind::List(_) | FieldKind::RelationList(_))
    }

    /// Scalar kind, relations report [`ScalarKind::Relation`]
    pub fn scalar(&self) -> ScalarKind {
        match self.kind {
            FieldKind::Scalar(kind) | FieldKind::List(kind) => kind,
            FieldKind::Relation(_) | FieldKind::RelationList(_) => ScalarKind::Relation,
        }
    }

    /// Field type for the given usage
    pub fn type_ref(&self, mode: FieldMode) -> TypeRef {
        let non_null = mode == FieldMode::StrictInput && self.required;
        let (name, list) = match (&self.kind, mode) {
            (FieldKind::Relation(target), FieldMode::Detail) => (target.clone(), false),
            (FieldKind::RelationList(target), FieldMode::Detail) => {
                return TypeRef::named(connection_type_name(target));
            }
            (FieldKind::Relation(_), _) => (TypeRef::ID.to_string(), false),
            (FieldKind::RelationList(_), _) => (TypeRef::ID.to_string(), true),
            (FieldKind::Scalar(kind), _) => (kind.type_name().to_string(), false),
            (FieldKind::List(kind), _) => (kind.type_name().to_string(), true),
        };
        match (list, non_null) {
            (false, false) => TypeRef::named(name),
            (false, true) => TypeRef::named_nn(name),
            (true, false) => TypeRef::named_list(name),
            (true, true) => TypeRef::named_list_nn(name),
        }
    }
}

/// Name of the paginated connection type of a class
pub fn connection_type_name(class_name: &str) -> String {
    format!("{}Connection", class_name)
}

/// Name of the edge type of a class connection
pub fn edge_type_name(class_name: &str) -> String {
    format!("{}Edge", class_name)
}

/// A relation-bearing field and the class it points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationField {
    pub field_name: String,
    pub class_name: String,
}

// =============================================================================
// Class helper
// =============================================================================

/// Normalized, immutable view of one class
#[derive(Debug, Clone)]
pub struct ClassHelper {
    name: String,
    plural: Option<String>,
    fields: Vec<ClassField>,
}

impl ClassHelper {
    /// Capitalized class name, also the GraphQL object type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display plural, `<Name>s` when not configured
    pub fn plural_name(&self) -> String {
        self.plural.clone().unwrap_or_else(|| format!("{}s", self.name))
    }

    /// Capitalized plural used inside generated type names
    pub fn plural_type_name(&self) -> String {
        upper_first(&self.plural_name())
    }

    /// Single item query field name
    pub fn single_query_name(&self) -> String {
        camel_case(&self.name)
    }

    /// List query field name
    pub fn list_query_name(&self) -> String {
        camel_case(&self.plural_name())
    }

    pub fn fields(&self) -> &[ClassField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&ClassField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Every relation field with its target class
    pub fn fields_with_relations(&self) -> Vec<RelationField> {
        self.fields
            .iter()
            .filter_map(|f| {
                f.relation_target().map(|target| RelationField {
                    field_name: f.name.clone(),
                    class_name: target.to_string(),
                })
            })
            .collect()
    }

    /// Fields eligible for the sort enum: neither lists nor relations
    pub fn sortable_fields_name(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| matches!(f.kind, FieldKind::Scalar(_)))
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Fields eligible for filter inputs: everything but lists
    pub fn filterable_fields(&self) -> Vec<&ClassField> {
        self.fields.iter().filter(|f| !f.is_list()).collect()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// All classes of one compilation pass
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    helpers: Vec<ClassHelper>,
    /// lower-cased name -> index into `helpers`
    index: HashMap<String, usize>,
}

impl ClassRegistry {
    /// Parse and register a JSON definitions map
    pub fn from_json(definitions: &serde_json::Value) -> Result<Self, DefinitionError> {
        Self::register(&parse_definitions(definitions)?)
    }

    /// Validate and normalize class definitions
    pub fn register(definitions: &[ClassDefinition]) -> Result<Self, DefinitionError> {
        let mut targets: HashMap<String, String> = HashMap::new();
        targets.insert(FILE_CLASS.to_lowercase(), FILE_CLASS.to_string());

        for definition in definitions {
            check_class_name(&definition.name)?;
            let name = upper_first(&definition.name);
            if targets.insert(name.to_lowercase(), name.clone()).is_some() {
                return Err(DefinitionError::InvalidFormat(format!(
                    "class \"{}\" is declared twice",
                    name
                )));
            }
        }

        let mut registry = Self::default();
        for definition in definitions {
            let name = upper_first(&definition.name);
            let fields = definition
                .fields
                .iter()
                .map(|(field, spec)| resolve_field(&name, field, spec, &targets))
                .collect::<Result<Vec<_>, _>>()?;

            let helper = ClassHelper {
                name,
                plural: definition.plural.clone(),
                fields,
            };
            if helper.single_query_name() == helper.list_query_name() {
                return Err(DefinitionError::NameCollision(helper.name));
            }

            debug!(class = %helper.name, fields = helper.fields.len(), "registered class");
            registry
                .index
                .insert(helper.name.to_lowercase(), registry.helpers.len());
            registry.helpers.push(helper);
        }
        Ok(registry)
    }

    /// Helpers in declaration order
    pub fn helpers(&self) -> &[ClassHelper] {
        &self.helpers
    }

    /// Case-insensitive class lookup
    pub fn get(&self, name: &str) -> Option<&ClassHelper> {
        self.index
            .get(&name.to_lowercase())
            .map(|&i| &self.helpers[i])
    }

    /// Canonical name of a relation target, including the file class
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        if name.eq_ignore_ascii_case(FILE_CLASS) {
            return Some(FILE_CLASS);
        }
        self.get(name).map(ClassHelper::name)
    }

    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }
}

fn check_class_name(name: &str) -> Result<(), DefinitionError> {
    let lower = name.to_lowercase();
    if let Some(prefix) = RESERVED_CLASS_PREFIXES
        .iter()
        .find(|p| lower.starts_with(&p.to_lowercase()))
    {
        return Err(DefinitionError::ReservedClassPrefix {
            prefix: prefix.to_string(),
            class: name.to_string(),
        });
    }
    if RESERVED_CLASS_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name)) {
        return Err(DefinitionError::ReservedClassName(name.to_string()));
    }
    Ok(())
}

fn resolve_field(
    class: &str,
    raw_name: &str,
    spec: &FieldSpec,
    targets: &HashMap<String, String>,
) -> Result<ClassField, DefinitionError> {
    let name = camel_case(raw_name);
    if RESERVED_FIELDS.contains(&name.as_str()) {
        return Err(DefinitionError::ReservedField {
            field: name,
            class: class.to_string(),
        });
    }
    if let Some(prefix) = RESERVED_FIELD_PREFIXES.iter().find(|p| raw_name.starts_with(*p)) {
        return Err(DefinitionError::ReservedFieldPrefix {
            prefix: prefix.to_string(),
            field: raw_name.to_string(),
            class: class.to_string(),
        });
    }

    let unparsable = || DefinitionError::UnparsableField {
        field: raw_name.to_string(),
        class: class.to_string(),
    };

    let (element, list) = match spec {
        FieldSpec::List(items) if items.len() != 1 => return Err(DefinitionError::ArrayLength),
        FieldSpec::List(items) => (&items[0], true),
        other => (other, false),
    };

    let (scalar, target, required, description) = match element {
        FieldSpec::Token(token) => match ScalarKind::from_token(token) {
            Some(ScalarKind::Relation) => return Err(DefinitionError::MissingRef),
            Some(kind) => (kind, None, false, None),
            None => return Err(unparsable()),
        },
        FieldSpec::Detailed(options) => {
            let kind = options
                .type_name
                .as_deref()
                .and_then(ScalarKind::from_token)
                .ok_or_else(unparsable)?;
            let target = if kind == ScalarKind::Relation {
                let reference = options.reference.as_deref().ok_or(DefinitionError::MissingRef)?;
                let target = targets
                    .get(&reference.to_lowercase())
                    .ok_or_else(|| DefinitionError::MissingClass(reference.to_string()))?;
                Some(target.clone())
            } else {
                None
            };
            (kind, target, options.required, options.description.clone())
        }
        FieldSpec::List(_) => return Err(unparsable()),
    };

    let kind = match (target, list) {
        (None, false) => FieldKind::Scalar(scalar),
        (None, true) => FieldKind::List(scalar),
        (Some(target), false) => FieldKind::Relation(target),
        (Some(target), true) => FieldKind::RelationList(target),
    };

    Ok(ClassField {
        name,
        kind,
        required,
        description,
    })
}
