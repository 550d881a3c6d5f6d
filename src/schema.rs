//! Schema assembler
//!
//! Every domain contributes query fields, mutation fields and the named types
//! those fields reference. The assembler merges them into one schema:
//!
//! - fields are merged by name, later domains win on collision
//! - types go through a name-indexed arena, so a type shared by several
//!   domains (e.g. `FileConnection`) is registered once
//! - the `Mutation` root is omitted when no domain has a mutation field

use std::collections::BTreeMap;

use async_graphql::dynamic::indexmap::IndexMap;
use async_graphql::dynamic::{Field, Object, Schema, Type};
use tracing::{debug, info};

use crate::checksum::Checksum;
use crate::classes::scalar::custom_scalars;
use crate::classes::{ClassRegistry, MIXED_TYPE, OBJECT_ID_TYPE};
use crate::compiler::types::{connection_types, node_interface, NODE_INTERFACE};
use crate::compiler::ClassesFields;
use crate::connection::{page_info_type, PAGE_INFO_TYPE};
use crate::domains::{FilesFields, Project, ProjectFields};
use crate::error::Result;

pub const QUERY_ROOT: &str = "Query";
pub const MUTATION_ROOT: &str = "Mutation";

// =============================================================================
// Type arena
// =============================================================================

/// Named types of a schema under construction. First registration wins.
#[derive(Default)]
pub struct TypeArena {
    types: BTreeMap<String, Type>,
}

impl TypeArena {
    pub fn register(&mut self, name: impl Into<String>, ty: impl Into<Type>) {
        let name = name.into();
        if !self.types.contains_key(&name) {
            self.types.insert(name, ty.into());
        }
    }

    /// `<Type>Connection` and `<Type>Edge` of a node type
    pub fn register_connection(&mut self, type_name: &str) {
        for (name, object) in connection_types(type_name) {
            self.register(name, object);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn into_types(self) -> impl Iterator<Item = Type> {
        self.types.into_values()
    }
}

/// A schema domain
pub trait FieldsGetter {
    /// `(name, field)` pairs of the Query root
    fn query_fields(&self) -> Vec<(String, Field)>;

    /// `(name, field)` pairs of the Mutation root
    fn mutation_fields(&self) -> Vec<(String, Field)>;

    /// Register every named type the fields reference
    fn register_types(&self, arena: &mut TypeArena);
}

// =============================================================================
// Assembly
// =============================================================================

/// A schema plus the definitions hash it was compiled from
#[derive(Clone)]
pub struct CompiledSchema {
    pub schema: Schema,
    pub hash: Checksum,
    pub class_count: usize,
}

impl CompiledSchema {
    /// SDL of the compiled schema
    pub fn sdl(&self) -> String {
        self.schema.sdl()
    }
}

fn base_types() -> TypeArena {
    let mut arena = TypeArena::default();
    for (name, scalar) in [OBJECT_ID_TYPE, MIXED_TYPE].into_iter().zip(custom_scalars()) {
        arena.register(name, scalar);
    }
    arena.register(PAGE_INFO_TYPE, page_info_type());
    arena.register(NODE_INTERFACE, node_interface());
    arena
}

/// Merge domains into one executable schema
pub fn assemble(domains: &[&dyn FieldsGetter]) -> Result<Schema> {
    let mut arena = base_types();
    let mut queries: IndexMap<String, Field> = IndexMap::new();
    let mut mutations: IndexMap<String, Field> = IndexMap::new();

    for domain in domains {
        domain.register_types(&mut arena);
        queries.extend(domain.query_fields());
        mutations.extend(domain.mutation_fields());
    }

    let query = queries
        .into_values()
        .fold(Object::new(QUERY_ROOT), |root, field| root.field(field));
    let mutation = (!mutations.is_empty()).then(|| {
        mutations
            .into_values()
            .fold(Object::new(MUTATION_ROOT), |root, field| root.field(field))
    });

    debug!(types = arena.len(), mutation = mutation.is_some(), "assembling schema");
    let mut builder = Schema::build(QUERY_ROOT, mutation.as_ref().map(|_| MUTATION_ROOT), None).register(query);
    if let Some(mutation) = mutation {
        builder = builder.register(mutation);
    }
    for ty in arena.into_types() {
        builder = builder.register(ty);
    }
    Ok(builder.finish()?)
}

/// Compile the schema of a project: classes, files and project domains
pub fn generate_schema(project: &Project) -> Result<CompiledSchema> {
    let registry = ClassRegistry::from_json(project.definitions())?;
    let class_count = registry.len();
    let classes = ClassesFields::new(registry, project.version());

    let schema = assemble(&[&classes, &FilesFields, &ProjectFields])?;
    let hash = project.schema_hash();
    info!(project = %project.id, classes = class_count, %hash, "compiled schema");
    Ok(CompiledSchema {
        schema,
        hash,
        class_count,
    })
}
