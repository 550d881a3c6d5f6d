//! Class API compiler
//!
//! Turns a [`ClassRegistry`] into the classes domain of the schema:
//!
//! - [`types`]: object, connection and edge types per class, the `Node` interface
//! - [`filter`]: filter inputs and sort enums of list queries
//! - [`query`]: list, single and raw queries
//! - [`mutation`]: create, update, replace, remove and recover
//!
//! Resolvers read storage from request data (`Arc<dyn Storage>`), so a
//! compiled schema can be shared by every request of its project.

pub mod filter;
pub mod mutation;
pub mod query;
pub mod record;
pub mod types;

use std::sync::Arc;

use async_graphql::dynamic::Field;
use tracing::debug;

use crate::classes::{ClassHelper, ClassRegistry};
use crate::schema::{FieldsGetter, TypeArena};

pub use mutation::{MutationKind, MutationPayload, RequestContext};
pub use record::{ClassData, ClassRecord, EdgeNode, NodeRecord};

/// Query and mutation fields derived from class definitions
pub struct ClassesFields {
    registry: Arc<ClassRegistry>,
    helpers: Vec<Arc<ClassHelper>>,
    /// Stamped as `_classVersion` on every write
    version: i64,
}

impl ClassesFields {
    pub fn new(registry: ClassRegistry, version: i64) -> Self {
        let helpers = registry.helpers().iter().cloned().map(Arc::new).collect();
        Self {
            registry: Arc::new(registry),
            helpers,
            version,
        }
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }
}

impl FieldsGetter for ClassesFields {
    fn query_fields(&self) -> Vec<(String, Field)> {
        let mut fields = Vec::with_capacity(self.helpers.len() * 3 + 1);
        for helper in &self.helpers {
            fields.push((helper.list_query_name(), query::list_field(helper.clone())));
            fields.push((helper.single_query_name(), query::single_field(helper.clone())));
            fields.push((
                format!("{}Raw", helper.single_query_name()),
                query::raw_field(helper.clone()),
            ));
        }
        fields.push(("node".to_string(), types::node_field(self.registry.clone())));
        fields
    }

    fn mutation_fields(&self) -> Vec<(String, Field)> {
        self.helpers
            .iter()
            .flat_map(|helper| {
                MutationKind::ALL.into_iter().map(move |kind| {
                    (
                        kind.field_name(helper.name()),
                        mutation::mutation_field(kind, helper.clone(), self.version),
                    )
                })
            })
            .collect()
    }

    fn register_types(&self, arena: &mut TypeArena) {
        arena.register(types::NODE_INTERFACE, types::node_interface());

        for helper in &self.helpers {
            debug!(class = helper.name(), "building class types");
            arena.register(helper.name(), types::class_object(helper));
            arena.register_connection(helper.name());

            for (name, input) in filter::filter_inputs(helper).into_iter().flatten() {
                arena.register(name, input);
            }
            arena.register(filter::order_type_name(helper), filter::order_enum(helper));

            for kind in MutationKind::ALL {
                arena.register(
                    mutation::input_type_name(kind, helper.name()),
                    mutation::input_object(kind, helper),
                );
                arena.register(
                    mutation::payload_type_name(kind, helper.name()),
                    mutation::payload_object(kind, helper.clone()),
                );
            }
        }
    }
}
