//! Type & connection builder
//!
//! Per class: the object type (declared fields with relations resolved plus
//! the system fields), the `<Class>Connection` / `<Class>Edge` pair, and the
//! shared `Node` interface with its `node(id)` lookup.

use std::sync::Arc;

use async_graphql::dynamic::{
    Field, FieldFuture, FieldValue, Interface, InterfaceField, InputValue, Object, TypeRef,
};
use async_graphql::Value as GqlValue;

use crate::classes::{
    connection_type_name, edge_type_name, ClassField, ClassHelper, ClassRegistry, FieldKind, FieldMode,
};
use crate::connection::{connection_from_slice, connection_type, edge_type, ConnectionArgs, Edge};
use crate::error::ResolveError;
use crate::ids::{from_global_id, parse_object_id};
use crate::value::{bson_to_gql, iso_timestamp};

use super::record::{reference_id, ClassData, ClassRecord, EdgeNode};

pub const NODE_INTERFACE: &str = "Node";

fn record<'a>(value: &'a FieldValue<'_>) -> Result<&'a ClassRecord, ResolveError> {
    value
        .downcast_ref::<ClassRecord>()
        .ok_or(ResolveError::Downcast("class record"))
}

// =============================================================================
// Node
// =============================================================================

pub fn node_interface() -> Interface {
    Interface::new(NODE_INTERFACE)
        .description("An object with an ID")
        .field(InterfaceField::new("id", TypeRef::named_nn(TypeRef::ID)))
}

/// `node(id: ID!): Node` over every registered class and the file store
pub fn node_field(registry: Arc<ClassRegistry>) -> Field {
    Field::new("node", TypeRef::named(NODE_INTERFACE), move |ctx| {
        let registry = registry.clone();
        FieldFuture::new(async move {
            let data = ClassData::from_ctx(&ctx)?;
            let global_id = ctx.args.try_get("id")?.string()?;
            let decoded = from_global_id(global_id)?;
            let class_name = registry
                .canonical_name(&decoded.type_name)
                .ok_or_else(|| ResolveError::UnknownClass(decoded.type_name.clone()))?;
            let id = parse_object_id(&decoded.id)
                .ok_or_else(|| ResolveError::NotFound(class_name.to_string()))?;
            let node = data.get_by_id(class_name, id).await?;
            Ok(Some(node.into_node_value()))
        })
    })
    .argument(InputValue::new("id", TypeRef::named_nn(TypeRef::ID)))
    .description("Fetches an object given its ID")
}

// =============================================================================
// Connections
// =============================================================================

/// `<Type>Connection` and `<Type>Edge` for nodes fetched from `type_name`
pub fn connection_types(type_name: &str) -> [(String, Object); 2] {
    let target = type_name.to_string();
    let node = Field::new("node", TypeRef::named(type_name), move |ctx| {
        let target = target.clone();
        FieldFuture::new(async move {
            let edge = ctx
                .parent_value
                .downcast_ref::<Edge<EdgeNode>>()
                .ok_or(ResolveError::Downcast("edge"))?;
            match &edge.node {
                EdgeNode::Loaded(node) => Ok(Some(node.clone().into_field_value())),
                EdgeNode::Pending(id) => {
                    let data = ClassData::from_ctx(&ctx)?;
                    let node = data.get_by_id(&target, *id).await?;
                    Ok(Some(node.into_field_value()))
                }
                EdgeNode::Missing => Ok(None),
            }
        })
    });

    [
        (connection_type_name(type_name), connection_type::<EdgeNode>(type_name)),
        (edge_type_name(type_name), edge_type::<EdgeNode>(type_name, node)),
    ]
}

// =============================================================================
// Class objects
// =============================================================================

fn declared_field(field: &ClassField) -> Field {
    let name = field.name.clone();
    let ty = field.type_ref(FieldMode::Detail);

    let built = match &field.kind {
        FieldKind::Scalar(_) | FieldKind::List(_) => Field::new(&field.name, ty, move |ctx| {
            let name = name.clone();
            FieldFuture::new(async move {
                let record = record(ctx.parent_value)?;
                Ok(record.data.get(&name).map(|v| FieldValue::value(bson_to_gql(v))))
            })
        }),
        FieldKind::Relation(target) => {
            let target = target.clone();
            Field::new(&field.name, ty, move |ctx| {
                let name = name.clone();
                let target = target.clone();
                FieldFuture::new(async move {
                    let record = record(ctx.parent_value)?;
                    let Some(id) = record.data.get(&name).and_then(reference_id) else {
                        return Ok(None);
                    };
                    let data = ClassData::from_ctx(&ctx)?;
                    let node = data.get_by_id(&target, id).await?;
                    Ok(Some(node.into_field_value()))
                })
            })
        }
        FieldKind::RelationList(_) => {
            let field = Field::new(&field.name, ty, move |ctx| {
                let name = name.clone();
                FieldFuture::new(async move {
                    let record = record(ctx.parent_value)?;
                    let nodes: Vec<EdgeNode> = match record.data.get(&name) {
                        Some(bson::Bson::Array(items)) => items
                            .iter()
                            .map(|item| reference_id(item).map_or(EdgeNode::Missing, EdgeNode::Pending))
                            .collect(),
                        _ => Vec::new(),
                    };
                    let args = ConnectionArgs::from_args(ctx.args.as_index_map());
                    let connection = connection_from_slice(&nodes, &args)?;
                    Ok(Some(FieldValue::owned_any(connection)))
                })
            });
            ConnectionArgs::arguments()
                .into_iter()
                .fold(field, |field, argument| field.argument(argument))
        }
    };

    match &field.description {
        Some(description) => built.description(description),
        None => built,
    }
}

fn system_field(
    name: &str,
    ty: TypeRef,
    get: impl Fn(&ClassRecord) -> GqlValue + Send + Sync + 'static,
) -> Field {
    let get = Arc::new(get);
    Field::new(name, ty, move |ctx| {
        let get = get.clone();
        FieldFuture::new(async move {
            let value = get(record(ctx.parent_value)?);
            Ok(match value {
                GqlValue::Null => None,
                value => Some(FieldValue::value(value)),
            })
        })
    })
}

fn optional_timestamp(value: Option<bson::DateTime>) -> GqlValue {
    value.map_or(GqlValue::Null, |dt| GqlValue::from(iso_timestamp(dt)))
}

/// Object type of a class
pub fn class_object(helper: &ClassHelper) -> Object {
    let object = helper
        .fields()
        .iter()
        .fold(Object::new(helper.name()), |object, field| object.field(declared_field(field)));

    object
        .field(system_field("id", TypeRef::named_nn(TypeRef::ID), |r| {
            GqlValue::from(r.global_id())
        }))
        .field(system_field("mongoId", TypeRef::named_nn(TypeRef::STRING), |r| {
            GqlValue::from(r.mongo_id())
        }))
        .field(system_field("createdAt", TypeRef::named(TypeRef::STRING), |r| {
            optional_timestamp(r.created_at)
        }))
        .field(system_field("updatedAt", TypeRef::named(TypeRef::STRING), |r| {
            optional_timestamp(r.updated_at)
        }))
        .field(system_field("_className", TypeRef::named_nn(TypeRef::STRING), |r| {
            GqlValue::from(r.class_name.clone())
        }))
        .field(system_field("_classVersion", TypeRef::named_nn(TypeRef::INT), |r| {
            GqlValue::from(r.class_version)
        }))
        .implement(NODE_INTERFACE)
}

/// Input values of a class in lookup and mutation inputs
pub fn input_values(helper: &ClassHelper, mode: FieldMode) -> Vec<InputValue> {
    helper
        .fields()
        .iter()
        .map(|field| {
            let input = InputValue::new(&field.name, field.type_ref(mode));
            match &field.description {
                Some(description) => input.description(description),
                None => input,
            }
        })
        .collect()
}
