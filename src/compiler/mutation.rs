//! Mutation compiler
//!
//! Five relay-style mutations per class, each taking `input: <name>Input!` and
//! returning `<name>Payload`:
//!
//! | mutation         | input                          | primary payload field     |
//! |------------------|--------------------------------|---------------------------|
//! | `create<C>`      | fields (ids, optional)         | `created<C>: C`           |
//! | `update<C>`      | fields + `id: ID!`             | `updated<C>: C`           |
//! | `replace<C>`     | fields (as declared) + `id: ID`| `replaced<C>: C`          |
//! | `remove<C>`      | `id: ID!`                      | `removed<C>Id: String`    |
//! | `recover<C>`     | `id: ID!`                      | `recovered<C>: C`         |
//!
//! Every payload also carries `clientMutationId` and the class list query.
//! All of them require [`RequestContext::allow_mutation`].

use std::sync::Arc;

use async_graphql::dynamic::{
    Field, FieldFuture, FieldValue, InputObject, InputValue, Object, ResolverContext, TypeRef,
};
use async_graphql::Value as GqlValue;
use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use futures::future::try_join_all;
use tracing::info;

use crate::classes::{ClassHelper, FieldKind, FieldMode, ScalarKind};
use crate::error::ResolveError;
use crate::ids::object_id_from_data;
use crate::storage::{by_id, UpdateOptions};
use crate::value::{gql_to_bson, mixed_to_bson, GqlObject};

use super::query::list_field;
use super::record::{ClassData, ClassRecord};
use super::types::input_values;

const CLIENT_MUTATION_ID: &str = "clientMutationId";

/// Per-request capabilities, attached as request data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub allow_mutation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Replace,
    Remove,
    Recover,
}

impl MutationKind {
    pub const ALL: [MutationKind; 5] = [
        MutationKind::Create,
        MutationKind::Update,
        MutationKind::Replace,
        MutationKind::Remove,
        MutationKind::Recover,
    ];

    fn verb(self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Replace => "replace",
            MutationKind::Remove => "remove",
            MutationKind::Recover => "recover",
        }
    }

    /// Mutation field name, e.g. `createUser`
    pub fn field_name(self, class_name: &str) -> String {
        format!("{}{}", self.verb(), class_name)
    }

    /// Primary payload field name, e.g. `createdUser` or `removedUserId`
    pub fn payload_field_name(self, class_name: &str) -> String {
        let past = match self {
            MutationKind::Create => "created",
            MutationKind::Update => "updated",
            MutationKind::Replace => "replaced",
            MutationKind::Remove => return format!("removed{}Id", class_name),
            MutationKind::Recover => "recovered",
        };
        format!("{}{}", past, class_name)
    }
}

/// Result of a mutation, the parent value of its payload type
#[derive(Debug, Clone)]
pub struct MutationPayload {
    pub client_mutation_id: Option<String>,
    pub record: Option<ClassRecord>,
    pub removed_id: Option<String>,
}

// =============================================================================
// Input resolution
// =============================================================================

fn check_allowed(ctx: &ResolverContext<'_>, mutation: &str) -> Result<(), ResolveError> {
    let allowed = ctx
        .data_opt::<RequestContext>()
        .map_or(false, |c| c.allow_mutation);
    if allowed {
        Ok(())
    } else {
        Err(ResolveError::MutationNotAllowed(mutation.to_string()))
    }
}

async fn resolve_reference(data: &ClassData, target: &str, value: &GqlValue) -> Result<Bson, ResolveError> {
    match value {
        GqlValue::Null => Ok(Bson::Null),
        GqlValue::String(raw) => Ok(Bson::ObjectId(data.verify_reference(target, raw).await?)),
        other => Err(ResolveError::InvalidArgument(format!(
            "Expected an id referencing \"{}\", got {}",
            target, other
        ))),
    }
}

/// Turn mutation input into the stored `data` payload: relation ids are
/// verified and decoded, everything else is converted as is
pub async fn resolve_input(
    data: &ClassData,
    helper: &ClassHelper,
    input: &GqlObject,
) -> Result<Document, ResolveError> {
    let mut resolved = Document::new();
    for (name, value) in input {
        if name.as_str() == CLIENT_MUTATION_ID || name.as_str() == "id" {
            continue;
        }
        let Some(field) = helper.field(name.as_str()) else {
            continue;
        };
        let bson = match (&field.kind, value) {
            (FieldKind::Relation(target), value) => resolve_reference(data, target, value).await?,
            (FieldKind::RelationList(target), GqlValue::List(items)) => {
                let ids = try_join_all(items.iter().map(|item| resolve_reference(data, target, item))).await?;
                Bson::Array(ids)
            }
            (FieldKind::RelationList(target), GqlValue::String(_)) => {
                Bson::Array(vec![resolve_reference(data, target, value).await?])
            }
            (FieldKind::Scalar(ScalarKind::Mixed), value) => mixed_to_bson(value),
            (FieldKind::List(ScalarKind::Mixed), GqlValue::List(items)) => {
                Bson::Array(items.iter().map(mixed_to_bson).collect())
            }
            (_, value) => gql_to_bson(value),
        };
        resolved.insert(field.name.clone(), bson);
    }
    Ok(resolved)
}

fn input_id(input: &GqlObject) -> Result<Option<ObjectId>, ResolveError> {
    match input.get("id") {
        Some(GqlValue::String(raw)) => Ok(Some(object_id_from_data(raw)?)),
        _ => Ok(None),
    }
}

fn required_id(input: &GqlObject) -> Result<ObjectId, ResolveError> {
    input_id(input)?.ok_or_else(|| ResolveError::InvalidArgument("Argument \"id\" is required".to_string()))
}

fn client_mutation_id(input: &GqlObject) -> Option<String> {
    match input.get(CLIENT_MUTATION_ID) {
        Some(GqlValue::String(id)) => Some(id.clone()),
        _ => None,
    }
}

// =============================================================================
// Operations
// =============================================================================

async fn run(
    kind: MutationKind,
    data: &ClassData,
    helper: &ClassHelper,
    version: i64,
    input: &GqlObject,
) -> Result<MutationPayload, ResolveError> {
    let class = helper.name();
    let model = data.model(class);
    let mut payload = MutationPayload {
        client_mutation_id: client_mutation_id(input),
        record: None,
        removed_id: None,
    };

    match kind {
        MutationKind::Create => {
            let fields = resolve_input(data, helper, input).await?;
            let created = model
                .create(doc! { "data": fields, "_classVersion": version })
                .await?;
            payload.record = Some(data.parse(class, Some(created))?);
        }
        MutationKind::Update => {
            let id = required_id(input)?;
            let fields = resolve_input(data, helper, input).await?;
            let mut set: Document = fields
                .into_iter()
                .map(|(key, value)| (format!("data.{}", key), value))
                .collect();
            set.insert("_classVersion", version);
            model.update(by_id(id), doc! { "$set": set }).await?;
            payload.record = Some(data.get_class_by_id(class, id).await?);
        }
        MutationKind::Replace => {
            let id = input_id(input)?.unwrap_or_else(ObjectId::new);
            let fields = resolve_input(data, helper, input).await?;
            let replaced = model
                .find_one_and_update(
                    by_id(id),
                    doc! { "$set": { "data": fields, "_classVersion": version } },
                    UpdateOptions { new: true, upsert: true },
                )
                .await?;
            payload.record = Some(data.parse(class, replaced)?);
        }
        MutationKind::Remove => {
            let id = required_id(input)?;
            let matched = model
                .update(by_id(id), doc! { "$set": { "_deleted": true } })
                .await?;
            if matched == 0 {
                return Err(ResolveError::NotFound(class.to_string()));
            }
            payload.removed_id = Some(id.to_hex());
        }
        MutationKind::Recover => {
            let id = required_id(input)?;
            let matched = model
                .update(by_id(id), doc! { "$set": { "_deleted": false } })
                .await?;
            if matched == 0 {
                return Err(ResolveError::NotFound(class.to_string()));
            }
            payload.record = Some(data.get_class_by_id(class, id).await?);
        }
    }

    info!(mutation = %kind.field_name(class), "mutation applied");
    Ok(payload)
}

// =============================================================================
// Types and fields
// =============================================================================

pub fn input_type_name(kind: MutationKind, class_name: &str) -> String {
    format!("{}Input", kind.field_name(class_name))
}

pub fn payload_type_name(kind: MutationKind, class_name: &str) -> String {
    format!("{}Payload", kind.field_name(class_name))
}

fn payload<'a>(value: &'a FieldValue<'_>) -> Result<&'a MutationPayload, ResolveError> {
    value
        .downcast_ref::<MutationPayload>()
        .ok_or(ResolveError::Downcast("mutation payload"))
}

/// `<mutation>Input`
pub fn input_object(kind: MutationKind, helper: &ClassHelper) -> InputObject {
    let class = helper.name();
    let fields = match kind {
        MutationKind::Create => input_values(helper, FieldMode::Input),
        MutationKind::Update => {
            let mut fields = input_values(helper, FieldMode::Input);
            fields.push(InputValue::new("id", TypeRef::named_nn(TypeRef::ID)));
            fields
        }
        MutationKind::Replace => {
            let mut fields = input_values(helper, FieldMode::StrictInput);
            fields.push(InputValue::new("id", TypeRef::named(TypeRef::ID)));
            fields
        }
        MutationKind::Remove | MutationKind::Recover => {
            vec![InputValue::new("id", TypeRef::named_nn(TypeRef::ID))]
        }
    };
    fields
        .into_iter()
        .chain([InputValue::new(CLIENT_MUTATION_ID, TypeRef::named(TypeRef::STRING))])
        .fold(InputObject::new(input_type_name(kind, class)), |input, field| input.field(field))
}

/// `<mutation>Payload`
pub fn payload_object(kind: MutationKind, helper: Arc<ClassHelper>) -> Object {
    let class = helper.name().to_string();
    let primary = kind.payload_field_name(&class);

    let primary = if kind == MutationKind::Remove {
        Field::new(primary, TypeRef::named(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move {
                let payload = payload(ctx.parent_value)?;
                Ok(payload.removed_id.clone().map(FieldValue::value))
            })
        })
    } else {
        Field::new(primary, TypeRef::named(&class), |ctx| {
            FieldFuture::new(async move {
                let payload = payload(ctx.parent_value)?;
                Ok(payload.record.clone().map(FieldValue::owned_any))
            })
        })
    };

    Object::new(payload_type_name(kind, &class))
        .field(Field::new(CLIENT_MUTATION_ID, TypeRef::named(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move {
                let payload = payload(ctx.parent_value)?;
                Ok(payload.client_mutation_id.clone().map(FieldValue::value))
            })
        }))
        .field(primary)
        .field(list_field(helper))
}

/// The mutation root field
pub fn mutation_field(kind: MutationKind, helper: Arc<ClassHelper>, version: i64) -> Field {
    let class = helper.name().to_string();
    let name = kind.field_name(&class);
    let mutation = name.clone();

    Field::new(name, TypeRef::named(payload_type_name(kind, &class)), move |ctx| {
        let helper = helper.clone();
        let mutation = mutation.clone();
        FieldFuture::new(async move {
            check_allowed(&ctx, &mutation)?;
            let data = ClassData::from_ctx(&ctx)?;
            let input = match ctx.args.as_index_map().get("input") {
                Some(GqlValue::Object(input)) => input.clone(),
                _ => GqlObject::new(),
            };
            let payload = run(kind, &data, &helper, version, &input).await?;
            Ok(Some(FieldValue::owned_any(payload)))
        })
    })
    .argument(InputValue::new("input", TypeRef::named_nn(input_type_name(kind, &class))))
}
