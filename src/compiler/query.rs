//! Query compiler: list, single and raw query fields of a class

use std::sync::Arc;

use async_graphql::dynamic::{Field, FieldFuture, FieldValue, InputValue, TypeRef};
use async_graphql::Value as GqlValue;
use bson::{Bson, Document};
use tracing::debug;

use crate::classes::{connection_type_name, ClassHelper, FieldMode, MIXED_TYPE};
use crate::connection::{connection_from_slice, ConnectionArgs};
use crate::ids::{from_global_id, object_id_from_data, parse_object_id};
use crate::value::{document_to_gql, gql_to_bson, GqlObject};

use super::filter::{filters_to_query, list_arguments, order_to_sort};
use super::record::{ClassData, EdgeNode, NodeRecord};
use super::types::input_values;

/// `<plural>` list query: filtered, sorted, paginated live records
pub fn list_field(helper: Arc<ClassHelper>) -> Field {
    let arguments = ConnectionArgs::arguments()
        .into_iter()
        .chain(list_arguments(&helper))
        .collect::<Vec<_>>();
    let name = helper.list_query_name();
    let ty = TypeRef::named(connection_type_name(helper.name()));

    let field = Field::new(name, ty, move |ctx| {
        let helper = helper.clone();
        FieldFuture::new(async move {
            let data = ClassData::from_ctx(&ctx)?;
            let args = ctx.args.as_index_map();

            let query = filters_to_query(&helper, args.get("filters"))?;
            let sort = order_to_sort(&helper, args.get("orderBy"));
            debug!(class = helper.name(), ?query, ?sort, "list query");

            let ids = data.find_ids(helper.name(), query, sort).await?;
            let page = connection_from_slice(&ids, &ConnectionArgs::from_args(args))?;
            let page_ids: Vec<_> = page.edges.iter().map(|edge| edge.node).collect();
            let mut records = data.many_by_ids(helper.name(), &page_ids).await?;

            let connection = page.map_nodes(|id| {
                records
                    .remove(&id)
                    .map_or(EdgeNode::Missing, |r| EdgeNode::Loaded(NodeRecord::Class(r)))
            });
            Ok(Some(FieldValue::owned_any(connection)))
        })
    });
    arguments
        .into_iter()
        .fold(field, |field, argument| field.argument(argument))
}

/// Id-shaped strings become storage ids: 24 hex characters or a global id
/// wrapping one
fn decode_id_like(raw: &str) -> Bson {
    if raw.len() == 24 {
        if let Some(id) = parse_object_id(raw) {
            return Bson::ObjectId(id);
        }
    }
    match from_global_id(raw) {
        Ok(global) if !global.type_name.is_empty() && global.id.len() == 24 => {
            parse_object_id(&global.id).map_or_else(|| Bson::String(raw.to_string()), Bson::ObjectId)
        }
        _ => Bson::String(raw.to_string()),
    }
}

fn lookup_value(value: &GqlValue) -> Bson {
    match value {
        GqlValue::String(raw) => decode_id_like(raw),
        GqlValue::List(items) => Bson::Array(items.iter().map(lookup_value).collect()),
        other => gql_to_bson(other),
    }
}

/// Equality query over the supplied lookup arguments
pub fn lookup_query(args: &GqlObject) -> Document {
    args.iter()
        .filter(|(name, _)| name.as_str() != "id")
        .map(|(name, value)| (format!("data.{}", name), lookup_value(value)))
        .collect()
}

/// `<single>` query: by id, or first match on the other arguments
pub fn single_field(helper: Arc<ClassHelper>) -> Field {
    let arguments = input_values(&helper, FieldMode::Input);
    let name = helper.single_query_name();

    let field = Field::new(name, TypeRef::named(helper.name()), move |ctx| {
        let helper = helper.clone();
        FieldFuture::new(async move {
            let data = ClassData::from_ctx(&ctx)?;
            let args = ctx.args.as_index_map();

            let record = match args.get("id") {
                Some(GqlValue::String(id)) => {
                    let id = object_id_from_data(id)?;
                    data.get_class_by_id(helper.name(), id).await?
                }
                _ => data.find_one(helper.name(), lookup_query(args)).await?,
            };
            Ok(Some(FieldValue::owned_any(record)))
        })
    })
    .argument(InputValue::new("id", TypeRef::named(TypeRef::ID)));

    arguments
        .into_iter()
        .fold(field, |field, argument| field.argument(argument))
}

/// `<single>Raw(id: ID!)`: stored payload plus the storage id
pub fn raw_field(helper: Arc<ClassHelper>) -> Field {
    let name = format!("{}Raw", helper.single_query_name());
    Field::new(name, TypeRef::named(MIXED_TYPE), move |ctx| {
        let helper = helper.clone();
        FieldFuture::new(async move {
            let data = ClassData::from_ctx(&ctx)?;
            let id = object_id_from_data(ctx.args.try_get("id")?.string()?)?;
            let record = data.get_class_by_id(helper.name(), id).await?;
            Ok(Some(FieldValue::value(document_to_gql(&record.raw()))))
        })
    })
    .argument(InputValue::new("id", TypeRef::named_nn(TypeRef::ID)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql::Name;
    use bson::doc;
    use bson::oid::ObjectId;

    use crate::ids::to_global_id;

    #[test]
    fn test_lookup_query_decodes_ids() {
        let id = ObjectId::new();
        let friend = ObjectId::new();
        let mut args = GqlObject::new();
        args.insert(Name::new("id"), GqlValue::Null);
        args.insert(Name::new("name"), GqlValue::from("User 1"));
        args.insert(Name::new("author"), GqlValue::from(id.to_hex()));
        args.insert(
            Name::new("friends"),
            GqlValue::List(vec![GqlValue::from(to_global_id("User", &friend.to_hex()))]),
        );
        args.insert(Name::new("age"), GqlValue::from(30));
        args.insert(Name::new("nickname"), GqlValue::Null);

        assert_eq!(
            lookup_query(&args),
            doc! {
                "data.name": "User 1",
                "data.author": id,
                "data.friends": [friend],
                "data.age": 30_i64,
                "data.nickname": Bson::Null,
            }
        );
    }

    #[test]
    fn test_plain_strings_are_kept() {
        assert_eq!(decode_id_like("abcdefghijkl"), Bson::String("abcdefghijkl".to_string()));
        assert_eq!(decode_id_like("User 1"), Bson::String("User 1".to_string()));
    }
}
