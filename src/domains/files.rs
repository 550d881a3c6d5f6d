//! Files domain: the `File` node type and the `file(id)` query

use async_graphql::dynamic::{Field, FieldFuture, FieldValue, InputValue, Object, TypeRef};
use async_graphql::Value as GqlValue;

use crate::classes::FILE_CLASS;
use crate::compiler::types::NODE_INTERFACE;
use crate::compiler::{ClassData, NodeRecord};
use crate::error::ResolveError;
use crate::ids::{object_id_from_data, to_global_id};
use crate::schema::{FieldsGetter, TypeArena};
use crate::storage::FileMetadata;
use crate::value::iso_timestamp;

fn file_field(name: &str, ty: TypeRef, get: fn(&FileMetadata) -> GqlValue) -> Field {
    Field::new(name, ty, move |ctx| {
        FieldFuture::new(async move {
            let file = ctx
                .parent_value
                .downcast_ref::<FileMetadata>()
                .ok_or(ResolveError::Downcast("file"))?;
            Ok(match get(file) {
                GqlValue::Null => None,
                value => Some(FieldValue::value(value)),
            })
        })
    })
}

pub fn file_object() -> Object {
    Object::new(FILE_CLASS)
        .description("Stored binary file")
        .field(file_field("id", TypeRef::named_nn(TypeRef::ID), |f| {
            GqlValue::from(to_global_id(FILE_CLASS, &f.id.to_hex()))
        }))
        .field(file_field("mongoId", TypeRef::named_nn(TypeRef::STRING), |f| {
            GqlValue::from(f.id.to_hex())
        }))
        .field(file_field("filename", TypeRef::named_nn(TypeRef::STRING), |f| {
            GqlValue::from(f.filename.clone())
        }))
        .field(file_field("contentType", TypeRef::named(TypeRef::STRING), |f| {
            f.content_type.clone().map_or(GqlValue::Null, GqlValue::from)
        }))
        .field(file_field("length", TypeRef::named(TypeRef::INT), |f| {
            GqlValue::from(f.length)
        }))
        .field(file_field("createdAt", TypeRef::named(TypeRef::STRING), |f| {
            GqlValue::from(iso_timestamp(f.created_at))
        }))
        .field(file_field("updatedAt", TypeRef::named(TypeRef::STRING), |f| {
            GqlValue::from(iso_timestamp(f.updated_at))
        }))
        .implement(NODE_INTERFACE)
}

/// Query fields and types for stored files
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesFields;

impl FieldsGetter for FilesFields {
    fn query_fields(&self) -> Vec<(String, Field)> {
        let file = Field::new("file", TypeRef::named(FILE_CLASS), |ctx| {
            FieldFuture::new(async move {
                let data = ClassData::from_ctx(&ctx)?;
                let id = object_id_from_data(ctx.args.try_get("id")?.string()?)?;
                match data.get_by_id(FILE_CLASS, id).await? {
                    NodeRecord::File(file) => Ok(Some(FieldValue::owned_any(file))),
                    NodeRecord::Class(_) => Err(ResolveError::FileNotFound.into()),
                }
            })
        })
        .argument(InputValue::new("id", TypeRef::named_nn(TypeRef::ID)));

        vec![("file".to_string(), file)]
    }

    fn mutation_fields(&self) -> Vec<(String, Field)> {
        Vec::new()
    }

    fn register_types(&self, arena: &mut TypeArena) {
        arena.register(FILE_CLASS, file_object());
        arena.register_connection(FILE_CLASS);
    }
}
