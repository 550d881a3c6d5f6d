//! Project documents and the `_project` query
//!
//! A project owns the class definitions a schema is compiled from:
//!
//! ```json
//! {
//!   "_id": "5a0d3ae7b3e6f1d4d8a6b2c0",
//!   "name": "Demo",
//!   "classes": { "version": 3, "definitions": { "User": { "name": "string" } } }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use async_graphql::dynamic::{Field, FieldFuture, FieldValue, Object, TypeRef};
use async_graphql::Value as GqlValue;
use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::classes::MIXED_TYPE;
use crate::error::{ResolveError, Result};
use crate::ids::to_global_id;
use crate::schema::{FieldsGetter, TypeArena};
use crate::value::json_to_gql;

const PROJECT_TYPE: &str = "Project";
const PROJECT_CLASSES_TYPE: &str = "ProjectClasses";

/// Class definitions of a project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectClasses {
    /// Stamped on every record written through the compiled schema
    #[serde(default)]
    pub version: i64,

    /// Class name -> definition
    #[serde(default)]
    pub definitions: serde_json::Value,
}

/// Tenant owning a compiled schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(rename = "_id")]
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_name: Option<String>,

    /// Explicit content hash, computed from the definitions when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<ProjectClasses>,
}

impl Project {
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Class definitions, `null` when the project has none
    pub fn definitions(&self) -> &serde_json::Value {
        static EMPTY: serde_json::Value = serde_json::Value::Null;
        self.classes.as_ref().map_or(&EMPTY, |c| &c.definitions)
    }

    pub fn version(&self) -> i64 {
        self.classes.as_ref().map_or(0, |c| c.version)
    }

    /// Cache key of the compiled schema
    pub fn schema_hash(&self) -> Checksum {
        match &self.hash {
            Some(hash) => Checksum::from(hash.as_str()),
            None => Checksum::from_json(self.definitions()),
        }
    }
}

// =============================================================================
// Domain
// =============================================================================

fn project_field(name: &str, ty: TypeRef, get: fn(&Project) -> GqlValue) -> Field {
    Field::new(name, ty, move |ctx| {
        FieldFuture::new(async move {
            let project = ctx
                .parent_value
                .downcast_ref::<Project>()
                .ok_or(ResolveError::Downcast("project"))?;
            Ok(match get(project) {
                GqlValue::Null => None,
                value => Some(FieldValue::value(value)),
            })
        })
    })
}

fn optional(value: &Option<String>) -> GqlValue {
    value.clone().map_or(GqlValue::Null, GqlValue::from)
}

fn classes_object() -> Object {
    Object::new(PROJECT_CLASSES_TYPE)
        .field(Field::new("version", TypeRef::named_nn(TypeRef::INT), |ctx| {
            FieldFuture::new(async move {
                let classes = ctx
                    .parent_value
                    .downcast_ref::<ProjectClasses>()
                    .ok_or(ResolveError::Downcast("project classes"))?;
                Ok(Some(FieldValue::value(classes.version)))
            })
        }))
        .field(Field::new("definitions", TypeRef::named(MIXED_TYPE), |ctx| {
            FieldFuture::new(async move {
                let classes = ctx
                    .parent_value
                    .downcast_ref::<ProjectClasses>()
                    .ok_or(ResolveError::Downcast("project classes"))?;
                Ok(Some(FieldValue::value(json_to_gql(&classes.definitions))))
            })
        }))
}

fn project_object() -> Object {
    Object::new(PROJECT_TYPE)
        .field(project_field("id", TypeRef::named_nn(TypeRef::ID), |p| {
            GqlValue::from(to_global_id(PROJECT_TYPE, &p.id))
        }))
        .field(project_field("mongoId", TypeRef::named_nn(TypeRef::STRING), |p| {
            GqlValue::from(p.id.clone())
        }))
        .field(project_field("name", TypeRef::named(TypeRef::STRING), |p| {
            GqlValue::from(p.name.clone())
        }))
        .field(project_field("shortName", TypeRef::named(TypeRef::STRING), |p| {
            optional(&p.short_name)
        }))
        .field(project_field("uniqueName", TypeRef::named(TypeRef::STRING), |p| {
            optional(&p.unique_name)
        }))
        .field(project_field("hash", TypeRef::named(TypeRef::STRING), |p| {
            GqlValue::from(p.schema_hash().to_string())
        }))
        .field(Field::new("classes", TypeRef::named(PROJECT_CLASSES_TYPE), |ctx| {
            FieldFuture::new(async move {
                let project = ctx
                    .parent_value
                    .downcast_ref::<Project>()
                    .ok_or(ResolveError::Downcast("project"))?;
                Ok(project.classes.clone().map(FieldValue::owned_any))
            })
        }))
}

/// `_project` query over the project attached to the request
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectFields;

impl FieldsGetter for ProjectFields {
    fn query_fields(&self) -> Vec<(String, Field)> {
        let field = Field::new("_project", TypeRef::named(PROJECT_TYPE), |ctx| {
            FieldFuture::new(async move {
                let project = ctx.data::<Arc<Project>>()?;
                Ok(Some(FieldValue::owned_any(project.as_ref().clone())))
            })
        });
        vec![("_project".to_string(), field)]
    }

    fn mutation_fields(&self) -> Vec<(String, Field)> {
        Vec::new()
    }

    fn register_types(&self, arena: &mut TypeArena) {
        arena.register(PROJECT_TYPE, project_object());
        arena.register(PROJECT_CLASSES_TYPE, classes_object());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_from_json() {
        let project = Project::from_json(json!({
            "_id": "5a0d3ae7b3e6f1d4d8a6b2c0",
            "name": "Demo",
            "shortName": "demo",
            "classes": {"version": 3, "definitions": {"User": {"name": "string"}}}
        }))
        .unwrap();
        assert_eq!(project.short_name.as_deref(), Some("demo"));
        assert_eq!(project.version(), 3);
        assert_eq!(project.definitions()["User"]["name"], "string");
    }

    #[test]
    fn test_schema_hash_follows_definitions() {
        let mut project = Project::from_json(json!({
            "_id": "p1",
            "name": "Demo",
            "classes": {"definitions": {"User": {"name": "string"}}}
        }))
        .unwrap();
        let first = project.schema_hash();
        assert_eq!(first, Checksum::from_json(&json!({"User": {"name": "string"}})));

        if let Some(classes) = project.classes.as_mut() {
            classes.definitions = json!({"User": {"name": "string", "age": "int"}});
        }
        assert_ne!(project.schema_hash(), first);

        project.hash = Some("pinned".to_string());
        assert_eq!(project.schema_hash().as_str(), "pinned");
    }

    #[test]
    fn test_project_without_classes() {
        let project = Project::from_json(json!({"_id": "p1", "name": "Empty"})).unwrap();
        assert!(project.definitions().is_null());
        assert_eq!(project.version(), 0);
    }
}
