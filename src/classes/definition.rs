//! Raw class definitions
//!
//! A project stores its classes as a JSON map from class name to definition.
//! A definition is either structured:
//!
//! ```json
//! { "fields": { "title": "string" }, "options": { "plural": "News" } }
//! ```
//!
//! or a bare field map when no options are needed:
//!
//! ```json
//! { "title": "string", "author": { "type": "relation", "ref": "user" } }
//! ```

use serde::Deserialize;

use crate::error::DefinitionError;

/// Field declaration as written by the author
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSpec {
    /// Bare type token, e.g. `"string"`
    Token(String),
    /// `{type, ref?, required?, description?}`
    Detailed(FieldOptions),
    /// Single-element array: list of scalars or to-many relation
    List(Vec<FieldSpec>),
}

impl FieldSpec {
    /// Classify a raw declaration by its JSON shape, `None` when it has none
    /// of the accepted shapes. Array length is checked by the registry.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(token) => Some(FieldSpec::Token(token.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(FieldSpec::from_json)
                .collect::<Option<Vec<_>>>()
                .map(FieldSpec::List),
            serde_json::Value::Object(_) => serde_json::from_value(value.clone())
                .ok()
                .map(FieldSpec::Detailed),
            _ => None,
        }
    }
}

/// Object form of a field declaration
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct FieldOptions {
    #[serde(rename = "type", default)]
    pub type_name: Option<String>,

    #[serde(rename = "ref", default)]
    pub reference: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub description: Option<String>,
}

/// One declared class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDefinition {
    pub name: String,
    pub plural: Option<String>,
    /// Fields in declaration order
    pub fields: Vec<(String, FieldSpec)>,
}

impl ClassDefinition {
    /// Parse a single definition in either form
    pub fn from_json(name: &str, value: &serde_json::Value) -> Result<Self, DefinitionError> {
        let object = value.as_object().ok_or_else(|| {
            DefinitionError::InvalidFormat(format!("class \"{}\" must be an object", name))
        })?;

        let structured = object.contains_key("fields") || object.contains_key("options");
        let (fields, plural) = if structured {
            let plural = object
                .get("options")
                .and_then(|o| o.get("plural"))
                .and_then(|p| p.as_str())
                .map(str::to_string);
            let fields = match object.get("fields") {
                None | Some(serde_json::Value::Null) => serde_json::Map::new(),
                Some(serde_json::Value::Object(fields)) => fields.clone(),
                Some(_) => {
                    return Err(DefinitionError::InvalidFormat(format!(
                        "fields of class \"{}\" must be an object",
                        name
                    )))
                }
            };
            (fields, plural)
        } else {
            (object.clone(), None)
        };

        let fields = fields
            .into_iter()
            .map(|(field, spec)| match FieldSpec::from_json(&spec) {
                Some(spec) => Ok((field, spec)),
                None => Err(DefinitionError::UnparsableField {
                    field,
                    class: name.to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            plural,
            fields,
        })
    }
}

/// Parse every class of a definitions map, keeping document order
pub fn parse_definitions(definitions: &serde_json::Value) -> Result<Vec<ClassDefinition>, DefinitionError> {
    match definitions {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::Object(classes) => classes
            .iter()
            .map(|(name, value)| ClassDefinition::from_json(name, value))
            .collect(),
        _ => Err(DefinitionError::InvalidFormat(
            "class definitions must be an object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_field_map() {
        let def = ClassDefinition::from_json("user", &json!({"name": "string", "age": "int"})).unwrap();
        assert_eq!(def.plural, None);
        assert_eq!(def.fields.len(), 2);
        assert_eq!(def.fields[0], ("name".to_string(), FieldSpec::Token("string".to_string())));
    }

    #[test]
    fn test_structured_definition() {
        let def = ClassDefinition::from_json(
            "news",
            &json!({
                "fields": {
                    "author": {"type": "relation", "ref": "user", "description": "Who wrote it"},
                    "tags": ["string"]
                },
                "options": {"plural": "news list"}
            }),
        )
        .unwrap();
        assert_eq!(def.plural.as_deref(), Some("news list"));
        match &def.fields[0].1 {
            FieldSpec::Detailed(options) => {
                assert_eq!(options.type_name.as_deref(), Some("relation"));
                assert_eq!(options.reference.as_deref(), Some("user"));
                assert_eq!(options.description.as_deref(), Some("Who wrote it"));
                assert!(!options.required);
            }
            other => panic!("Expected Detailed, got {:?}", other),
        }
        assert_eq!(def.fields[1].1, FieldSpec::List(vec![FieldSpec::Token("string".to_string())]));
    }

    #[test]
    fn test_array_specs_keep_their_shape() {
        let def = ClassDefinition::from_json(
            "user",
            &json!({"one": ["string"], "two": ["string", "int"], "none": []}),
        )
        .unwrap();
        assert_eq!(def.fields[0].1, FieldSpec::List(vec![FieldSpec::Token("string".to_string())]));
        assert_eq!(
            def.fields[1].1,
            FieldSpec::List(vec![
                FieldSpec::Token("string".to_string()),
                FieldSpec::Token("int".to_string())
            ])
        );
        assert_eq!(def.fields[2].1, FieldSpec::List(Vec::new()));
    }

    #[test]
    fn test_options_without_fields() {
        let def = ClassDefinition::from_json("tag", &json!({"options": {"plural": "tagz"}})).unwrap();
        assert!(def.fields.is_empty());
        assert_eq!(def.plural.as_deref(), Some("tagz"));
    }

    #[test]
    fn test_unparsable_field() {
        let err = ClassDefinition::from_json("user", &json!({"age": 42})).unwrap_err();
        assert_eq!(err.to_string(), "Parse error: Cannot parse field \"age\" of class \"user\"");
    }

    #[test]
    fn test_definitions_keep_order() {
        let defs = parse_definitions(&json!({"Zebra": {}, "Apple": {}, "Mango": {}})).unwrap();
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Zebra", "Apple", "Mango"]);
    }
}
