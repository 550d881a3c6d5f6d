//! Conversions between GraphQL values and stored BSON

use async_graphql::dynamic::indexmap::IndexMap;
use async_graphql::{Name, Number, Value as GqlValue};
use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Document};
use chrono::SecondsFormat;

/// Object value as received in arguments and inputs
pub type GqlObject = IndexMap<Name, GqlValue>;

pub trait GqlValueUtils {
    fn as_i64(&self) -> Option<i64>;
    fn as_str(&self) -> Option<&str>;
    fn as_list(&self) -> Option<&Vec<GqlValue>>;
    fn as_object(&self) -> Option<&GqlObject>;
}

impl GqlValueUtils for GqlValue {
    fn as_i64(&self) -> Option<i64> {
        if let GqlValue::Number(n) = self {
            n.as_i64()
        } else {
            None
        }
    }

    fn as_str(&self) -> Option<&str> {
        if let GqlValue::String(s) = self {
            Some(s)
        } else {
            None
        }
    }

    fn as_list(&self) -> Option<&Vec<GqlValue>> {
        if let GqlValue::List(a) = self {
            Some(a)
        } else {
            None
        }
    }

    fn as_object(&self) -> Option<&GqlObject> {
        if let GqlValue::Object(o) = self {
            Some(o)
        } else {
            None
        }
    }
}

/// Argument or input value as stored in a document
pub fn gql_to_bson(value: &GqlValue) -> Bson {
    match value {
        GqlValue::Null => Bson::Null,
        GqlValue::Number(n) => match n.as_i64() {
            Some(i) => Bson::Int64(i),
            None => Bson::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        GqlValue::String(s) => Bson::String(s.clone()),
        GqlValue::Boolean(b) => Bson::Boolean(*b),
        GqlValue::Binary(bytes) => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: bytes.to_vec(),
        }),
        GqlValue::Enum(name) => Bson::String(name.to_string()),
        GqlValue::List(items) => Bson::Array(items.iter().map(gql_to_bson).collect()),
        GqlValue::Object(fields) => Bson::Document(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), gql_to_bson(v)))
                .collect(),
        ),
    }
}

/// Mixed field input: strings holding a JSON object or array are parsed
pub fn mixed_to_bson(value: &GqlValue) -> Bson {
    if let GqlValue::String(raw) = value {
        let trimmed = raw.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(raw) {
                if let Ok(bson) = Bson::try_from(json) {
                    return bson;
                }
            }
        }
    }
    gql_to_bson(value)
}

/// Stored value as returned to clients
pub fn bson_to_gql(value: &Bson) -> GqlValue {
    match value {
        Bson::Null | Bson::Undefined => GqlValue::Null,
        Bson::Double(n) => Number::from_f64(*n).map_or(GqlValue::Null, GqlValue::Number),
        Bson::Int32(n) => GqlValue::Number(Number::from(*n)),
        Bson::Int64(n) => GqlValue::Number(Number::from(*n)),
        Bson::String(s) => GqlValue::String(s.clone()),
        Bson::Boolean(b) => GqlValue::Boolean(*b),
        Bson::ObjectId(oid) => GqlValue::String(oid.to_hex()),
        Bson::DateTime(dt) => GqlValue::String(iso_timestamp(*dt)),
        Bson::Array(items) => GqlValue::List(items.iter().map(bson_to_gql).collect()),
        Bson::Document(doc) => document_to_gql(doc),
        Bson::RegularExpression(re) => GqlValue::String(format!("/{}/{}", re.pattern, re.options)),
        other => GqlValue::String(other.to_string()),
    }
}

pub fn document_to_gql(doc: &Document) -> GqlValue {
    GqlValue::Object(
        doc.iter()
            .map(|(k, v)| (Name::new(k), bson_to_gql(v)))
            .collect(),
    )
}

/// JSON value as a GraphQL value, used for definitions and other free-form data
pub fn json_to_gql(value: &serde_json::Value) -> GqlValue {
    GqlValue::from_json(value.clone()).unwrap_or(GqlValue::Null)
}

/// ISO-8601 with millisecond precision, e.g. `2017-11-16T10:00:00.000Z`
pub fn iso_timestamp(value: bson::DateTime) -> String {
    chrono::DateTime::from_timestamp_millis(value.timestamp_millis())
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}
