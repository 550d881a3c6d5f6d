//! List query arguments: filter inputs, sort enum and their translation into
//! storage queries.
//!
//! ```text
//! filters: { age: { lt: 42 }, name: { regexp: "/^User/i" } }
//!   => { "data.age": { "$lt": 42 }, "data.name": { "$in": [/^User/i] } }
//!
//! orderBy: [NAME_DESC, CREATED_AT_ASC]
//!   => { "data.name": -1, "createdAt": 1 }
//! ```

use async_graphql::dynamic::{Enum, InputObject, InputValue, TypeRef};
use async_graphql::Value as GqlValue;
use bson::{Bson, Document, Regex as BsonRegex};

use crate::classes::{ClassField, ClassHelper, ScalarKind};
use crate::error::ResolveError;
use crate::names::{screaming_snake_case, upper_first};
use crate::value::{gql_to_bson, GqlObject};

use super::record::reference_id;

/// Filter operators per field kind, in declaration order
fn operators(kind: ScalarKind) -> &'static [&'static str] {
    match kind {
        ScalarKind::Boolean => &["eq"],
        ScalarKind::Relation => &["in", "eq"],
        ScalarKind::String => &["in", "eq", "regexp"],
        ScalarKind::Int | ScalarKind::Float => &["in", "eq", "gt", "gte", "lt", "lte"],
        ScalarKind::Mixed => &[],
    }
}

fn filter_suffix(kind: ScalarKind) -> Option<&'static str> {
    match kind {
        ScalarKind::Boolean => Some("Boolean"),
        ScalarKind::Relation => Some("ObjectID"),
        ScalarKind::String => Some("String"),
        ScalarKind::Int | ScalarKind::Float => Some("Number"),
        ScalarKind::Mixed => None,
    }
}

// =============================================================================
// Types
// =============================================================================

/// `filter<Plural>With`
pub fn filter_type_name(helper: &ClassHelper) -> String {
    format!("filter{}With", helper.plural_type_name())
}

/// `filter<Plural>With<Field><Kind>`, `None` for fields that cannot be filtered
pub fn field_filter_type_name(helper: &ClassHelper, field: &ClassField) -> Option<String> {
    filter_suffix(field.scalar()).map(|suffix| {
        format!("{}{}{}", filter_type_name(helper), upper_first(&field.name), suffix)
    })
}

/// `order<Plural>By`
pub fn order_type_name(helper: &ClassHelper) -> String {
    format!("order{}By", helper.plural_type_name())
}

fn field_filter_input(type_name: &str, field: &ClassField) -> InputObject {
    let kind = field.scalar();
    let scalar = if kind.is_numeric() { TypeRef::FLOAT } else { kind.type_name() };
    operators(kind).iter().fold(InputObject::new(type_name), |input, op| {
        let ty = match *op {
            "in" => TypeRef::named_list(scalar),
            "regexp" => TypeRef::named(TypeRef::STRING),
            _ => TypeRef::named(scalar),
        };
        input.field(InputValue::new(*op, ty))
    })
}

/// Named filter input types of a class, `None` when no field can be filtered
pub fn filter_inputs(helper: &ClassHelper) -> Option<Vec<(String, InputObject)>> {
    let root_name = filter_type_name(helper);
    let mut root = InputObject::new(&root_name);
    let mut inputs = Vec::new();
    for field in helper.filterable_fields() {
        if let Some(type_name) = field_filter_type_name(helper, field) {
            root = root.field(InputValue::new(&field.name, TypeRef::named(&type_name)));
            let input = field_filter_input(&type_name, field);
            inputs.push((type_name, input));
        }
    }
    if inputs.is_empty() {
        return None;
    }
    inputs.push((root_name, root));
    Some(inputs)
}

/// Sort enum members with the sort fragment each one stands for
pub fn order_items(helper: &ClassHelper) -> Vec<(String, String, i32)> {
    let keys = [
        ("createdAt".to_string(), "createdAt".to_string()),
        ("updatedAt".to_string(), "updatedAt".to_string()),
    ]
    .into_iter()
    .chain(
        helper
            .sortable_fields_name()
            .into_iter()
            .map(|name| (name.to_string(), format!("data.{}", name))),
    );

    keys.flat_map(|(name, key)| {
        [
            (screaming_snake_case(&format!("{}Asc", name)), key.clone(), 1),
            (screaming_snake_case(&format!("{}Desc", name)), key, -1),
        ]
    })
    .collect()
}

pub fn order_enum(helper: &ClassHelper) -> Enum {
    order_items(helper)
        .into_iter()
        .fold(Enum::new(order_type_name(helper)), |e, (item, _, _)| e.item(item))
}

// =============================================================================
// Translation
// =============================================================================

/// Parse a `/pattern/flags` literal into a stored pattern. Only the shape is
/// checked here, the pattern itself is compiled by the storage collaborator.
pub fn parse_regexp(literal: &str, class: &str, field: &str) -> Result<BsonRegex, ResolveError> {
    let invalid = || ResolveError::InvalidRegExp {
        class: class.to_string(),
        field: field.to_string(),
    };
    let (pattern, flags) = literal
        .strip_prefix('/')
        .and_then(|rest| rest.rsplit_once('/'))
        .ok_or_else(invalid)?;
    if !flags.chars().all(|f| f.is_alphanumeric() || f == '_') {
        return Err(invalid());
    }

    let mut options: Vec<char> = flags.chars().collect();
    options.sort_unstable();
    Ok(BsonRegex {
        pattern: pattern.to_string(),
        options: options.into_iter().collect(),
    })
}

fn filter_value(field: &ClassField, value: &GqlValue) -> Bson {
    if field.scalar() == ScalarKind::Relation {
        if let GqlValue::String(raw) = value {
            let raw = Bson::String(raw.clone());
            return reference_id(&raw).map_or(raw, Bson::ObjectId);
        }
    }
    gql_to_bson(value)
}

fn field_condition(helper: &ClassHelper, field: &ClassField, filter: &GqlObject) -> Result<Document, ResolveError> {
    let mut filter = filter.clone();

    if let Some(literal) = filter.shift_remove("regexp") {
        if let GqlValue::String(literal) = literal {
            let pattern = parse_regexp(&literal, helper.name(), &field.name)?;
            let mut condition = condition_without_eq(field, &filter);
            condition.insert("$in", vec![Bson::RegularExpression(pattern)]);
            return Ok(condition);
        }
    }

    let mut condition = condition_without_eq(field, &filter);
    if let Some(eq) = filter.get("eq").filter(|v| !matches!(v, GqlValue::Null)) {
        let mut candidates = vec![filter_value(field, eq)];
        if matches!(eq, GqlValue::Boolean(false)) {
            candidates.push(Bson::Null);
        }
        condition.insert("$in", candidates);
    }
    Ok(condition)
}

fn condition_without_eq(field: &ClassField, filter: &GqlObject) -> Document {
    let mut condition = Document::new();
    for (op, value) in filter {
        if op.as_str() == "eq" || matches!(value, GqlValue::Null) {
            continue;
        }
        let value = match value {
            GqlValue::List(items) => Bson::Array(items.iter().map(|v| filter_value(field, v)).collect()),
            other => filter_value(field, other),
        };
        condition.insert(format!("${}", op), value);
    }
    condition
}

/// Storage query for the `filters` argument of a list query
pub fn filters_to_query(helper: &ClassHelper, filters: Option<&GqlValue>) -> Result<Document, ResolveError> {
    let mut query = Document::new();
    let Some(GqlValue::Object(filters)) = filters else {
        return Ok(query);
    };
    for (name, filter) in filters {
        let GqlValue::Object(filter) = filter else {
            continue;
        };
        let field = helper
            .field(name.as_str())
            .ok_or_else(|| ResolveError::InvalidArgument(format!("Unknown filter \"{}\"", name)))?;
        let condition = field_condition(helper, field, filter)?;
        if !condition.is_empty() {
            query.insert(format!("data.{}", field.name), condition);
        }
    }
    Ok(query)
}

/// Composite sort spec for the `orderBy` argument. Later entries win.
pub fn order_to_sort(helper: &ClassHelper, order_by: Option<&GqlValue>) -> Option<Document> {
    let items: Vec<&GqlValue> = match order_by {
        None | Some(GqlValue::Null) => return None,
        Some(GqlValue::List(items)) => items.iter().collect(),
        Some(single) => vec![single],
    };
    let known = order_items(helper);

    let mut sort = Document::new();
    for item in items {
        let name = match item {
            GqlValue::Enum(name) => name.as_str(),
            GqlValue::String(name) => name.as_str(),
            _ => continue,
        };
        if let Some((_, key, direction)) = known.iter().find(|(n, _, _)| n == name) {
            sort.insert(key.clone(), *direction);
        }
    }
    (!sort.is_empty()).then_some(sort)
}

/// `filters` and `orderBy` list arguments, `filters` only when something is filterable
pub fn list_arguments(helper: &ClassHelper) -> Vec<InputValue> {
    let mut arguments = Vec::new();
    if filter_inputs(helper).is_some() {
        arguments.push(InputValue::new("filters", TypeRef::named(filter_type_name(helper))));
    }
    arguments.push(InputValue::new("orderBy", TypeRef::named_list(order_type_name(helper))));
    arguments
}
