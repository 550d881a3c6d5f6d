//! Document query evaluation for the in-memory store
//!
//! Supports the operator subset the compiler emits:
//! - equality, with array-contains and `null` matching absent fields
//! - `$in`, `$nin`, `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$exists`
//! - regular expressions, directly or inside `$in`
//! - `$set` / `$unset` updates on dotted paths

use std::cmp::Ordering;

use bson::{Bson, Document};
use regex::RegexBuilder;

use super::{StorageError, StorageResult};

// =============================================================================
// Paths
// =============================================================================

/// Value at a dotted path
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set the value at a dotted path, creating intermediate documents
pub fn set_path(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

// =============================================================================
// Filters
// =============================================================================

/// Whether `doc` satisfies every condition of `query`
pub fn matches(doc: &Document, query: &Document) -> StorageResult<bool> {
    for (path, condition) in query {
        if !matches_condition(lookup(doc, path), condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_operator_document(value: &Bson) -> bool {
    match value {
        Bson::Document(inner) => !inner.is_empty() && inner.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn matches_condition(value: Option<&Bson>, condition: &Bson) -> StorageResult<bool> {
    let operators = match condition {
        Bson::Document(inner) if is_operator_document(condition) => inner,
        _ => return equals(value, condition),
    };

    for (op, arg) in operators {
        let matched = match op.as_str() {
            "$eq" => equals(value, arg)?,
            "$ne" => !equals(value, arg)?,
            "$in" => any_equals(value, arg)?,
            "$nin" => !any_equals(value, arg)?,
            "$gt" => compares(value, arg, |o| o == Ordering::Greater),
            "$gte" => compares(value, arg, |o| o != Ordering::Less),
            "$lt" => compares(value, arg, |o| o == Ordering::Less),
            "$lte" => compares(value, arg, |o| o != Ordering::Greater),
            "$exists" => value.is_some() == truthy(arg),
            other => return Err(StorageError::UnsupportedOperator(other.to_string())),
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => as_f64(other).map_or(true, |n| n != 0.0),
    }
}

fn any_equals(value: Option<&Bson>, candidates: &Bson) -> StorageResult<bool> {
    let Bson::Array(candidates) = candidates else {
        return Err(StorageError::UnsupportedOperator("$in requires an array".to_string()));
    };
    for candidate in candidates {
        if equals(value, candidate)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn equals(value: Option<&Bson>, target: &Bson) -> StorageResult<bool> {
    match target {
        Bson::Null => Ok(match value {
            None | Some(Bson::Null) => true,
            Some(Bson::Array(items)) => items.iter().any(|i| matches!(i, Bson::Null)),
            Some(_) => false,
        }),
        Bson::RegularExpression(re) => {
            let compiled = RegexBuilder::new(&re.pattern)
                .case_insensitive(re.options.contains('i'))
                .multi_line(re.options.contains('m'))
                .dot_matches_new_line(re.options.contains('s'))
                .ignore_whitespace(re.options.contains('x'))
                .build()
                .map_err(|e| StorageError::InvalidPattern {
                    pattern: re.pattern.clone(),
                    reason: e.to_string(),
                })?;
            Ok(match value {
                Some(Bson::String(s)) => compiled.is_match(s),
                Some(Bson::Array(items)) => items
                    .iter()
                    .any(|i| matches!(i, Bson::String(s) if compiled.is_match(s))),
                _ => false,
            })
        }
        _ => Ok(match value {
            None => false,
            Some(Bson::Array(items)) => {
                bson_eq(&Bson::Array(items.clone()), target) || items.iter().any(|i| bson_eq(i, target))
            }
            Some(v) => bson_eq(v, target),
        }),
    }
}

fn compares(value: Option<&Bson>, arg: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    match value {
        Some(Bson::Array(items)) => items
            .iter()
            .any(|i| same_kind_cmp(i, arg).map_or(false, &accept)),
        Some(v) => same_kind_cmp(v, arg).map_or(false, accept),
        None => false,
    }
}

// =============================================================================
// Comparison
// =============================================================================

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Equality with numeric types compared by value
pub fn bson_eq(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| bson_eq(l, r))
        }
        (Bson::Document(x), Bson::Document(y)) => {
            x.len() == y.len()
                && x.iter().zip(y).all(|((lk, lv), (rk, rv))| lk == rk && bson_eq(lv, rv))
        }
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
    }
}

/// Ordering between two values of the same kind, `None` across kinds
fn same_kind_cmp(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        _ => as_f64(a)?.partial_cmp(&as_f64(b)?),
    }
}

fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => 0,
        Some(Bson::Int32(_)) | Some(Bson::Int64(_)) | Some(Bson::Double(_)) => 1,
        Some(Bson::String(_)) | Some(Bson::Symbol(_)) => 2,
        Some(Bson::Document(_)) => 3,
        Some(Bson::Array(_)) => 4,
        Some(Bson::Binary(_)) => 5,
        Some(Bson::ObjectId(_)) => 6,
        Some(Bson::Boolean(_)) => 7,
        Some(Bson::DateTime(_)) => 8,
        Some(Bson::Timestamp(_)) => 9,
        Some(Bson::RegularExpression(_)) => 10,
        Some(_) => 11,
    }
}

/// Total order used for sorting: by type rank first, then by value
pub fn sort_cmp(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Some(Bson::Array(x)), Some(Bson::Array(y))) => {
            for (l, r) in x.iter().zip(y) {
                let ord = sort_cmp(Some(l), Some(r));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Some(x), Some(y)) => same_kind_cmp(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Stable multi-key sort following a `{path: 1|-1}` spec
pub fn sort_documents(docs: &mut [Document], sort: &Document) {
    docs.sort_by(|a, b| {
        for (path, direction) in sort {
            let ord = sort_cmp(lookup(a, path), lookup(b, path));
            let ord = if as_f64(direction).map_or(false, |d| d < 0.0) {
                ord.reverse()
            } else {
                ord
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

// =============================================================================
// Updates and projections
// =============================================================================

/// Apply `$set` / `$unset` operators in place
pub fn apply_update(doc: &mut Document, update: &Document) -> StorageResult<()> {
    for (op, arg) in update {
        let Bson::Document(fields) = arg else {
            return Err(StorageError::UnsupportedOperator(op.clone()));
        };
        match op.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(doc, path, value.clone());
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    unset_path(doc, path);
                }
            }
            other => return Err(StorageError::UnsupportedOperator(other.to_string())),
        }
    }
    Ok(())
}

/// Plain equality conditions of a selector, used to seed upserted documents
pub fn selector_equalities(selector: &Document) -> Document {
    let mut seeded = Document::new();
    for (path, condition) in selector {
        if !path.starts_with('$') && !is_operator_document(condition) {
            set_path(&mut seeded, path, condition.clone());
        }
    }
    seeded
}

/// Inclusion projection. `_id` is kept unless explicitly excluded.
pub fn project(doc: &Document, projection: &Document) -> Document {
    let mut projected = Document::new();
    let keep_id = projection.get("_id").map_or(true, truthy);
    if keep_id {
        if let Some(id) = doc.get("_id") {
            projected.insert("_id", id.clone());
        }
    }
    for (path, include) in projection {
        if path == "_id" || !truthy(include) {
            continue;
        }
        if let Some(value) = lookup(doc, path) {
            set_path(&mut projected, path, value.clone());
        }
    }
    projected
}
