//! Cursor pagination
//!
//! Array-slice pagination in the usual GraphQL connection shape:
//!
//! ```text
//! <Node>Connection { edges: [<Node>Edge], pageInfo: PageInfo!, totalCount: Int }
//! <Node>Edge       { node: <Node>, cursor: String! }
//! ```
//!
//! Cursors encode an offset into the paginated array, see [`crate::ids`].

use std::any::Any;

use async_graphql::dynamic::{Field, FieldFuture, FieldValue, InputValue, Object, TypeRef};
use async_graphql::Value as GqlValue;

use crate::classes::{connection_type_name, edge_type_name};
use crate::error::ResolveError;
use crate::ids::{cursor_to_offset, offset_to_cursor};
use crate::value::{GqlObject, GqlValueUtils};

pub const PAGE_INFO_TYPE: &str = "PageInfo";

// =============================================================================
// Arguments
// =============================================================================

/// `first/after/last/before` pagination arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionArgs {
    pub first: Option<i64>,
    pub after: Option<String>,
    pub last: Option<i64>,
    pub before: Option<String>,
}

impl ConnectionArgs {
    /// Read pagination arguments, explicit nulls count as absent
    pub fn from_args(args: &GqlObject) -> Self {
        let int = |name: &str| args.get(name).and_then(GqlValueUtils::as_i64);
        let string = |name: &str| args.get(name).and_then(GqlValueUtils::as_str).map(str::to_string);
        Self {
            first: int("first"),
            after: string("after"),
            last: int("last"),
            before: string("before"),
        }
    }

    /// Argument definitions for a connection field
    pub fn arguments() -> Vec<InputValue> {
        vec![
            InputValue::new("after", TypeRef::named(TypeRef::STRING)),
            InputValue::new("first", TypeRef::named(TypeRef::INT)),
            InputValue::new("before", TypeRef::named(TypeRef::STRING)),
            InputValue::new("last", TypeRef::named(TypeRef::INT)),
        ]
    }
}

// =============================================================================
// Pagination
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
    pub has_previous_page: bool,
    pub has_next_page: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge<N> {
    pub cursor: String,
    pub node: N,
}

/// One page of a paginated array
#[derive(Debug, Clone, PartialEq)]
pub struct Connection<N> {
    pub edges: Vec<Edge<N>>,
    pub page_info: PageInfo,
    /// Size of the array before pagination
    pub total_count: Option<usize>,
}

impl<N> Connection<N> {
    /// Replace every node, keeping cursors and page info
    pub fn map_nodes<M>(self, mut f: impl FnMut(N) -> M) -> Connection<M> {
        Connection {
            edges: self
                .edges
                .into_iter()
                .map(|edge| Edge {
                    cursor: edge.cursor,
                    node: f(edge.node),
                })
                .collect(),
            page_info: self.page_info,
            total_count: self.total_count,
        }
    }
}

fn offset_with_default(cursor: Option<&str>, default: i64) -> i64 {
    cursor.and_then(cursor_to_offset).unwrap_or(default)
}

/// Paginate a fully loaded array
pub fn connection_from_slice<N: Clone>(
    items: &[N],
    args: &ConnectionArgs,
) -> Result<Connection<N>, ResolveError> {
    let length = items.len() as i64;
    let before_offset = offset_with_default(args.before.as_deref(), length);
    let after_offset = offset_with_default(args.after.as_deref(), -1);

    let mut start = after_offset.max(-1) + 1;
    let mut end = before_offset.min(length);

    if let Some(first) = args.first {
        if first < 0 {
            return Err(ResolveError::InvalidArgument(
                "Argument \"first\" must be a non-negative integer".to_string(),
            ));
        }
        end = end.min(start.saturating_add(first));
    }
    if let Some(last) = args.last {
        if last < 0 {
            return Err(ResolveError::InvalidArgument(
                "Argument \"last\" must be a non-negative integer".to_string(),
            ));
        }
        start = start.max(end.saturating_sub(last));
    }

    let from = start.clamp(0, length) as usize;
    let to = (end.clamp(0, length) as usize).max(from);
    let edges: Vec<Edge<N>> = items[from..to]
        .iter()
        .enumerate()
        .map(|(i, node)| Edge {
            cursor: offset_to_cursor(from + i),
            node: node.clone(),
        })
        .collect();

    let lower_bound = if args.after.is_some() { after_offset + 1 } else { 0 };
    let upper_bound = if args.before.is_some() { before_offset } else { length };

    let page_info = PageInfo {
        start_cursor: edges.first().map(|e| e.cursor.clone()),
        end_cursor: edges.last().map(|e| e.cursor.clone()),
        has_previous_page: args.last.is_some() && start > lower_bound,
        has_next_page: args.first.is_some() && end < upper_bound,
    };

    Ok(Connection {
        edges,
        page_info,
        total_count: Some(items.len()),
    })
}

// =============================================================================
// GraphQL types
// =============================================================================

fn parent<'a, T: Any>(value: &'a FieldValue<'_>, type_name: &'static str) -> Result<&'a T, ResolveError> {
    value.downcast_ref::<T>().ok_or(ResolveError::Downcast(type_name))
}

/// The shared `PageInfo` type
pub fn page_info_type() -> Object {
    let flag = |name: &'static str, get: fn(&PageInfo) -> bool| {
        Field::new(name, TypeRef::named_nn(TypeRef::BOOLEAN), move |ctx| {
            FieldFuture::new(async move {
                let info = parent::<PageInfo>(ctx.parent_value, PAGE_INFO_TYPE)?;
                Ok(Some(FieldValue::value(get(info))))
            })
        })
    };
    let cursor = |name: &'static str, get: fn(&PageInfo) -> Option<String>| {
        Field::new(name, TypeRef::named(TypeRef::STRING), move |ctx| {
            FieldFuture::new(async move {
                let info = parent::<PageInfo>(ctx.parent_value, PAGE_INFO_TYPE)?;
                Ok(get(info).map(FieldValue::value))
            })
        })
    };

    Object::new(PAGE_INFO_TYPE)
        .description("Information about pagination in a connection.")
        .field(flag("hasNextPage", |i| i.has_next_page))
        .field(flag("hasPreviousPage", |i| i.has_previous_page))
        .field(cursor("startCursor", |i| i.start_cursor.clone()))
        .field(cursor("endCursor", |i| i.end_cursor.clone()))
}

/// `<Node>Connection` over [`Connection<N>`] parent values
pub fn connection_type<N>(node_type: &str) -> Object
where
    N: Clone + Send + Sync + 'static,
{
    let name = connection_type_name(node_type);
    Object::new(&name)
        .description(format!("A connection to a list of {} items.", node_type))
        .field(Field::new("pageInfo", TypeRef::named_nn(PAGE_INFO_TYPE), |ctx| {
            FieldFuture::new(async move {
                let conn = parent::<Connection<N>>(ctx.parent_value, "connection")?;
                Ok(Some(FieldValue::owned_any(conn.page_info.clone())))
            })
        }))
        .field(Field::new("edges", TypeRef::named_list(edge_type_name(node_type)), |ctx| {
            FieldFuture::new(async move {
                let conn = parent::<Connection<N>>(ctx.parent_value, "connection")?;
                let edges = conn.edges.iter().cloned().map(FieldValue::owned_any);
                Ok(Some(FieldValue::list(edges)))
            })
        }))
        .field(Field::new("totalCount", TypeRef::named(TypeRef::INT), |ctx| {
            FieldFuture::new(async move {
                let conn = parent::<Connection<N>>(ctx.parent_value, "connection")?;
                let total = conn.total_count.unwrap_or(0);
                Ok(Some(FieldValue::value(GqlValue::from(total as i64))))
            })
        }))
}

/// `<Node>Edge` over [`Edge<N>`] parent values, `node` is supplied by the caller
pub fn edge_type<N>(node_type: &str, node_field: Field) -> Object
where
    N: Clone + Send + Sync + 'static,
{
    Object::new(edge_type_name(node_type))
        .description("An edge in a connection.")
        .field(node_field)
        .field(Field::new("cursor", TypeRef::named_nn(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move {
                let edge = parent::<Edge<N>>(ctx.parent_value, "edge")?;
                Ok(Some(FieldValue::value(edge.cursor.clone())))
            })
        }))
}
