//! Identifier codec
//!
//! Clients see opaque global ids (`base64("<Type>:<rawId>")`); storage uses
//! [`ObjectId`]s. Everything that accepts an id from a client goes through
//! [`object_id_from_data`], which accepts either form.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bson::oid::ObjectId;
use thiserror::Error;

const CURSOR_PREFIX: &str = "arrayconnection:";

/// Identifier decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("Invalid id \"{0}\"")]
    Invalid(String),
}

/// A decoded global id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalId {
    pub type_name: String,
    pub id: String,
}

/// Encode a `(type, raw id)` pair into an opaque global id
pub fn to_global_id(type_name: &str, id: &str) -> String {
    STANDARD.encode(format!("{}:{}", type_name, id))
}

/// Decode an opaque global id into its type and raw id
pub fn from_global_id(global_id: &str) -> Result<GlobalId, IdError> {
    let invalid = || IdError::Invalid(global_id.to_string());
    let bytes = STANDARD.decode(global_id).map_err(|_| invalid())?;
    let decoded = String::from_utf8(bytes).map_err(|_| invalid())?;
    let (type_name, id) = decoded.split_once(':').ok_or_else(invalid)?;
    Ok(GlobalId {
        type_name: type_name.to_string(),
        id: id.to_string(),
    })
}

/// Parse a raw storage id: 24 hex characters or any 12-byte string
pub fn parse_object_id(raw: &str) -> Option<ObjectId> {
    if raw.len() == 24 {
        if let Ok(oid) = ObjectId::parse_str(raw) {
            return Some(oid);
        }
    }
    let bytes: [u8; 12] = raw.as_bytes().try_into().ok()?;
    Some(ObjectId::from_bytes(bytes))
}

/// Decode a client-supplied id: hex storage id, then global id, then a
/// 12-byte raw id
pub fn object_id_from_data(data: &str) -> Result<ObjectId, IdError> {
    if data.len() == 24 {
        if let Ok(oid) = ObjectId::parse_str(data) {
            return Ok(oid);
        }
    }
    match from_global_id(data) {
        Ok(global) => parse_object_id(&global.id).ok_or_else(|| IdError::Invalid(data.to_string())),
        Err(e) => parse_object_id(data).ok_or(e),
    }
}

/// Cursor for the item at `offset` of a paginated array
pub fn offset_to_cursor(offset: usize) -> String {
    STANDARD.encode(format!("{}{}", CURSOR_PREFIX, offset))
}

/// Offset encoded in a cursor, `None` when the cursor is not one of ours
pub fn cursor_to_offset(cursor: &str) -> Option<i64> {
    let bytes = STANDARD.decode(cursor).ok()?;
    let decoded = String::from_utf8(bytes).ok()?;
    decoded.strip_prefix(CURSOR_PREFIX)?.parse().ok()
}
