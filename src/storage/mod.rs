//! Storage collaborator interface
//!
//! The compiler never talks to a database directly. It asks a [`Storage`] for
//! a [`ClassModel`] per class and issues document queries against it:
//!
//! - `find(query, {projection, sort})` / `find_one(query)`
//! - `create(record)`
//! - `update(selector, ops)` for partial updates
//! - `find_one_and_update(selector, ops, {new, upsert})`
//!
//! Queries, sort specs and update operators are plain BSON documents using
//! the `$`-prefixed operator vocabulary (`$in`, `$gt`, `$set`, ...).
//!
//! Every class record is persisted as:
//!
//! ```text
//! { _id, data: {...declared fields}, _classVersion, _deleted, createdAt, updatedAt }
//! ```

pub mod matcher;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{doc, Document};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryStorage;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Storage collaborator errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Unsupported operator \"{0}\"")]
    UnsupportedOperator(String),

    #[error("Invalid regular expression /{pattern}/: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid stored record: {0}")]
    InvalidRecord(#[from] bson::de::Error),

    #[error("Invalid fixture: {0}")]
    InvalidFixture(String),
}

// =============================================================================
// Records
// =============================================================================

/// A class record as persisted by the storage collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    /// Declared field values, keyed by camel-cased field name
    #[serde(default)]
    pub data: Document,

    /// Class definitions version used for the last write
    #[serde(rename = "_classVersion", default)]
    pub class_version: i64,

    /// Soft-delete flag
    #[serde(rename = "_deleted", default)]
    pub deleted: bool,

    #[serde(rename = "createdAt", default)]
    pub created_at: Option<bson::DateTime>,

    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<bson::DateTime>,
}

impl StoredRecord {
    /// Decode a raw storage document
    pub fn from_document(doc: Document) -> StorageResult<Self> {
        Ok(bson::from_document(doc)?)
    }
}

/// Selector matching a single stored record
pub fn by_id(id: ObjectId) -> Document {
    doc! { "_id": id }
}

/// Metadata of a stored binary file
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetadata {
    pub id: ObjectId,
    pub filename: String,
    pub content_type: Option<String>,
    pub length: i64,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

// =============================================================================
// Collaborator traits
// =============================================================================

/// Options for [`ClassModel::find`]
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Inclusion projection, e.g. `{_id: 1}`
    pub projection: Option<Document>,
    /// Sort spec, e.g. `{"data.name": -1}`
    pub sort: Option<Document>,
}

/// Options for [`ClassModel::find_one_and_update`]
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Return the document after the update instead of before
    pub new: bool,
    /// Insert a document when nothing matches the selector
    pub upsert: bool,
}

/// Document collection for one class
#[async_trait]
pub trait ClassModel: Send + Sync {
    /// All documents matching `query`, sorted and projected
    async fn find(&self, query: Document, options: FindOptions) -> StorageResult<Vec<Document>>;

    /// First document matching `query` in natural order
    async fn find_one(&self, query: Document) -> StorageResult<Option<Document>>;

    /// Insert a record and return it as stored
    async fn create(&self, record: Document) -> StorageResult<Document>;

    /// Apply update operators to the first document matching `selector`.
    /// Returns the number of matched documents.
    async fn update(&self, selector: Document, update: Document) -> StorageResult<u64>;

    /// Apply update operators to the first match, optionally upserting
    async fn find_one_and_update(
        &self,
        selector: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StorageResult<Option<Document>>;
}

/// Read access to stored file metadata
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn get_one_file_metadata_by_id(&self, id: ObjectId) -> StorageResult<Option<FileMetadata>>;
}

/// Per-project storage connection
pub trait Storage: Send + Sync {
    /// Collection handle for a class, class names are case-insensitive
    fn model(&self, class_name: &str) -> Arc<dyn ClassModel>;

    fn files(&self) -> Arc<dyn FileStore>;
}
