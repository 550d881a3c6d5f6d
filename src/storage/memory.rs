//! In-memory storage backend
//!
//! Keeps one document collection per class (class names are case-insensitive)
//! and a flat list of file metadata. Used by the CLI and the test suite.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::matcher;
use super::{
    ClassModel, FileMetadata, FileStore, FindOptions, Storage, StorageError, StorageResult,
    UpdateOptions,
};

// =============================================================================
// Collections
// =============================================================================

/// Documents of one class, in insertion order
#[derive(Debug)]
pub struct MemoryModel {
    name: String,
    documents: RwLock<Vec<Document>>,
}

impl MemoryModel {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored documents, deleted ones included
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Stored document by id, bypassing every filter
    pub async fn get(&self, id: ObjectId) -> Option<Document> {
        let documents = self.documents.read().await;
        documents
            .iter()
            .find(|d| d.get_object_id("_id").map_or(false, |v| v == id))
            .cloned()
    }
}

/// Fill in the fields every stored record carries
fn with_record_defaults(mut record: Document, now: bson::DateTime) -> Document {
    if !record.contains_key("_id") {
        record.insert("_id", ObjectId::new());
    }
    for (key, default) in [
        ("data", Bson::Document(Document::new())),
        ("_classVersion", Bson::Int64(0)),
        ("_deleted", Bson::Boolean(false)),
        ("createdAt", Bson::DateTime(now)),
        ("updatedAt", Bson::DateTime(now)),
    ] {
        if !record.contains_key(key) {
            record.insert(key, default);
        }
    }
    record
}

#[async_trait]
impl ClassModel for MemoryModel {
    async fn find(&self, query: Document, options: FindOptions) -> StorageResult<Vec<Document>> {
        let documents = self.documents.read().await;
        let mut found = Vec::new();
        for doc in documents.iter() {
            if matcher::matches(doc, &query)? {
                found.push(doc.clone());
            }
        }
        drop(documents);

        if let Some(sort) = &options.sort {
            matcher::sort_documents(&mut found, sort);
        }
        if let Some(projection) = &options.projection {
            found = found.iter().map(|d| matcher::project(d, projection)).collect();
        }
        trace!(collection = %self.name, matched = found.len(), "find");
        Ok(found)
    }

    async fn find_one(&self, query: Document) -> StorageResult<Option<Document>> {
        let documents = self.documents.read().await;
        for doc in documents.iter() {
            if matcher::matches(doc, &query)? {
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    async fn create(&self, record: Document) -> StorageResult<Document> {
        let record = with_record_defaults(record, bson::DateTime::now());
        debug!(collection = %self.name, id = ?record.get("_id"), "create");
        self.documents.write().await.push(record.clone());
        Ok(record)
    }

    async fn update(&self, selector: Document, update: Document) -> StorageResult<u64> {
        let mut documents = self.documents.write().await;
        for doc in documents.iter_mut() {
            if matcher::matches(doc, &selector)? {
                matcher::apply_update(doc, &update)?;
                doc.insert("updatedAt", bson::DateTime::now());
                debug!(collection = %self.name, id = ?doc.get("_id"), "update");
                return Ok(1);
            }
        }
        Ok(0)
    }

    async fn find_one_and_update(
        &self,
        selector: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StorageResult<Option<Document>> {
        let mut documents = self.documents.write().await;
        for doc in documents.iter_mut() {
            if matcher::matches(doc, &selector)? {
                let before = doc.clone();
                matcher::apply_update(doc, &update)?;
                doc.insert("updatedAt", bson::DateTime::now());
                debug!(collection = %self.name, id = ?doc.get("_id"), "find_one_and_update");
                return Ok(Some(if options.new { doc.clone() } else { before }));
            }
        }

        if !options.upsert {
            return Ok(None);
        }

        let mut inserted = matcher::selector_equalities(&selector);
        matcher::apply_update(&mut inserted, &update)?;
        let inserted = with_record_defaults(inserted, bson::DateTime::now());
        debug!(collection = %self.name, id = ?inserted.get("_id"), "upsert");
        documents.push(inserted.clone());
        Ok(options.new.then_some(inserted))
    }
}

// =============================================================================
// Files
// =============================================================================

/// File metadata store
#[derive(Debug, Default)]
pub struct MemoryFiles {
    files: RwLock<Vec<FileMetadata>>,
}

impl MemoryFiles {
    /// Register a file and return its metadata
    pub async fn add_file(
        &self,
        filename: impl Into<String>,
        content_type: Option<&str>,
        length: i64,
    ) -> FileMetadata {
        let now = bson::DateTime::now();
        let metadata = FileMetadata {
            id: ObjectId::new(),
            filename: filename.into(),
            content_type: content_type.map(str::to_string),
            length,
            created_at: now,
            updated_at: now,
        };
        self.insert(metadata.clone()).await;
        metadata
    }

    pub async fn insert(&self, metadata: FileMetadata) {
        self.files.write().await.push(metadata);
    }
}

#[async_trait]
impl FileStore for MemoryFiles {
    async fn get_one_file_metadata_by_id(&self, id: ObjectId) -> StorageResult<Option<FileMetadata>> {
        let files = self.files.read().await;
        Ok(files.iter().find(|f| f.id == id).cloned())
    }
}

// =============================================================================
// Storage
// =============================================================================

/// In-memory [`Storage`] implementation
#[derive(Debug, Default)]
pub struct MemoryStorage {
    collections: Mutex<HashMap<String, Arc<MemoryModel>>>,
    files: Arc<MemoryFiles>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete collection handle for a class
    pub fn collection(&self, class_name: &str) -> Arc<MemoryModel> {
        let key = class_name.to_lowercase();
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections
            .entry(key.clone())
            .or_insert_with(|| Arc::new(MemoryModel::new(key)))
            .clone()
    }

    /// Concrete file store handle
    pub fn file_store(&self) -> Arc<MemoryFiles> {
        self.files.clone()
    }

    /// Load records and files from a JSON fixture:
    ///
    /// ```json
    /// {
    ///   "files": [{"_id": "<hex>", "filename": "a.png", "contentType": "image/png", "length": 3}],
    ///   "classes": {"User": [{"_id": "<hex>", "data": {"name": "User 1"}}]}
    /// }
    /// ```
    ///
    /// Values use extended JSON, so relation ids are written `{"$oid": "<hex>"}`.
    pub async fn seed(&self, fixture: &serde_json::Value) -> StorageResult<()> {
        if let Some(files) = fixture.get("files").and_then(|f| f.as_array()) {
            for file in files {
                self.files.insert(file_from_fixture(file)?).await;
            }
        }

        if let Some(classes) = fixture.get("classes").and_then(|c| c.as_object()) {
            for (class_name, records) in classes {
                let model = self.collection(class_name);
                for record in records.as_array().into_iter().flatten() {
                    let mut doc = match Bson::try_from(record.clone()) {
                        Ok(Bson::Document(doc)) => doc,
                        Ok(_) => {
                            return Err(StorageError::InvalidFixture(format!(
                                "records of {} must be objects",
                                class_name
                            )))
                        }
                        Err(e) => return Err(StorageError::InvalidFixture(e.to_string())),
                    };
                    if let Some(Bson::String(raw)) = doc.get("_id") {
                        let id = fixture_object_id(raw)?;
                        doc.insert("_id", id);
                    }
                    model.create(doc).await?;
                }
            }
        }
        Ok(())
    }
}

fn fixture_object_id(raw: &str) -> StorageResult<ObjectId> {
    ObjectId::parse_str(raw).map_err(|e| StorageError::InvalidFixture(format!("{}: {}", raw, e)))
}

fn file_from_fixture(value: &serde_json::Value) -> StorageResult<FileMetadata> {
    let now = bson::DateTime::now();
    let id = match value.get("_id").and_then(|v| v.as_str()) {
        Some(raw) => fixture_object_id(raw)?,
        None => ObjectId::new(),
    };
    let filename = value
        .get("filename")
        .and_then(|v| v.as_str())
        .ok_or_else(|| StorageError::InvalidFixture("file without filename".to_string()))?;
    Ok(FileMetadata {
        id,
        filename: filename.to_string(),
        content_type: value.get("contentType").and_then(|v| v.as_str()).map(str::to_string),
        length: value.get("length").and_then(|v| v.as_i64()).unwrap_or(0),
        created_at: now,
        updated_at: now,
    })
}

impl Storage for MemoryStorage {
    fn model(&self, class_name: &str) -> Arc<dyn ClassModel> {
        self.collection(class_name)
    }

    fn files(&self) -> Arc<dyn FileStore> {
        self.files.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::by_id;
    use bson::doc;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_fills_record_defaults() {
        let storage = MemoryStorage::new();
        let model = storage.model("User");
        let created = model.create(doc! { "data": { "name": "User 1" } }).await.unwrap();
        assert!(created.get_object_id("_id").is_ok());
        assert_eq!(created.get_bool("_deleted").unwrap(), false);
        assert!(created.get_datetime("createdAt").is_ok());
        assert_eq!(storage.collection("user").len().await, 1);
    }

    #[tokio::test]
    async fn test_find_with_projection_and_sort() {
        let storage = MemoryStorage::new();
        let model = storage.model("User");
        for (name, age) in [("User 1", 30), ("User 2", 45)] {
            model.create(doc! { "data": { "name": name, "age": age } }).await.unwrap();
        }
        let found = model
            .find(
                doc! { "_deleted": false },
                FindOptions {
                    projection: Some(doc! { "_id": 1 }),
                    sort: Some(doc! { "data.age": -1 }),
                },
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].len(), 1);
    }

    #[tokio::test]
    async fn test_update_sets_nested_fields() {
        let storage = MemoryStorage::new();
        let model = storage.model("User");
        let created = model.create(doc! { "data": { "name": "User 1", "age": 30 } }).await.unwrap();
        let id = created.get_object_id("_id").unwrap();
        let matched = model
            .update(by_id(id), doc! { "$set": { "data.age": 31 } })
            .await
            .unwrap();
        assert_eq!(matched, 1);
        let stored = storage.collection("User").get(id).await.unwrap();
        assert_eq!(stored.get_document("data").unwrap(), &doc! { "name": "User 1", "age": 31 });
    }

    #[tokio::test]
    async fn test_find_one_and_update_upserts() {
        let storage = MemoryStorage::new();
        let model = storage.model("User");
        let id = ObjectId::new();
        let upserted = model
            .find_one_and_update(
                by_id(id),
                doc! { "$set": { "data": { "name": "Fresh" }, "_classVersion": 2 } },
                UpdateOptions { new: true, upsert: true },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(upserted.get_object_id("_id").unwrap(), id);
        assert_eq!(upserted.get_bool("_deleted").unwrap(), false);
        assert_eq!(upserted.get_i32("_classVersion").unwrap(), 2);

        let missing = model
            .find_one_and_update(by_id(ObjectId::new()), doc! { "$set": { "_deleted": true } }, UpdateOptions::default())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_seed_from_fixture() {
        let storage = MemoryStorage::new();
        let user_id = "5a0d3ae7b3e6f1d4d8a6b2c1";
        let file_id = "5a0d3ae7b3e6f1d4d8a6b2c2";
        storage
            .seed(&json!({
                "files": [{ "_id": file_id, "filename": "avatar.png", "contentType": "image/png", "length": 3 }],
                "classes": {
                    "User": [{ "_id": user_id, "data": { "name": "User 1", "avatar": { "$oid": file_id } } }]
                }
            }))
            .await
            .unwrap();

        let user = storage
            .collection("user")
            .get(ObjectId::parse_str(user_id).unwrap())
            .await
            .unwrap();
        let avatar = user.get_document("data").unwrap().get_object_id("avatar").unwrap();
        assert_eq!(avatar.to_hex(), file_id);

        let file = storage.files().get_one_file_metadata_by_id(avatar).await.unwrap().unwrap();
        assert_eq!(file.filename, "avatar.png");
    }
}
