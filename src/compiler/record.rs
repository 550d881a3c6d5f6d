//! Record materialization and the storage accessor used by every resolver

use std::collections::HashMap;
use std::sync::Arc;

use async_graphql::dynamic::{FieldValue, ResolverContext};
use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use tracing::trace;

use crate::classes::FILE_CLASS;
use crate::error::ResolveError;
use crate::ids::{object_id_from_data, to_global_id};
use crate::storage::{by_id, ClassModel, FileMetadata, FindOptions, Storage, StoredRecord};

// =============================================================================
// Records
// =============================================================================

/// A live (non-deleted) class record, ready to be resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ClassRecord {
    pub class_name: String,
    pub id: ObjectId,
    pub data: Document,
    pub class_version: i64,
    pub created_at: Option<bson::DateTime>,
    pub updated_at: Option<bson::DateTime>,
}

impl ClassRecord {
    fn from_stored(class_name: &str, stored: StoredRecord) -> Self {
        Self {
            class_name: class_name.to_string(),
            id: stored.id,
            data: stored.data,
            class_version: stored.class_version,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        }
    }

    /// Opaque client-facing id
    pub fn global_id(&self) -> String {
        to_global_id(&self.class_name, &self.mongo_id())
    }

    pub fn mongo_id(&self) -> String {
        self.id.to_hex()
    }

    /// Stored payload plus the storage id, as returned by raw queries
    pub fn raw(&self) -> Document {
        let mut raw = self.data.clone();
        raw.insert("mongoId", self.mongo_id());
        raw
    }
}

/// Anything the `Node` interface can resolve to
#[derive(Debug, Clone, PartialEq)]
pub enum NodeRecord {
    Class(ClassRecord),
    File(FileMetadata),
}

impl NodeRecord {
    pub fn type_name(&self) -> &str {
        match self {
            NodeRecord::Class(record) => &record.class_name,
            NodeRecord::File(_) => FILE_CLASS,
        }
    }

    /// Parent value for a field typed with the concrete object type
    pub fn into_field_value(self) -> FieldValue<'static> {
        match self {
            NodeRecord::Class(record) => FieldValue::owned_any(record),
            NodeRecord::File(file) => FieldValue::owned_any(file),
        }
    }

    /// Field value tagged with its concrete type, usable behind `Node`
    pub fn into_node_value(self) -> FieldValue<'static> {
        let type_name = self.type_name().to_string();
        self.into_field_value().with_type(type_name)
    }
}

/// Node of a connection edge
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeNode {
    /// Already fetched, e.g. by a list query batch fetch
    Loaded(NodeRecord),
    /// Stored reference, fetched when the node is selected
    Pending(ObjectId),
    /// Reference that is not an id, or a record that vanished between fetches
    Missing,
}

// =============================================================================
// Accessor
// =============================================================================

/// Class and file access for one request
#[derive(Clone)]
pub struct ClassData {
    storage: Arc<dyn Storage>,
}

impl ClassData {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Accessor over the storage attached to the request
    pub fn from_ctx(ctx: &ResolverContext<'_>) -> async_graphql::Result<Self> {
        let storage = ctx.data::<Arc<dyn Storage>>()?;
        Ok(Self::new(storage.clone()))
    }

    pub fn model(&self, class_name: &str) -> Arc<dyn ClassModel> {
        self.storage.model(class_name)
    }

    /// Validate a fetched document: absent is "not found", flagged is "removed"
    pub fn parse(&self, class_name: &str, document: Option<Document>) -> Result<ClassRecord, ResolveError> {
        let document = document.ok_or_else(|| ResolveError::NotFound(class_name.to_string()))?;
        let stored = StoredRecord::from_document(document)?;
        if stored.deleted {
            return Err(ResolveError::Removed(class_name.to_string()));
        }
        Ok(ClassRecord::from_stored(class_name, stored))
    }

    pub async fn get_class_by_id(&self, class_name: &str, id: ObjectId) -> Result<ClassRecord, ResolveError> {
        let document = self.model(class_name).find_one(by_id(id)).await?;
        self.parse(class_name, document)
    }

    /// Fetch any node by storage id, `File` goes to the file store
    pub async fn get_by_id(&self, class_name: &str, id: ObjectId) -> Result<NodeRecord, ResolveError> {
        if class_name == FILE_CLASS {
            let file = self
                .storage
                .files()
                .get_one_file_metadata_by_id(id)
                .await?
                .ok_or(ResolveError::FileNotFound)?;
            return Ok(NodeRecord::File(file));
        }
        self.get_class_by_id(class_name, id).await.map(NodeRecord::Class)
    }

    /// First record matching `query`, deleted ones included so they report as removed
    pub async fn find_one(&self, class_name: &str, query: Document) -> Result<ClassRecord, ResolveError> {
        let document = self.model(class_name).find_one(query).await?;
        self.parse(class_name, document)
    }

    /// Ids of the live records matching `query`, in `sort` order
    pub async fn find_ids(
        &self,
        class_name: &str,
        mut query: Document,
        sort: Option<Document>,
    ) -> Result<Vec<ObjectId>, ResolveError> {
        query.insert("_deleted", false);
        let options = FindOptions {
            projection: Some(doc! { "_id": 1 }),
            sort,
        };
        let documents = self.model(class_name).find(query, options).await?;
        let ids: Vec<ObjectId> = documents
            .iter()
            .filter_map(|d| d.get_object_id("_id").ok())
            .collect();
        trace!(class = class_name, count = ids.len(), "matched ids");
        Ok(ids)
    }

    /// Batch fetch full records, keyed by storage id
    pub async fn many_by_ids(
        &self,
        class_name: &str,
        ids: &[ObjectId],
    ) -> Result<HashMap<ObjectId, ClassRecord>, ResolveError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let query = doc! { "_id": { "$in": ids.iter().map(|id| Bson::ObjectId(*id)).collect::<Vec<_>>() } };
        let documents = self.model(class_name).find(query, FindOptions::default()).await?;
        let mut records = HashMap::with_capacity(documents.len());
        for document in documents {
            let record = self.parse(class_name, Some(document))?;
            records.insert(record.id, record);
        }
        Ok(records)
    }

    /// Decode a client-supplied reference and check that its target exists
    pub async fn verify_reference(&self, class_name: &str, raw: &str) -> Result<ObjectId, ResolveError> {
        let missing = || ResolveError::MissingReference {
            class: class_name.to_string(),
            id: raw.to_string(),
        };
        let id = object_id_from_data(raw).map_err(|_| missing())?;
        match self.get_by_id(class_name, id).await {
            Ok(_) => Ok(id),
            Err(ResolveError::NotFound(_) | ResolveError::Removed(_) | ResolveError::FileNotFound) => {
                Err(missing())
            }
            Err(e) => Err(e),
        }
    }
}

/// Storage id held by a relation value
pub fn reference_id(value: &Bson) -> Option<ObjectId> {
    match value {
        Bson::ObjectId(id) => Some(*id),
        Bson::String(raw) => object_id_from_data(raw).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn record() -> ClassRecord {
        ClassRecord {
            class_name: "User".to_string(),
            id: ObjectId::parse_str("5a0d3ae7b3e6f1d4d8a6b2c1").unwrap(),
            data: doc! { "name": "User 1", "mongoId": "shadowed" },
            class_version: 2,
            created_at: Some(bson::DateTime::from_millis(1_510_826_400_000)),
            updated_at: None,
        }
    }

    #[test]
    fn test_raw_keeps_payload() {
        let raw = record().raw();
        assert_eq!(raw.get_str("name").unwrap(), "User 1");
        assert_eq!(raw.get_str("mongoId").unwrap(), "5a0d3ae7b3e6f1d4d8a6b2c1");
        assert!(!raw.contains_key("_className"));
    }

    #[tokio::test]
    async fn test_parse_reports_missing_and_removed() {
        let storage = Arc::new(MemoryStorage::new());
        let data = ClassData::new(storage.clone());

        let err = data.get_class_by_id("User", ObjectId::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Object \"User\" not found");

        let created = storage
            .model("User")
            .create(doc! { "data": { "name": "gone" }, "_deleted": true })
            .await
            .unwrap();
        let id = created.get_object_id("_id").unwrap();
        let err = data.get_class_by_id("User", id).await.unwrap_err();
        assert_eq!(err.to_string(), "Object \"User\" marked as removed");
    }

    #[tokio::test]
    async fn test_find_ids_skips_deleted() {
        let storage = Arc::new(MemoryStorage::new());
        let model = storage.model("User");
        model.create(doc! { "data": { "name": "a" } }).await.unwrap();
        model.create(doc! { "data": { "name": "b" }, "_deleted": true }).await.unwrap();

        let data = ClassData::new(storage);
        let ids = data.find_ids("User", Document::new(), None).await.unwrap();
        assert_eq!(ids.len(), 1);
        let records = data.many_by_ids("User", &ids).await.unwrap();
        assert_eq!(records[&ids[0]].data.get_str("name").unwrap(), "a");
    }

    #[tokio::test]
    async fn test_verify_reference() {
        let storage = Arc::new(MemoryStorage::new());
        let file = storage.file_store().add_file("a.png", Some("image/png"), 3).await;
        let data = ClassData::new(storage);

        let id = data.verify_reference("File", &file.id.to_hex()).await.unwrap();
        assert_eq!(id, file.id);

        let ghost = ObjectId::new().to_hex();
        let err = data.verify_reference("User", &ghost).await.unwrap_err();
        assert_eq!(err.to_string(), format!("There is no \"User\" with id \"{}\" !", ghost));
    }
}
