//! Per-project compiled schema cache
//!
//! One slot per project, valid while its hash matches the hash of the
//! project's current class definitions. A stale or missing slot is rebuilt
//! outside the lock and published with a compare-and-swap: if another caller
//! already published a schema for the same hash, that one is kept and returned.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::checksum::Checksum;
use crate::error::Result;
use crate::schema::CompiledSchema;

#[derive(Default)]
pub struct SchemaCache {
    entries: RwLock<HashMap<String, Arc<CompiledSchema>>>,
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache").finish_non_exhaustive()
    }
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached schema of a project, whatever its hash
    pub async fn get(&self, tenant: &str) -> Option<Arc<CompiledSchema>> {
        self.entries.read().await.get(tenant).cloned()
    }

    /// Cached schema when its hash is `hash`, otherwise a freshly built one
    pub async fn get_or_build<F>(&self, tenant: &str, hash: &Checksum, build: F) -> Result<Arc<CompiledSchema>>
    where
        F: FnOnce() -> Result<CompiledSchema>,
    {
        if let Some(entry) = self.entries.read().await.get(tenant) {
            if &entry.hash == hash {
                debug!(tenant, %hash, "schema cache hit");
                return Ok(entry.clone());
            }
        }

        let built = match build() {
            Ok(schema) => Arc::new(schema),
            Err(e) => {
                warn!(tenant, %hash, error = %e, "schema rebuild failed");
                return Err(e);
            }
        };

        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(tenant) {
            if existing.hash == built.hash {
                debug!(tenant, %hash, "schema published concurrently, keeping it");
                return Ok(existing.clone());
            }
        }
        info!(tenant, %hash, "schema cache rebuilt");
        entries.insert(tenant.to_string(), built.clone());
        Ok(built)
    }

    pub async fn invalidate(&self, tenant: &str) -> bool {
        self.entries.write().await.remove(tenant).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
