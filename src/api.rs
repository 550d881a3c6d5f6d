//! Request execution against the compiled schema of a project

use std::sync::Arc;

use async_graphql::{Request, Response};
use tracing::debug;

use crate::cache::SchemaCache;
use crate::compiler::RequestContext;
use crate::domains::Project;
use crate::error::Result;
use crate::schema::{generate_schema, CompiledSchema};
use crate::storage::Storage;

/// Entry point of the surrounding API layer
#[derive(Debug)]
pub struct GraphqlApi {
    cache: SchemaCache,
    cache_enabled: bool,
}

impl Default for GraphqlApi {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphqlApi {
    pub fn new() -> Self {
        Self {
            cache: SchemaCache::new(),
            cache_enabled: true,
        }
    }

    /// Compile on every request instead of going through the cache
    pub fn without_cache() -> Self {
        Self {
            cache: SchemaCache::new(),
            cache_enabled: false,
        }
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    /// Schema of a project, rebuilt when its class definitions changed
    pub async fn schema_for(&self, project: &Project) -> Result<Arc<CompiledSchema>> {
        if !self.cache_enabled {
            return Ok(Arc::new(generate_schema(project)?));
        }
        self.cache
            .get_or_build(&project.id, &project.schema_hash(), || generate_schema(project))
            .await
    }

    /// Execute one request. Definition errors fail the whole call, resolver
    /// errors end up in the response.
    pub async fn execute(
        &self,
        project: &Project,
        storage: Arc<dyn Storage>,
        request: impl Into<Request>,
        context: RequestContext,
    ) -> Result<Response> {
        let compiled = self.schema_for(project).await?;
        let request = request
            .into()
            .data(storage)
            .data(Arc::new(project.clone()))
            .data(context);
        debug!(project = %project.id, allow_mutation = context.allow_mutation, "executing request");
        Ok(compiled.schema.execute(request).await)
    }
}
