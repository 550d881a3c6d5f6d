//! Familiar GraphQL
//!
//! Compiles the declarative class definitions of a project into an executable
//! GraphQL API over a document store, at runtime.
//!
//! ## Features
//!
//! - **Per-class operations**: list, single, raw queries and five mutations per class
//! - **Relay connections**: cursor pagination with `totalCount` on every list
//! - **Typed filters**: per-field filter inputs compiled to document queries
//! - **Schema cache**: one compiled schema per project, keyed by the definitions hash
//! - **Pluggable storage**: resolvers only see the [`Storage`] collaborator
//!
//! ## Architecture
//!
//! ```text
//! project.classes.definitions
//!   └─ ClassRegistry ── ClassesFields ─┐
//!                        FilesFields ──┼─ assemble ─ CompiledSchema ─ SchemaCache
//!                      ProjectFields ──┘
//! ```

pub mod api;
pub mod cache;
pub mod checksum;
pub mod classes;
pub mod compiler;
pub mod config;
pub mod connection;
pub mod domains;
pub mod error;
pub mod ids;
pub mod names;
pub mod schema;
pub mod storage;
pub mod value;

pub use api::GraphqlApi;
pub use cache::SchemaCache;
pub use checksum::Checksum;
pub use classes::{ClassHelper, ClassRegistry};
pub use compiler::{ClassesFields, RequestContext};
pub use config::GraphqlConfig;
pub use domains::Project;
pub use error::{ApiError, DefinitionError, ResolveError, Result};
pub use schema::{generate_schema, CompiledSchema, FieldsGetter};
pub use storage::{MemoryStorage, Storage};
