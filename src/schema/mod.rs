//! Table schema discovery and caching.

pub mod cache;
pub mod catalog;

pub use cache::{FileSchemaCache, MemorySchemaCache, SchemaCache};
pub use catalog::{SchemaCatalog, SchemaDescriptor};
