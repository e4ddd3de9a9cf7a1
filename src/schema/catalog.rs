//! Per-table field metadata discovery and caching.

use crate::engine::{ColumnMap, DatabaseEngine};
use crate::error::{ModelError, ModelResult};
use crate::query::PrimaryKey;
use crate::schema::SchemaCache;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// Column names reserved for descriptor bookkeeping, never treated as fields
const RESERVED_COLUMNS: [&str; 2] = ["_pk", "_type"];

/// Field metadata of one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    /// Field names in declaration order
    pub fields: Vec<String>,
    /// Field name to declared SQL type
    pub types: IndexMap<String, String>,
    /// `None` when the table reports no primary column
    pub primary_key: Option<PrimaryKey>,
    /// Set only when a primary column is auto-incremented
    pub autoinc: bool,
}

impl SchemaDescriptor {
    /// Build from live column metadata
    ///
    /// All primary-flagged columns are collected before the key is built, so a table
    /// with several of them gets one composite key in declaration order.
    #[must_use]
    pub fn from_columns(columns: &ColumnMap) -> Self {
        let mut descriptor = SchemaDescriptor::default();
        let mut primaries = Vec::new();

        for (name, info) in columns {
            if RESERVED_COLUMNS.contains(&name.as_str()) {
                continue;
            }
            descriptor.fields.push(name.clone());
            descriptor.types.insert(name.clone(), info.ty.clone());
            if info.primary {
                primaries.push(name.clone());
                if info.autoinc {
                    descriptor.autoinc = true;
                }
            }
        }

        descriptor.primary_key = PrimaryKey::from_fields(primaries);
        descriptor
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Known field; an empty descriptor knows every field
    #[must_use]
    pub fn accepts(&self, field: &str) -> bool {
        self.is_empty() || self.contains(field)
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.types.contains_key(field)
    }

    #[must_use]
    pub fn field_type(&self, field: &str) -> Option<&str> {
        self.types.get(field).map(String::as_str)
    }

    /// Reported primary key, `id` when none was reported
    #[must_use]
    pub fn primary_key_or_default(&self) -> PrimaryKey {
        self.primary_key.clone().unwrap_or_default()
    }
}

/// Resolves descriptors through the engine and an optional cache
#[derive(Clone)]
pub struct SchemaCatalog {
    engine: Arc<dyn DatabaseEngine>,
    cache: Option<Arc<dyn SchemaCache>>,
}

impl std::fmt::Debug for SchemaCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCatalog")
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl SchemaCatalog {
    /// Catalog reading through `cache` when one is given
    pub fn new(engine: Arc<dyn DatabaseEngine>, cache: Option<Arc<dyn SchemaCache>>) -> Self {
        Self { engine, cache }
    }

    /// Cache key: lowercase `database.prefix+name`
    #[must_use]
    pub fn cache_key(database: &str, prefix: &str, name: &str) -> String {
        format!("{database}.{prefix}{name}").to_lowercase()
    }

    /// Stored descriptor for `key`, refreshed from `table` on a miss
    ///
    /// # Errors
    ///
    /// Returns `ModelError::SchemaUnavailable` when the engine reports no columns, or
    /// the engine's error.
    pub fn ensure_loaded(&self, key: &str, table: &str) -> ModelResult<SchemaDescriptor> {
        if let Some(cache) = &self.cache {
            match cache.load(key) {
                Ok(Some(descriptor)) => return Ok(descriptor),
                Ok(None) => log::debug!("Schema cache miss for {}", key),
                Err(e) => log::warn!("Ignoring unreadable schema cache entry {}: {}", key, e),
            }
        }
        self.refresh(key, table)
    }

    /// Query the engine for `table`, store the descriptor under `key` and return it
    ///
    /// A failed cache write is logged and does not fail the refresh.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::SchemaUnavailable` when the engine reports no columns.
    pub fn refresh(&self, key: &str, table: &str) -> ModelResult<SchemaDescriptor> {
        let descriptor = self.describe(table)?;
        if descriptor.is_empty() {
            return Err(ModelError::SchemaUnavailable(table.to_string()));
        }
        log::info!(
            "Loaded schema for {}: {} field(s)",
            table,
            descriptor.fields.len()
        );

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(key, &descriptor) {
                log::warn!("Failed to store schema for {}: {}", key, e);
            }
        }
        Ok(descriptor)
    }

    /// Live descriptor for `table`, bypassing the cache
    ///
    /// # Errors
    ///
    /// Returns the engine's error.
    pub fn describe(&self, table: &str) -> ModelResult<SchemaDescriptor> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::schema_span(table).entered();

        let columns = self.engine.get_fields(table)?;
        Ok(SchemaDescriptor::from_columns(&columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ColumnInfo;
    use crate::mock::{EngineCall, MockEngine};
    use crate::schema::MemorySchemaCache;

    fn user_engine() -> Arc<MockEngine> {
        Arc::new(MockEngine::new().with_table(
            "user",
            vec![
                ("id", ColumnInfo::new("int(11)").primary().autoinc()),
                ("name", ColumnInfo::new("varchar(32)")),
                ("age", ColumnInfo::new("int(3)")),
            ],
        ))
    }

    fn get_fields_calls(engine: &MockEngine) -> usize {
        engine
            .calls()
            .iter()
            .filter(|c| matches!(c, EngineCall::GetFields(_)))
            .count()
    }

    #[test]
    fn test_descriptor_from_columns() {
        let engine = user_engine();
        let descriptor = SchemaDescriptor::from_columns(&engine.get_fields("user").unwrap());
        assert_eq!(descriptor.fields, vec!["id", "name", "age"]);
        assert_eq!(descriptor.field_type("age"), Some("int(3)"));
        assert_eq!(descriptor.primary_key, Some(PrimaryKey::Single("id".to_string())));
        assert!(descriptor.autoinc);
    }

    #[test]
    fn test_composite_key_collected_once() {
        let mut columns = ColumnMap::new();
        columns.insert("uid".to_string(), ColumnInfo::new("int").primary());
        columns.insert("_pk".to_string(), ColumnInfo::new("int"));
        columns.insert("gid".to_string(), ColumnInfo::new("int").primary());
        columns.insert("level".to_string(), ColumnInfo::new("int"));

        let descriptor = SchemaDescriptor::from_columns(&columns);
        assert_eq!(descriptor.fields, vec!["uid", "gid", "level"]);
        assert_eq!(
            descriptor.primary_key,
            Some(PrimaryKey::Composite(vec!["uid".to_string(), "gid".to_string()]))
        );
        assert!(!descriptor.autoinc);
    }

    #[test]
    fn test_no_primary_defaults_to_id() {
        let mut columns = ColumnMap::new();
        columns.insert("name".to_string(), ColumnInfo::new("varchar(8)"));
        let descriptor = SchemaDescriptor::from_columns(&columns);
        assert_eq!(descriptor.primary_key, None);
        assert_eq!(descriptor.primary_key_or_default(), PrimaryKey::default());
    }

    #[test]
    fn test_cache_hit_skips_engine() {
        let engine = user_engine();
        let catalog = SchemaCatalog::new(engine.clone(), Some(Arc::new(MemorySchemaCache::new())));

        let first = catalog.ensure_loaded("test.user", "user").unwrap();
        let second = catalog.ensure_loaded("test.user", "user").unwrap();
        assert_eq!(first, second);
        assert_eq!(get_fields_calls(&engine), 1);
    }

    #[test]
    fn test_without_cache_always_queries() {
        let engine = user_engine();
        let catalog = SchemaCatalog::new(engine.clone(), None);
        catalog.ensure_loaded("test.user", "user").unwrap();
        catalog.ensure_loaded("test.user", "user").unwrap();
        assert_eq!(get_fields_calls(&engine), 2);
    }

    #[test]
    fn test_unknown_table_is_unavailable() {
        let catalog = SchemaCatalog::new(user_engine(), None);
        assert_eq!(
            catalog.ensure_loaded("test.nope", "nope").unwrap_err(),
            ModelError::SchemaUnavailable("nope".to_string())
        );
    }

    #[test]
    fn test_cache_key_lowercase() {
        assert_eq!(SchemaCatalog::cache_key("Shop", "T_", "User"), "shop.t_user");
    }
}
