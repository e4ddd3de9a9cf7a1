//! The table-bound model handle.
//!
//! A [`Model`] is bound to one table. It discovers the table's schema at construction,
//! accumulates query fragments through fluent calls, and runs create/read/update/delete
//! operations with field whitelisting, type coercion, validation and auto-fill.
//!
//! - **Chain**: fluent setters and option resolution
//! - **CRUD**: `create`, `add`, `save`, `delete`, `select`, `find`, `get_field` and friends
//! - **Raw**: raw SQL and transactions
//! - **Output**: result shapes and transforms
//! - **Dispatch**: convenience methods called by name
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use modelkit::engine::ColumnInfo;
//! use modelkit::mock::MockEngine;
//! use modelkit::{Model, Record};
//! use serde_json::json;
//!
//! let engine = Arc::new(MockEngine::new().with_table(
//!     "user",
//!     vec![
//!         ("id", ColumnInfo::new("int(11)").primary().autoinc()),
//!         ("name", ColumnInfo::new("varchar(32)")),
//!         ("age", ColumnInfo::new("int(3)")),
//!     ],
//! ));
//! let mut user = Model::builder("User", engine).without_schema_cache().build();
//!
//! let data = user.create(&json!({"name": "Al", "age": "7"}), None).unwrap();
//! assert_eq!(data, Record::from_value(json!({"name": "Al", "age": 7})).unwrap());
//! ```

mod chain;
mod crud;
mod dispatch;
mod output;
mod raw;

pub use chain::{AutoOption, Sanitizer, ValidateOption};
pub use dispatch::{Aggregate, CallOutcome, ChainOption, Dispatcher, Method};
pub use output::{index_rows, xml_encode, FieldValue, Fetched, ResultTransform, Selection, Separator};
pub use raw::SqlParams;

use crate::auto_fill::AutoFillRule;
use crate::callback::CallbackRegistry;
use crate::config::ModelConfig;
use crate::engine::DatabaseEngine;
use crate::error::{ModelError, ModelResult};
use crate::query::{PrimaryKey, QueryOptions};
use crate::schema::{FileSchemaCache, SchemaCache, SchemaCatalog, SchemaDescriptor};
use crate::validation::ValidationRule;
use crate::value::{Record, Value};
use convert_case::{Case, Casing};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Query state accumulated by fluent calls, consumed by the next operation
#[derive(Clone, Default)]
pub(crate) struct Pending {
    pub(crate) options: QueryOptions,
    pub(crate) auto: Option<AutoOption>,
    pub(crate) validate: Option<ValidateOption>,
    pub(crate) result: Option<ResultTransform>,
    pub(crate) sanitize: Option<Sanitizer>,
}

/// Builder for [`Model`]
pub struct ModelBuilder {
    name: String,
    engine: Arc<dyn DatabaseEngine>,
    config: ModelConfig,
    prefix: Option<String>,
    cache: CacheChoice,
    rules: Vec<ValidationRule>,
    auto_fill: Vec<AutoFillRule>,
    callbacks: CallbackRegistry,
    insert_fields: Option<Vec<String>>,
    update_fields: Option<Vec<String>>,
    batch_validation: bool,
    auto_check_fields: bool,
}

enum CacheChoice {
    FromConfig,
    Custom(Arc<dyn SchemaCache>),
    Disabled,
}

fn split_fields(fields: &str) -> Vec<String> {
    fields
        .split(',')
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

impl ModelBuilder {
    /// Use `config` for the database name, table prefix and schema cache settings
    #[must_use]
    pub fn config(mut self, config: ModelConfig) -> Self {
        self.config = config;
        self
    }

    /// Table prefix, overriding the configured one
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn schema_cache(mut self, cache: Arc<dyn SchemaCache>) -> Self {
        self.cache = CacheChoice::Custom(cache);
        self
    }

    /// Always read the schema from the engine
    #[must_use]
    pub fn without_schema_cache(mut self) -> Self {
        self.cache = CacheChoice::Disabled;
        self
    }

    #[must_use]
    pub fn rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn rules(mut self, rules: Vec<ValidationRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    #[must_use]
    pub fn auto_fill(mut self, rule: AutoFillRule) -> Self {
        self.auto_fill.push(rule);
        self
    }

    /// Register a callback usable by `callback` rules
    #[must_use]
    pub fn callback<F>(mut self, name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        self.callbacks.register(name, callback);
        self
    }

    /// Fields `create` accepts on insert, comma-separated
    #[must_use]
    pub fn insert_fields(mut self, fields: &str) -> Self {
        self.insert_fields = Some(split_fields(fields));
        self
    }

    /// Fields `create` accepts on update, comma-separated
    #[must_use]
    pub fn update_fields(mut self, fields: &str) -> Self {
        self.update_fields = Some(split_fields(fields));
        self
    }

    /// Collect every field's first validation error instead of stopping at the first
    #[must_use]
    pub fn batch_validation(mut self, enabled: bool) -> Self {
        self.batch_validation = enabled;
        self
    }

    /// Strip non-schema fields in `create` (on by default)
    #[must_use]
    pub fn auto_check_fields(mut self, enabled: bool) -> Self {
        self.auto_check_fields = enabled;
        self
    }

    /// Build the model and load its schema
    ///
    /// Schema failures don't fail construction; they are logged and kept as the
    /// model's last error, and field checks then accept every field.
    pub fn build(self) -> Model {
        let (database, name) = match self.name.split_once('.') {
            Some((db, table)) if !db.is_empty() => (Some(db.to_string()), table.to_string()),
            _ => (None, self.name.clone()),
        };
        let prefix = self
            .prefix
            .unwrap_or_else(|| self.config.table_prefix.clone());

        let cache: Option<Arc<dyn SchemaCache>> = match self.cache {
            CacheChoice::Custom(cache) => Some(cache),
            CacheChoice::Disabled => None,
            CacheChoice::FromConfig if self.config.fields_cache => {
                Some(Arc::new(FileSchemaCache::new(self.config.fields_cache_dir())))
            }
            CacheChoice::FromConfig => None,
        };

        let mut model = Model {
            catalog: SchemaCatalog::new(Arc::clone(&self.engine), cache),
            engine: self.engine,
            name,
            database,
            prefix,
            config: self.config,
            schema: SchemaDescriptor::default(),
            pk: PrimaryKey::default(),
            data: Record::new(),
            pending: Pending::default(),
            rules: self.rules,
            auto_fill: self.auto_fill,
            callbacks: self.callbacks,
            insert_fields: self.insert_fields,
            update_fields: self.update_fields,
            batch_validation: self.batch_validation,
            auto_check_fields: self.auto_check_fields,
            last_error: None,
            dispatcher: Dispatcher::new(),
        };

        if !model.name.is_empty() {
            let key = model.cache_key();
            let table = model.table_name();
            model.engine.set_model(&model.name);
            match model.catalog.ensure_loaded(&key, &table) {
                Ok(descriptor) => model.adopt(descriptor),
                Err(e) => {
                    log::warn!("Schema for {} unavailable: {}", table, e);
                    model.last_error = Some(e);
                }
            }
        }
        model
    }
}

/// Table-bound data mapper
pub struct Model {
    name: String,
    database: Option<String>,
    prefix: String,
    config: ModelConfig,
    engine: Arc<dyn DatabaseEngine>,
    catalog: SchemaCatalog,
    schema: SchemaDescriptor,
    pk: PrimaryKey,
    data: Record,
    pending: Pending,
    rules: Vec<ValidationRule>,
    auto_fill: Vec<AutoFillRule>,
    callbacks: CallbackRegistry,
    insert_fields: Option<Vec<String>>,
    update_fields: Option<Vec<String>>,
    batch_validation: bool,
    auto_check_fields: bool,
    last_error: Option<ModelError>,
    dispatcher: Dispatcher,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("table", &self.table_name())
            .field("pk", &self.pk)
            .field("data", &self.data)
            .field("pending", &self.pending.options)
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl Model {
    /// Start building a model named `name` (`"User"`, `"user_group"` or `"shop.User"`)
    pub fn builder(name: impl Into<String>, engine: Arc<dyn DatabaseEngine>) -> ModelBuilder {
        ModelBuilder {
            name: name.into(),
            engine,
            config: ModelConfig::default(),
            prefix: None,
            cache: CacheChoice::FromConfig,
            rules: Vec::new(),
            auto_fill: Vec::new(),
            callbacks: CallbackRegistry::new(),
            insert_fields: None,
            update_fields: None,
            batch_validation: false,
            auto_check_fields: true,
        }
    }

    /// Model with default configuration
    pub fn new(name: impl Into<String>, engine: Arc<dyn DatabaseEngine>) -> Self {
        Self::builder(name, engine).build()
    }

    fn adopt(&mut self, descriptor: SchemaDescriptor) {
        self.pk = descriptor.primary_key_or_default();
        self.schema = descriptor;
    }

    fn cache_key(&self) -> String {
        let database = self.database.as_deref().unwrap_or(&self.config.name);
        SchemaCatalog::cache_key(database, &self.prefix, &self.name)
    }

    /// Keep `result`'s error as the last error; a failed operation also discards the
    /// pending query state
    fn track<T>(&mut self, result: ModelResult<T>) -> ModelResult<T> {
        if let Err(e) = &result {
            self.pending = Pending::default();
            self.last_error = Some(e.clone());
        }
        result
    }

    /// Model name without the database part
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full table name: `[db.]lowercase(prefix + snake_case(name))`
    #[must_use]
    pub fn table_name(&self) -> String {
        let table = format!("{}{}", self.prefix, self.name.to_case(Case::Snake)).to_lowercase();
        match &self.database {
            Some(db) => format!("{db}.{table}"),
            None => table,
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn primary_key(&self) -> &PrimaryKey {
        &self.pk
    }

    #[must_use]
    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    /// Whether the primary key auto-increments
    #[must_use]
    pub fn is_autoinc(&self) -> bool {
        self.schema.autoinc
    }

    /// Last error of any operation on this model
    #[must_use]
    pub fn error(&self) -> Option<&ModelError> {
        self.last_error.as_ref()
    }

    /// Options accumulated for the next operation
    #[must_use]
    pub fn pending_options(&self) -> &QueryOptions {
        &self.pending.options
    }

    /// Reload the schema from the engine and store it in the cache
    ///
    /// # Errors
    ///
    /// Returns `ModelError::SchemaUnavailable` when the engine reports no columns.
    pub fn flush(&mut self) -> ModelResult<()> {
        let key = self.cache_key();
        let table = self.table_name();
        self.engine.set_model(&self.name);
        let result = self.catalog.refresh(&key, &table);
        let descriptor = self.track(result)?;
        self.adopt(descriptor);
        Ok(())
    }

    /// Set one field of the current record
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.data.set(field, value);
        self
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Field of the current record is present and not null
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.data.has(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.data.remove(field)
    }

    /// The current record
    #[must_use]
    pub fn data(&self) -> &Record {
        &self.data
    }

    /// Replace the current record with an object-shaped value
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidData` when `data` does not serialize to an object.
    pub fn set_data<T: Serialize + ?Sized>(&mut self, data: &T) -> ModelResult<&mut Self> {
        let result = Record::from_serialize(data)
            .ok_or_else(|| ModelError::InvalidData("data must be an object".to_string()));
        self.data = self.track(result)?;
        Ok(self)
    }

    pub fn clear_data(&mut self) -> &mut Self {
        self.data.clear();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ColumnInfo;
    use crate::mock::{EngineCall, MockEngine};
    use crate::schema::MemorySchemaCache;
    use serde_json::json;

    fn engine() -> Arc<MockEngine> {
        Arc::new(
            MockEngine::new()
                .with_table(
                    "think_user_group",
                    vec![
                        ("id", ColumnInfo::new("int(11)").primary().autoinc()),
                        ("title", ColumnInfo::new("varchar(32)")),
                    ],
                )
                .with_table(
                    "shop.think_order",
                    vec![("id", ColumnInfo::new("int(11)").primary())],
                ),
        )
    }

    #[test]
    fn test_table_name_derivation() {
        let model = Model::builder("UserGroup", engine())
            .prefix("think_")
            .without_schema_cache()
            .build();
        assert_eq!(model.table_name(), "think_user_group");
        assert_eq!(model.schema().fields, vec!["id", "title"]);
        assert!(model.is_autoinc());
        assert!(model.error().is_none());
    }

    #[test]
    fn test_database_qualified_name() {
        let model = Model::builder("shop.Order", engine())
            .prefix("think_")
            .without_schema_cache()
            .build();
        assert_eq!(model.name(), "Order");
        assert_eq!(model.table_name(), "shop.think_order");
        assert_eq!(model.primary_key(), &PrimaryKey::Single("id".to_string()));
    }

    #[test]
    fn test_missing_table_keeps_error_without_panicking() {
        let model = Model::builder("Ghost", engine()).without_schema_cache().build();
        assert!(matches!(model.error(), Some(ModelError::SchemaUnavailable(_))));
        assert!(model.schema().is_empty());
        assert_eq!(model.primary_key(), &PrimaryKey::default());
    }

    #[test]
    fn test_schema_cached_under_database_prefix_name() {
        let cache = Arc::new(MemorySchemaCache::new());
        let engine = engine();
        let config = ModelConfig::default().with_prefix("think_");

        Model::builder("UserGroup", engine.clone())
            .config(config.clone())
            .schema_cache(cache.clone())
            .build();
        Model::builder("UserGroup", engine.clone())
            .config(config)
            .schema_cache(cache.clone())
            .build();

        assert!(cache.load("test.think_usergroup").unwrap().is_some());
        let lookups = engine
            .calls()
            .iter()
            .filter(|c| matches!(c, EngineCall::GetFields(_)))
            .count();
        assert_eq!(lookups, 1);
    }

    #[test]
    fn test_flush_reloads_schema() {
        let engine = engine();
        let mut model = Model::builder("UserGroup", engine.clone())
            .prefix("think_")
            .schema_cache(Arc::new(MemorySchemaCache::new()))
            .build();
        engine.clear_calls();
        model.flush().unwrap();
        assert_eq!(
            engine.calls(),
            vec![EngineCall::GetFields("think_user_group".to_string())]
        );
    }

    #[test]
    fn test_record_access() {
        let mut model = Model::builder("UserGroup", engine())
            .prefix("think_")
            .without_schema_cache()
            .build();
        model.set("title", "admins");
        assert!(model.has("title"));
        assert_eq!(model.get("title"), Some(&json!("admins")));
        assert_eq!(model.remove("title"), Some(json!("admins")));

        model.set_data(&json!({"id": 1, "title": "staff"})).unwrap();
        assert_eq!(model.data().len(), 2);
        assert!(model.error().is_none());

        model.limit(3);
        assert!(model.set_data(&json!([1, 2])).is_err());
        assert!(matches!(model.error(), Some(ModelError::InvalidData(_))));
        assert_eq!(model.pending_options(), &QueryOptions::default());
        assert_eq!(model.data().len(), 2);
        model.clear_data();
        assert!(model.data().is_empty());
    }
}
