//! # modelkit
//!
//! Schema-aware table models: a fluent query accumulator, field whitelisting and type
//! coercion, declarative validation and auto-fill rules, and CRUD operations over a
//! pluggable database engine.
//!
//! - **Model**: [`Model`] and its builder, the entry point for every operation
//! - **Engine**: the [`DatabaseEngine`](engine::DatabaseEngine) seam and an in-memory
//!   [`MockEngine`](mock::MockEngine)
//! - **Schema**: field discovery with file or memory caches
//! - **Rules**: validation and auto-fill

pub mod auto_fill;
pub mod callback;
pub mod coercion;
pub mod config;
pub mod engine;
pub mod error;
pub mod mock;
pub mod model;
pub mod query;
pub mod schema;
pub mod validation;
pub mod value;

#[cfg(feature = "tracing")]
pub mod tracing_helpers;

pub use auto_fill::{AutoFillRule, Fill};
pub use callback::CallbackRegistry;
pub use config::ModelConfig;
pub use engine::{DatabaseEngine, EngineError};
pub use error::{ModelError, ModelResult, ValidationErrors};
pub use model::{
    AutoOption, CallOutcome, FieldValue, Fetched, Model, ModelBuilder, ResultTransform, Selection,
    Separator, SqlParams, ValidateOption,
};
pub use query::{Lookup, PrimaryKey, QueryOptions};
pub use validation::{Check, Operation, Scope, Trigger, ValidationRule};
pub use value::{expression, Condition, Record, Value, Where};
