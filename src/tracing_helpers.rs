//! Span helpers for engine-bound model operations.
//!
//! Only compiled with the `tracing` feature. Callers enter the span for the duration of
//! the engine call:
//!
//! ```ignore
//! #[cfg(feature = "tracing")]
//! let _span = tracing_helpers::crud_span("select", &self.name).entered();
//! ```

use tracing::Span;

/// Span around one CRUD operation of `model`
pub fn crud_span(operation: &'static str, model: &str) -> Span {
    tracing::info_span!("modelkit.crud", operation, model)
}

/// Span around a raw SQL statement issued through `model`
pub fn raw_sql_span(model: &str, sql: &str) -> Span {
    tracing::info_span!("modelkit.raw", model, sql)
}

/// Span around a schema lookup for `table`
pub fn schema_span(table: &str) -> Span {
    tracing::info_span!("modelkit.schema", table)
}

/// Span around a transaction boundary (`start`, `commit`, `rollback`)
pub fn transaction_span(action: &'static str) -> Span {
    tracing::info_span!("modelkit.transaction", action)
}
