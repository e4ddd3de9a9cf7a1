//! Database engine seam.
//!
//! Provides the `DatabaseEngine` trait that abstracts the physical driver behind a
//! model: SQL generation, escaping, execution, transactions and error text all live
//! on the engine side. Models hand it fully-resolved [`QueryOptions`] and records.

use crate::query::QueryOptions;
use crate::value::Record;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Connection could not be used
    ConnectionError(String),
    /// Statement execution error
    QueryError(String),
    /// Transaction begin/commit/rollback error
    TransactionError(String),
    /// Other engine errors
    Other(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::ConnectionError(s) => write!(f, "Connection error: {s}"),
            EngineError::QueryError(s) => write!(f, "Query error: {s}"),
            EngineError::TransactionError(s) => write!(f, "Transaction error: {s}"),
            EngineError::Other(s) => write!(f, "Engine error: {s}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Live column metadata reported by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Declared SQL type, e.g. `int(11) unsigned`
    #[serde(rename = "type")]
    pub ty: String,
    pub primary: bool,
    pub autoinc: bool,
}

impl ColumnInfo {
    pub fn new(ty: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            primary: false,
            autoinc: false,
        }
    }

    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    #[must_use]
    pub fn autoinc(mut self) -> Self {
        self.autoinc = true;
        self
    }
}

/// Columns of one table, in declaration order
pub type ColumnMap = IndexMap<String, ColumnInfo>;

/// Result of a select
#[derive(Debug, Clone, PartialEq)]
pub enum SelectOutput {
    /// Rows read from the table
    Rows(Vec<Record>),
    /// Generated SQL (`fetch_sql` mode)
    Sql(String),
}

impl SelectOutput {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            SelectOutput::Rows(rows) => rows.is_empty(),
            SelectOutput::Sql(sql) => sql.is_empty(),
        }
    }
}

/// Trait for the database engine a model talks to
///
/// All calls are blocking. Implementations keep their own connection state (last SQL,
/// last error, open transaction), so every method takes `&self`.
///
/// # Examples
///
/// ```
/// use modelkit::engine::{ColumnInfo, DatabaseEngine};
/// use modelkit::mock::MockEngine;
///
/// let engine = MockEngine::new().with_table(
///     "user",
///     vec![("id", ColumnInfo::new("int(11)").primary().autoinc())],
/// );
/// let columns = engine.get_fields("user").unwrap();
/// assert!(columns["id"].primary);
/// ```
pub trait DatabaseEngine: Send + Sync {
    /// Column metadata for `table`; an empty map when the table is unknown
    fn get_fields(&self, table: &str) -> Result<ColumnMap, EngineError>;

    /// Insert one record and return the affected row count
    fn insert(&self, data: &Record, options: &QueryOptions, replace: bool)
        -> Result<u64, EngineError>;

    /// Insert several records in one statement
    fn insert_all(
        &self,
        data: &[Record],
        options: &QueryOptions,
        replace: bool,
    ) -> Result<u64, EngineError>;

    /// Update rows matching `options.conditions` and return the affected row count
    fn update(&self, data: &Record, options: &QueryOptions) -> Result<u64, EngineError>;

    /// Delete rows matching `options.conditions`
    fn delete(&self, options: &QueryOptions) -> Result<u64, EngineError>;

    /// Read rows, or return the generated SQL when `options.fetch_sql` is set
    fn select(&self, options: &QueryOptions) -> Result<SelectOutput, EngineError>;

    /// Run a raw read statement
    fn query(&self, sql: &str) -> Result<Vec<Record>, EngineError>;

    /// Run a raw write statement and return the affected row count
    fn execute(&self, sql: &str) -> Result<u64, EngineError>;

    /// Call a stored procedure returning several result sets
    fn procedure(&self, sql: &str, parse: bool) -> Result<Vec<Vec<Record>>, EngineError>;

    /// Substitute resolved options into an SQL template
    fn parse_sql(&self, sql: &str, options: &QueryOptions) -> String;

    /// Escape a string for literal inclusion in SQL
    fn escape_string(&self, value: &str) -> String;

    /// Name of the model issuing the next statements
    fn set_model(&self, name: &str);

    /// Id generated by the last insert
    fn last_insert_id(&self) -> Option<u64>;

    /// Last statement issued on behalf of `model`
    fn last_sql(&self, model: &str) -> String;

    /// Last engine-side error text
    fn error(&self) -> Option<String>;

    fn start_trans(&self) -> Result<(), EngineError>;

    fn commit(&self) -> Result<(), EngineError>;

    fn rollback(&self) -> Result<(), EngineError>;

    fn close(&self);
}
