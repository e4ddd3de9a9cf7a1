//! In-memory database engine for tests.
//!
//! [`MockEngine`] answers `get_fields` from registered tables, hands out queued result
//! sets and affected-row counts, and records every call so tests can assert on the
//! exact options a model resolved.
//!
//! ```
//! use modelkit::engine::{ColumnInfo, DatabaseEngine, SelectOutput};
//! use modelkit::mock::{EngineCall, MockEngine};
//! use modelkit::query::QueryOptions;
//! use modelkit::Record;
//! use serde_json::json;
//!
//! let engine = MockEngine::new()
//!     .with_table("user", vec![("id", ColumnInfo::new("int").primary())]);
//! engine.append_query_results(vec![vec![Record::from_value(json!({"id": 1})).unwrap()]]);
//!
//! let rows = engine.select(&QueryOptions::new()).unwrap();
//! assert!(matches!(rows, SelectOutput::Rows(r) if r.len() == 1));
//! assert!(matches!(engine.calls()[0], EngineCall::Select(_)));
//! ```

use crate::engine::{ColumnInfo, ColumnMap, DatabaseEngine, EngineError, SelectOutput};
use crate::query::QueryOptions;
use crate::value::{as_expression, to_text, Condition, Record, Value, Where, RAW_CONDITION_KEY};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One recorded engine call
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    GetFields(String),
    Insert {
        data: Record,
        options: QueryOptions,
        replace: bool,
    },
    InsertAll {
        data: Vec<Record>,
        options: QueryOptions,
        replace: bool,
    },
    Update {
        data: Record,
        options: QueryOptions,
    },
    Delete(QueryOptions),
    Select(QueryOptions),
    Query(String),
    Execute(String),
    Procedure(String),
    StartTrans,
    Commit,
    Rollback,
    Close,
}

#[derive(Debug, Default)]
struct MockState {
    tables: HashMap<String, ColumnMap>,
    query_results: VecDeque<Vec<Record>>,
    exec_results: VecDeque<u64>,
    last_insert_id: Option<u64>,
    fail_next: Option<EngineError>,
    calls: Vec<EngineCall>,
    last_sql: String,
    error: Option<String>,
    model: String,
    in_transaction: bool,
}

/// Scripted engine with a call log
#[derive(Debug, Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl MockEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table's columns, in declaration order
    #[must_use]
    pub fn with_table(mut self, table: &str, columns: Vec<(&str, ColumnInfo)>) -> Self {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.tables.insert(
            table.to_string(),
            columns
                .into_iter()
                .map(|(name, info)| (name.to_string(), info))
                .collect(),
        );
        self
    }

    /// Queue result sets; each select, query or procedure consumes one
    pub fn append_query_results(&self, results: Vec<Vec<Record>>) {
        self.lock().query_results.extend(results);
    }

    /// Queue affected-row counts; each write consumes one
    pub fn append_exec_results(&self, results: Vec<u64>) {
        self.lock().exec_results.extend(results);
    }

    /// Id reported by `last_insert_id`
    pub fn set_last_insert_id(&self, id: Option<u64>) {
        self.lock().last_insert_id = id;
    }

    /// Make the next data call fail with `error`
    pub fn fail_next(&self, error: EngineError) {
        self.lock().fail_next = Some(error);
    }

    /// Every call recorded so far
    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    /// Calls other than schema lookups
    #[must_use]
    pub fn data_calls(&self) -> Vec<EngineCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, EngineCall::GetFields(_)))
            .collect()
    }

    #[must_use]
    pub fn last_call(&self) -> Option<EngineCall> {
        self.lock().calls.last().cloned()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.lock().in_transaction
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `call` and `sql`, failing if a failure was scripted
    fn begin(&self, call: EngineCall, sql: String) -> Result<MutexGuard<'_, MockState>, EngineError> {
        let mut state = self.lock();
        state.calls.push(call);
        state.last_sql = sql;
        if let Some(err) = state.fail_next.take() {
            state.error = Some(err.to_string());
            return Err(err);
        }
        state.error = None;
        Ok(state)
    }
}

fn quote(value: &Value) -> String {
    match value {
        Value::Number(_) | Value::Bool(_) => to_text(value),
        Value::Null => "NULL".to_string(),
        other => format!("'{}'", addslashes(&to_text(other))),
    }
}

fn addslashes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '\'' | '"' => {
                out.push('\\');
                out.push(c);
            }
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out
}

fn render_where(conditions: Option<&Where>) -> String {
    let Some(conditions) = conditions.filter(|w| !w.is_empty()) else {
        return String::new();
    };
    let parts: Vec<String> = conditions
        .iter()
        .map(|(key, condition)| match condition {
            Condition::Eq(value) if key == RAW_CONDITION_KEY => format!("( {} )", to_text(value)),
            Condition::Eq(value) => format!("`{key}` = {}", quote(value)),
            Condition::Op { op, operand } => match op.to_uppercase().as_str() {
                "IN" | "NOT IN" => format!("`{key}` {} ({})", op.to_uppercase(), to_text(operand)),
                "EXP" => format!("`{key}` {}", to_text(operand)),
                "NEQ" => format!("`{key}` <> {}", quote(operand)),
                other => format!("`{key}` {other} {}", quote(operand)),
            },
        })
        .collect();
    format!(" WHERE {}", parts.join(" AND "))
}

fn render_select(options: &QueryOptions) -> String {
    let mut sql = String::from("SELECT ");
    if options.distinct {
        sql.push_str("DISTINCT ");
    }
    match &options.field {
        Some(field) => sql.push_str(&field.to_string()),
        None => sql.push('*'),
    }
    sql.push_str(" FROM ");
    sql.push_str(options.table.as_deref().unwrap_or(""));
    for join in &options.join {
        sql.push(' ');
        sql.push_str(join);
    }
    sql.push_str(&render_where(options.conditions.as_ref()));
    if let Some(group) = &options.group {
        sql.push_str(&format!(" GROUP BY {group}"));
    }
    if let Some(having) = &options.having {
        sql.push_str(&format!(" HAVING {having}"));
    }
    if let Some(order) = &options.order {
        sql.push_str(&format!(" ORDER BY {order}"));
    }
    if let Some(limit) = &options.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    } else if let Some(page) = &options.page {
        let rows = if page.list_rows == 0 { 20 } else { page.list_rows };
        sql.push_str(&format!(
            " LIMIT {},{}",
            page.page.saturating_sub(1) * rows,
            rows
        ));
    }
    if options.lock {
        sql.push_str(" FOR UPDATE");
    }
    sql
}

fn render_set(data: &Record) -> String {
    data.iter()
        .map(|(k, v)| match as_expression(v) {
            Some(expr) => format!("`{k}`={expr}"),
            None => format!("`{k}`={}", quote(v)),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn table_of(options: &QueryOptions) -> &str {
    options.table.as_deref().unwrap_or("")
}

impl DatabaseEngine for MockEngine {
    fn get_fields(&self, table: &str) -> Result<ColumnMap, EngineError> {
        let mut state = self.lock();
        state.calls.push(EngineCall::GetFields(table.to_string()));
        Ok(state.tables.get(table).cloned().unwrap_or_default())
    }

    fn insert(
        &self,
        data: &Record,
        options: &QueryOptions,
        replace: bool,
    ) -> Result<u64, EngineError> {
        let sql = format!(
            "{} INTO {} SET {}",
            if replace { "REPLACE" } else { "INSERT" },
            table_of(options),
            render_set(data)
        );
        let call = EngineCall::Insert {
            data: data.clone(),
            options: options.clone(),
            replace,
        };
        let mut state = self.begin(call, sql)?;
        Ok(state.exec_results.pop_front().unwrap_or(1))
    }

    fn insert_all(
        &self,
        data: &[Record],
        options: &QueryOptions,
        replace: bool,
    ) -> Result<u64, EngineError> {
        let sql = format!(
            "{} INTO {} ({} rows)",
            if replace { "REPLACE" } else { "INSERT" },
            table_of(options),
            data.len()
        );
        let call = EngineCall::InsertAll {
            data: data.to_vec(),
            options: options.clone(),
            replace,
        };
        let mut state = self.begin(call, sql)?;
        Ok(state.exec_results.pop_front().unwrap_or(data.len() as u64))
    }

    fn update(&self, data: &Record, options: &QueryOptions) -> Result<u64, EngineError> {
        let sql = format!(
            "UPDATE {} SET {}{}",
            table_of(options),
            render_set(data),
            render_where(options.conditions.as_ref())
        );
        let call = EngineCall::Update {
            data: data.clone(),
            options: options.clone(),
        };
        let mut state = self.begin(call, sql)?;
        Ok(state.exec_results.pop_front().unwrap_or(1))
    }

    fn delete(&self, options: &QueryOptions) -> Result<u64, EngineError> {
        let sql = format!(
            "DELETE FROM {}{}",
            table_of(options),
            render_where(options.conditions.as_ref())
        );
        let mut state = self.begin(EngineCall::Delete(options.clone()), sql)?;
        Ok(state.exec_results.pop_front().unwrap_or(1))
    }

    fn select(&self, options: &QueryOptions) -> Result<SelectOutput, EngineError> {
        let sql = render_select(options);
        let mut state = self.begin(EngineCall::Select(options.clone()), sql.clone())?;
        if options.fetch_sql {
            return Ok(SelectOutput::Sql(sql));
        }
        Ok(SelectOutput::Rows(
            state.query_results.pop_front().unwrap_or_default(),
        ))
    }

    fn query(&self, sql: &str) -> Result<Vec<Record>, EngineError> {
        let mut state = self.begin(EngineCall::Query(sql.to_string()), sql.to_string())?;
        Ok(state.query_results.pop_front().unwrap_or_default())
    }

    fn execute(&self, sql: &str) -> Result<u64, EngineError> {
        let mut state = self.begin(EngineCall::Execute(sql.to_string()), sql.to_string())?;
        Ok(state.exec_results.pop_front().unwrap_or(0))
    }

    fn procedure(&self, sql: &str, _parse: bool) -> Result<Vec<Vec<Record>>, EngineError> {
        let mut state = self.begin(EngineCall::Procedure(sql.to_string()), sql.to_string())?;
        Ok(state.query_results.drain(..).collect())
    }

    fn parse_sql(&self, sql: &str, options: &QueryOptions) -> String {
        let field = options
            .field
            .as_ref()
            .map_or_else(|| "*".to_string(), ToString::to_string);
        sql.replace("%TABLE%", table_of(options))
            .replace("%FIELD%", &field)
            .replace("%WHERE%", &render_where(options.conditions.as_ref()))
            .replace(
                "%ORDER%",
                &options
                    .order
                    .as_ref()
                    .map(|o| format!(" ORDER BY {o}"))
                    .unwrap_or_default(),
            )
            .replace(
                "%LIMIT%",
                &options
                    .limit
                    .map(|l| format!(" LIMIT {l}"))
                    .unwrap_or_default(),
            )
    }

    fn escape_string(&self, value: &str) -> String {
        addslashes(value)
    }

    fn set_model(&self, name: &str) {
        self.lock().model = name.to_string();
    }

    fn last_insert_id(&self) -> Option<u64> {
        self.lock().last_insert_id
    }

    fn last_sql(&self, _model: &str) -> String {
        self.lock().last_sql.clone()
    }

    fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    fn start_trans(&self) -> Result<(), EngineError> {
        let mut state = self.lock();
        state.calls.push(EngineCall::StartTrans);
        state.in_transaction = true;
        Ok(())
    }

    fn commit(&self) -> Result<(), EngineError> {
        let mut state = self.lock();
        state.calls.push(EngineCall::Commit);
        state.in_transaction = false;
        Ok(())
    }

    fn rollback(&self) -> Result<(), EngineError> {
        let mut state = self.lock();
        state.calls.push(EngineCall::Rollback);
        if !state.in_transaction {
            return Err(EngineError::TransactionError(
                "no transaction in progress".to_string(),
            ));
        }
        state.in_transaction = false;
        Ok(())
    }

    fn close(&self) {
        self.lock().calls.push(EngineCall::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FieldSelection, Limit};
    use serde_json::json;

    #[test]
    fn test_unknown_table_has_no_columns() {
        let engine = MockEngine::new();
        assert!(engine.get_fields("missing").unwrap().is_empty());
        assert_eq!(engine.calls(), vec![EngineCall::GetFields("missing".to_string())]);
    }

    #[test]
    fn test_fetch_sql_renders_select() {
        let engine = MockEngine::new();
        let options = QueryOptions {
            table: Some("think_user".to_string()),
            field: Some(FieldSelection::Expr("id,name".to_string())),
            conditions: Some(Where::new().eq("age", 5).op("id", "IN", "1,2")),
            order: Some("id desc".to_string()),
            limit: Some(Limit::Count(3)),
            fetch_sql: true,
            ..QueryOptions::default()
        };
        let output = engine.select(&options).unwrap();
        assert_eq!(
            output,
            SelectOutput::Sql(
                "SELECT id,name FROM think_user WHERE `age` = 5 AND `id` IN (1,2) ORDER BY id desc LIMIT 3"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_scripted_failure_sets_error() {
        let engine = MockEngine::new();
        engine.fail_next(EngineError::QueryError("duplicate key".to_string()));
        let result = engine.insert(&Record::new(), &QueryOptions::new(), false);
        assert!(result.is_err());
        assert!(engine.error().unwrap().contains("duplicate key"));

        assert_eq!(engine.insert(&Record::new(), &QueryOptions::new(), false), Ok(1));
        assert!(engine.error().is_none());
    }

    #[test]
    fn test_update_sql_renders_expressions() {
        let engine = MockEngine::new();
        let mut data = Record::new();
        data.set("score", crate::value::expression("score+2"));
        let options = QueryOptions {
            table: Some("user".to_string()),
            conditions: Some(Where::new().eq("id", 1)),
            ..QueryOptions::default()
        };
        engine.update(&data, &options).unwrap();
        assert_eq!(
            engine.last_sql("User"),
            "UPDATE user SET `score`=score+2 WHERE `id` = 1"
        );
    }

    #[test]
    fn test_escape_string() {
        let engine = MockEngine::new();
        assert_eq!(engine.escape_string(r#"O'Re"il\y"#), r#"O\'Re\"il\\y"#);
        assert_eq!(quote(&json!("it's")), r"'it\'s'");
    }

    #[test]
    fn test_rollback_without_transaction_fails() {
        let engine = MockEngine::new();
        assert!(engine.rollback().is_err());
        engine.start_trans().unwrap();
        assert!(engine.in_transaction());
        assert!(engine.rollback().is_ok());
    }
}
