//! Raw SQL and transaction passthrough.

use super::Model;
use crate::error::ModelResult;
use crate::query::{expand_placeholders, format_positional, QueryOptions};
use crate::value::{to_text, Record, Value};

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// How a raw statement is prepared before it reaches the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SqlParams {
    /// Expand `__TABLE__`, `__PREFIX__` and `__NAME__` placeholders
    #[default]
    Literal,
    /// Fill `%s`/`%d`/`%f` placeholders with engine-escaped arguments
    Positional(Vec<Value>),
    /// Hand the pending options to the engine's template substitution
    Resolve,
}

impl Model {
    fn prepare_sql(&mut self, sql: &str, params: SqlParams) -> ModelResult<String> {
        let sql = match params {
            SqlParams::Resolve => {
                let options = self.resolve(QueryOptions::default())?;
                self.engine.parse_sql(sql, &options)
            }
            SqlParams::Positional(args) => {
                let escaped: Vec<String> = args
                    .iter()
                    .map(|arg| self.engine.escape_string(&to_text(arg)))
                    .collect();
                format_positional(sql, &escaped)
            }
            SqlParams::Literal => expand_placeholders(sql, &self.table_name(), &self.prefix),
        };
        self.engine.set_model(&self.name);
        Ok(sql)
    }

    /// Run a raw read statement
    ///
    /// # Errors
    ///
    /// Returns the engine's error, or a condition error when resolving options.
    pub fn query(&mut self, sql: &str, params: SqlParams) -> ModelResult<Vec<Record>> {
        let result = self.run_query(sql, params);
        self.track(result)
    }

    fn run_query(&mut self, sql: &str, params: SqlParams) -> ModelResult<Vec<Record>> {
        let sql = self.prepare_sql(sql, params)?;
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::raw_sql_span(&self.name, &sql).entered();
        Ok(self.engine.query(&sql)?)
    }

    /// Run a raw write statement and return the affected row count
    ///
    /// # Errors
    ///
    /// Returns the engine's error, or a condition error when resolving options.
    pub fn execute(&mut self, sql: &str, params: SqlParams) -> ModelResult<u64> {
        let result = self.run_execute(sql, params);
        self.track(result)
    }

    fn run_execute(&mut self, sql: &str, params: SqlParams) -> ModelResult<u64> {
        let sql = self.prepare_sql(sql, params)?;
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::raw_sql_span(&self.name, &sql).entered();
        Ok(self.engine.execute(&sql)?)
    }

    /// Call a stored procedure; every result set is returned
    ///
    /// # Errors
    ///
    /// Returns the engine's error.
    pub fn procedure(&mut self, sql: &str, parse: bool) -> ModelResult<Vec<Vec<Record>>> {
        let result = self.run_procedure(sql, parse);
        self.track(result)
    }

    fn run_procedure(&mut self, sql: &str, parse: bool) -> ModelResult<Vec<Vec<Record>>> {
        let sql = if parse {
            self.prepare_sql(sql, SqlParams::Literal)?
        } else {
            self.engine.set_model(&self.name);
            sql.to_string()
        };
        Ok(self.engine.procedure(&sql, parse)?)
    }

    /// Begin a transaction, committing any open one first
    ///
    /// # Errors
    ///
    /// Returns the engine's error.
    pub fn start_trans(&mut self) -> ModelResult<()> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::transaction_span("start").entered();
        let result = self
            .engine
            .commit()
            .and_then(|()| self.engine.start_trans())
            .map_err(Into::into);
        self.track(result)
    }

    /// # Errors
    ///
    /// Returns the engine's error.
    pub fn commit(&mut self) -> ModelResult<()> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::transaction_span("commit").entered();
        let result = self.engine.commit().map_err(Into::into);
        self.track(result)
    }

    /// # Errors
    ///
    /// Returns the engine's error, e.g. when no transaction is open.
    pub fn rollback(&mut self) -> ModelResult<()> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::transaction_span("rollback").entered();
        let result = self.engine.rollback().map_err(Into::into);
        self.track(result)
    }

    /// Last engine-side error text
    #[must_use]
    pub fn engine_error(&self) -> Option<String> {
        self.engine.error()
    }

    /// Last statement the engine ran for this model
    #[must_use]
    pub fn last_sql(&self) -> String {
        self.engine.last_sql(&self.name)
    }

    #[must_use]
    pub fn last_insert_id(&self) -> Option<u64> {
        self.engine.last_insert_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ColumnInfo, DatabaseEngine};
    use crate::mock::{EngineCall, MockEngine};
    use crate::value::Where;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (Arc<MockEngine>, Model) {
        let engine = Arc::new(MockEngine::new().with_table(
            "t_user",
            vec![
                ("id", ColumnInfo::new("int(11)").primary()),
                ("age", ColumnInfo::new("int(3)")),
            ],
        ));
        let model = Model::builder("User", engine.clone())
            .prefix("t_")
            .without_schema_cache()
            .build();
        (engine, model)
    }

    #[test]
    fn test_literal_placeholders() {
        let (engine, mut m) = setup();
        m.query(
            "SELECT * FROM __TABLE__ JOIN __ROLE__ r JOIN __PREFIX__dept",
            SqlParams::Literal,
        )
        .unwrap();
        assert_eq!(
            engine.last_call(),
            Some(EngineCall::Query(
                "SELECT * FROM t_user JOIN t_role r JOIN t_dept".to_string()
            ))
        );
    }

    #[test]
    fn test_positional_arguments_escaped() {
        let (engine, mut m) = setup();
        m.execute(
            "UPDATE t_user SET name='%s' WHERE id=%d",
            SqlParams::Positional(vec![json!("O'Neil"), json!(3)]),
        )
        .unwrap();
        assert_eq!(
            engine.last_call(),
            Some(EngineCall::Execute(
                r"UPDATE t_user SET name='O\'Neil' WHERE id=3".to_string()
            ))
        );
    }

    #[test]
    fn test_resolve_uses_pending_options() {
        let (engine, mut m) = setup();
        m.filter(Where::new().eq("age", "4")).limit(2);
        m.query("SELECT %FIELD% FROM %TABLE%%WHERE%%LIMIT%", SqlParams::Resolve)
            .unwrap();
        assert_eq!(
            engine.last_sql("User"),
            "SELECT * FROM t_user WHERE `age` = 4 LIMIT 2"
        );
        assert_eq!(m.pending_options(), &QueryOptions::default());
    }

    #[test]
    fn test_start_trans_commits_first() {
        let (engine, mut m) = setup();
        m.start_trans().unwrap();
        assert!(engine.in_transaction());
        m.rollback().unwrap();
        assert_eq!(
            engine.calls()[1..].to_vec(),
            vec![EngineCall::Commit, EngineCall::StartTrans, EngineCall::Rollback]
        );
        assert!(m.rollback().is_err());
        assert!(m.error().is_some());
    }

    #[test]
    fn test_procedure_forwards() {
        let (engine, mut m) = setup();
        engine.append_query_results(vec![vec![], vec![]]);
        let sets = m.procedure("CALL stats(1)", false).unwrap();
        assert_eq!(sets.len(), 2);
    }
}
