//! Fluent query accumulation and option resolution.

use super::{Model, ResultTransform};
use crate::auto_fill::AutoFillRule;
use crate::coercion::coerce;
use crate::error::{ModelError, ModelResult};
use crate::query::{format_positional, rewrite_table_tokens, FieldSelection, Limit, Page, QueryOptions};
use crate::schema::SchemaDescriptor;
use crate::validation::ValidationRule;
use crate::value::{is_scalar, to_text, Condition, Record, Value, Where};
use indexmap::IndexMap;
use std::borrow::Cow;
use std::sync::Arc;

/// Auto-fill override for the next write
#[derive(Debug, Clone)]
pub enum AutoOption {
    /// Skip auto-fill
    Disabled,
    /// Use these rules instead of the model's
    Rules(Vec<AutoFillRule>),
}

/// Validation override for the next write
#[derive(Debug, Clone)]
pub enum ValidateOption {
    /// Skip validation
    Disabled,
    /// Use these rules instead of the model's
    Rules(Vec<ValidationRule>),
}

/// Value filter applied to every field of the next write
pub type Sanitizer = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Keys kept in a where-mapping even though they are not fields
fn looks_like_expression(key: &str) -> bool {
    key.parse::<f64>().is_ok()
        || key.starts_with('_')
        || key.contains(['.', '(', '|', '&'])
}

fn describe_condition(condition: &Condition) -> String {
    match condition {
        Condition::Eq(value) => to_text(value),
        Condition::Op { op, operand } => format!("{op},{}", to_text(operand)),
    }
}

impl Model {
    /// Merge a where-mapping into the pending one; colliding keys are overwritten
    pub fn filter(&mut self, conditions: impl Into<Where>) -> &mut Self {
        let conditions = conditions.into();
        match self.pending.options.conditions.as_mut() {
            Some(existing) => existing.merge(conditions),
            None => self.pending.options.conditions = Some(conditions),
        }
        self
    }

    /// Raw SQL condition
    pub fn filter_raw(&mut self, sql: &str) -> &mut Self {
        if sql.is_empty() {
            return self;
        }
        self.filter(Where::new().raw(sql))
    }

    /// Raw SQL condition with `%s`/`%d`/`%f` placeholders filled by escaped arguments
    pub fn filter_fmt(&mut self, template: &str, args: &[Value]) -> &mut Self {
        let escaped: Vec<String> = args
            .iter()
            .map(|arg| self.engine.escape_string(&to_text(arg)))
            .collect();
        let sql = format_positional(template, &escaped);
        self.filter_raw(&sql)
    }

    /// Explicit table, `__NAME__` tokens rewritten to prefixed lowercase names
    pub fn table(&mut self, table: &str) -> &mut Self {
        if !table.is_empty() {
            self.pending.options.table = Some(rewrite_table_tokens(table, &self.prefix));
        }
        self
    }

    pub fn alias(&mut self, alias: &str) -> &mut Self {
        self.pending.options.alias = Some(alias.to_string());
        self
    }

    /// Select expression or comma-separated field list
    pub fn field(&mut self, field: &str) -> &mut Self {
        self.pending.options.field = Some(FieldSelection::Expr(field.to_string()));
        self
    }

    /// Every known field, `*` when none are known
    pub fn field_all(&mut self) -> &mut Self {
        self.pending.options.field = Some(match self.db_fields() {
            Some(fields) => FieldSelection::Columns(fields),
            None => FieldSelection::Expr("*".to_string()),
        });
        self
    }

    /// Every known field except the comma-separated `excluded`
    pub fn field_except(&mut self, excluded: &str) -> &mut Self {
        let excluded = FieldSelection::Expr(excluded.to_string()).names();
        let columns = match self.db_fields() {
            Some(fields) => fields.into_iter().filter(|f| !excluded.contains(f)).collect(),
            None => excluded,
        };
        self.pending.options.field = Some(FieldSelection::Columns(columns));
        self
    }

    /// `INNER JOIN` fragment; fragments already containing `JOIN` are kept as-is
    pub fn join(&mut self, join: &str) -> &mut Self {
        self.join_kind(join, "INNER")
    }

    /// Join fragment with an explicit kind (`LEFT`, `RIGHT`, ...)
    pub fn join_kind(&mut self, join: &str, kind: &str) -> &mut Self {
        if !join.is_empty() {
            let fragment = self.join_fragment(join, kind);
            self.pending.options.join.push(fragment);
        }
        self
    }

    /// Replace all joins
    pub fn join_many(&mut self, joins: &[&str], kind: &str) -> &mut Self {
        self.pending.options.join = joins.iter().map(|j| self.join_fragment(j, kind)).collect();
        self
    }

    fn join_fragment(&self, join: &str, kind: &str) -> String {
        let join = rewrite_table_tokens(join, &self.prefix);
        if join.to_uppercase().contains("JOIN") {
            join
        } else {
            format!("{kind} JOIN {join}")
        }
    }

    /// Union with another select; `all` switches to `UNION ALL`
    pub fn union(&mut self, sql: &str, all: bool) -> &mut Self {
        if sql.is_empty() {
            return self;
        }
        if all {
            self.pending.options.union_all = true;
        }
        let sql = rewrite_table_tokens(sql, &self.prefix);
        self.pending.options.union.push(sql);
        self
    }

    /// Append several union selects; empty ones are skipped
    pub fn union_many(&mut self, selects: Vec<String>, all: bool) -> &mut Self {
        let selects: Vec<String> = selects
            .iter()
            .filter(|sql| !sql.is_empty())
            .map(|sql| rewrite_table_tokens(sql, &self.prefix))
            .collect();
        if selects.is_empty() {
            return self;
        }
        if all {
            self.pending.options.union_all = true;
        }
        self.pending.options.union.extend(selects);
        self
    }

    pub fn order(&mut self, order: &str) -> &mut Self {
        self.pending.options.order = Some(order.to_string());
        self
    }

    pub fn group(&mut self, group: &str) -> &mut Self {
        self.pending.options.group = Some(group.to_string());
        self
    }

    pub fn having(&mut self, having: &str) -> &mut Self {
        self.pending.options.having = Some(having.to_string());
        self
    }

    pub fn limit(&mut self, count: u64) -> &mut Self {
        self.pending.options.limit = Some(Limit::Count(count));
        self
    }

    pub fn limit_range(&mut self, offset: u64, length: u64) -> &mut Self {
        self.pending.options.limit = Some(Limit::new(offset, Some(length)));
        self
    }

    /// `"n"` or `"offset,length"`
    pub fn limit_str(&mut self, limit: &str) -> &mut Self {
        self.pending.options.limit = Some(Limit::parse(limit));
        self
    }

    pub fn page(&mut self, page: u64, list_rows: u64) -> &mut Self {
        self.pending.options.page = Some(Page::new(page, list_rows));
        self
    }

    /// `"page"` or `"page,rows"`
    pub fn page_str(&mut self, page: &str) -> &mut Self {
        self.pending.options.page = Some(Page::parse(page));
        self
    }

    /// Bind one parameter; a `:field` binding disables coercion of that field
    pub fn bind(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.pending.options.bind.insert(key.into(), value.into());
        self
    }

    /// Replace all bindings
    pub fn bind_many(&mut self, bind: IndexMap<String, Value>) -> &mut Self {
        self.pending.options.bind = bind;
        self
    }

    pub fn comment(&mut self, comment: &str) -> &mut Self {
        self.pending.options.comment = Some(comment.to_string());
        self
    }

    /// Return generated SQL instead of executing reads
    pub fn fetch_sql(&mut self, fetch: bool) -> &mut Self {
        self.pending.options.fetch_sql = fetch;
        self
    }

    /// Re-key `select` results by `"field"` or `"field,value_field"`
    pub fn index(&mut self, index: &str) -> &mut Self {
        self.pending.options.index = Some(index.to_string());
        self
    }

    pub fn distinct(&mut self, distinct: bool) -> &mut Self {
        self.pending.options.distinct = distinct;
        self
    }

    pub fn lock(&mut self, lock: bool) -> &mut Self {
        self.pending.options.lock = lock;
        self
    }

    /// Force an index
    pub fn force(&mut self, index: &str) -> &mut Self {
        self.pending.options.force = Some(index.to_string());
        self
    }

    /// Fail instead of silently dropping unknown fields and conditions
    pub fn strict(&mut self, strict: bool) -> &mut Self {
        self.pending.options.strict = strict;
        self
    }

    pub fn auto(&mut self, auto: AutoOption) -> &mut Self {
        self.pending.auto = Some(auto);
        self
    }

    pub fn validate(&mut self, validate: ValidateOption) -> &mut Self {
        self.pending.validate = Some(validate);
        self
    }

    /// Transform applied to the row `find` returns
    pub fn result(&mut self, transform: ResultTransform) -> &mut Self {
        self.pending.result = Some(transform);
        self
    }

    pub fn sanitize<F>(&mut self, sanitizer: F) -> &mut Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.pending.sanitize = Some(Arc::new(sanitizer));
        self
    }

    /// Field names the next operation works with
    ///
    /// With a pending explicit table they are read live from the engine (none for a
    /// sub-query); otherwise the model's own fields. `None` when nothing is known.
    #[must_use]
    pub fn db_fields(&self) -> Option<Vec<String>> {
        self.table_schema(self.pending.options.table.as_deref())
            .filter(|schema| !schema.is_empty())
            .map(|schema| schema.fields.clone())
    }

    /// Descriptor of an explicit table, or the model's own when `None`
    fn table_schema(&self, table: Option<&str>) -> Option<Cow<'_, SchemaDescriptor>> {
        match table {
            None => Some(Cow::Borrowed(&self.schema)),
            Some(table) if table.contains(')') => None,
            Some(table) => match self.catalog.describe(table) {
                Ok(descriptor) => Some(Cow::Owned(descriptor)),
                Err(e) => {
                    log::debug!("No fields for {}: {}", table, e);
                    None
                }
            },
        }
    }

    /// Coerce a scalar for `field` unless the field is bound as `:field`
    pub(crate) fn coerce_field(
        schema: &SchemaDescriptor,
        bind: &IndexMap<String, Value>,
        field: &str,
        value: Value,
    ) -> Value {
        if !is_scalar(&value) || bind.contains_key(&format!(":{field}")) {
            return value;
        }
        match schema.field_type(field) {
            Some(ty) => coerce(ty, &value),
            None => value,
        }
    }

    /// Take and clear the pending state, merge `overrides` and normalize the result
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidCondition` for an unknown where-key under strict mode.
    pub(crate) fn resolve(&mut self, overrides: QueryOptions) -> ModelResult<QueryOptions> {
        self.resolve_parts(overrides, false).map(|(options, _)| options)
    }

    /// [`resolve`](Self::resolve), also returning the descriptor of the target table
    pub(crate) fn resolve_for_write(
        &mut self,
        overrides: QueryOptions,
    ) -> ModelResult<(QueryOptions, Option<SchemaDescriptor>)> {
        self.resolve_parts(overrides, true)
    }

    fn resolve_parts(
        &mut self,
        overrides: QueryOptions,
        keep_schema: bool,
    ) -> ModelResult<(QueryOptions, Option<SchemaDescriptor>)> {
        let pending = std::mem::take(&mut self.pending);
        let mut options = pending.options;
        options.merge(overrides);

        let schema = self.table_schema(options.table.as_deref());
        if options.table.is_none() {
            options.table = Some(self.table_name());
        }

        if let Some(alias) = options.alias.as_deref().filter(|a| !a.is_empty()) {
            if let Some(table) = options.table.as_mut() {
                table.push(' ');
                table.push_str(alias);
            }
        }
        options.model = Some(self.name.clone());

        let checked_schema = schema
            .as_deref()
            .filter(|s| !s.is_empty() && options.join.is_empty());
        if let Some(schema) = checked_schema {
            let conditions = options.conditions.take().unwrap_or_default();
            let mut checked = Where::new();
            for (key, condition) in conditions {
                let key = key.trim().to_string();
                if schema.contains(&key) {
                    let condition = match condition {
                        Condition::Eq(value) => Condition::Eq(Self::coerce_field(
                            schema,
                            &options.bind,
                            &key,
                            value,
                        )),
                        other => other,
                    };
                    checked.insert(key, condition);
                } else if looks_like_expression(&key) {
                    checked.insert(key, condition);
                } else if options.strict {
                    return Err(ModelError::InvalidCondition {
                        value: describe_condition(&condition),
                        key,
                    });
                } else {
                    log::debug!("Dropping unknown condition {} for {}", key, self.name);
                }
            }
            options.conditions = Some(checked);
        }

        let schema = if keep_schema {
            schema.filter(|s| !s.is_empty()).map(Cow::into_owned)
        } else {
            None
        };
        Ok((options, schema))
    }

    /// Take the write-side pending state: the field whitelist and the sanitizer
    ///
    /// The whitelist is the pending `field` option, else every known field; `None`
    /// when no fields are known.
    pub(crate) fn take_write_state(&mut self) -> (Option<Vec<String>>, Option<Sanitizer>) {
        let sanitize = self.pending.sanitize.take();
        let field = self.pending.options.field.take();
        let Some(known) = self.db_fields() else {
            return (None, sanitize);
        };
        let whitelist = match field.map(|f| f.names()) {
            Some(names) if !names.iter().any(|n| n == "*") => names,
            _ => known,
        };
        (Some(whitelist), sanitize)
    }

    /// Whitelist, coerce and sanitize a record about to be written
    ///
    /// Values are coerced by the target table's `schema`; without one they pass
    /// through unchanged.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::UnknownField` for a field outside the whitelist under
    /// strict mode.
    pub(crate) fn facade(
        &self,
        data: Record,
        whitelist: Option<&[String]>,
        options: &QueryOptions,
        schema: Option<&SchemaDescriptor>,
        sanitize: Option<&Sanitizer>,
    ) -> ModelResult<Record> {
        let mut data = match whitelist {
            Some(allowed) => {
                let mut kept = Record::new();
                for (key, value) in data {
                    if !allowed.contains(&key) {
                        if options.strict {
                            return Err(ModelError::UnknownField {
                                value: to_text(&value),
                                field: key,
                            });
                        }
                        log::debug!("Dropping unknown field {} for {}", key, self.name);
                        continue;
                    }
                    let value = match schema {
                        Some(schema) => Self::coerce_field(schema, &options.bind, &key, value),
                        None => value,
                    };
                    kept.set(key, value);
                }
                kept
            }
            None => data,
        };

        if let Some(sanitize) = sanitize {
            data = data.into_iter().map(|(k, v)| (k, sanitize(v))).collect();
        }
        Ok(data)
    }
}
