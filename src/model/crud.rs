//! Create, read, update and delete operations.

use super::{
    index_rows, Aggregate, AutoOption, FieldValue, Fetched, Model, Selection, Separator,
    ValidateOption,
};
use crate::auto_fill::{self, AutoFillRule};
use crate::engine::{DatabaseEngine, SelectOutput};
use crate::error::{ModelError, ModelResult};
use crate::query::{
    resolve_lookup, take_update_condition, FieldSelection, Limit, Lookup, PrimaryKey,
    QueryOptions,
};
use crate::schema::SchemaDescriptor;
use crate::validation::{
    check_value, matches_regex, validate, Check, Operation, UniqueLookup, ValidationContext,
    ValidationRule,
};
use crate::value::{expression, is_empty, to_text, Condition, Record, Value, Where};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt::Display;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// Existence probe for `unique` rules
///
/// Runs its own select against the model's table, so the caller's pending options and
/// current record are left alone.
struct UniqueProbe<'a> {
    engine: &'a dyn DatabaseEngine,
    schema: &'a SchemaDescriptor,
    table: String,
    model: &'a str,
}

impl UniqueLookup for UniqueProbe<'_> {
    fn row_exists(&self, conditions: Where) -> ModelResult<bool> {
        let conditions = conditions
            .into_iter()
            .map(|(key, condition)| {
                let condition = match (condition, self.schema.field_type(&key)) {
                    (Condition::Eq(value), Some(ty)) => {
                        Condition::Eq(crate::coercion::coerce(ty, &value))
                    }
                    (other, _) => other,
                };
                (key, condition)
            })
            .collect();
        let options = QueryOptions {
            table: Some(self.table.clone()),
            conditions: Some(conditions),
            limit: Some(Limit::Count(1)),
            model: Some(self.model.to_string()),
            ..QueryOptions::default()
        };
        match self.engine.select(&options)? {
            SelectOutput::Rows(rows) => Ok(!rows.is_empty()),
            SelectOutput::Sql(_) => Ok(false),
        }
    }
}

/// `a,b` style field list with something before the first comma
fn is_field_list(field: &str) -> bool {
    field.find(',').is_some_and(|pos| pos > 0)
}

impl Model {
    /// Build a validated, auto-filled record from `data` and keep it as the current record
    ///
    /// The operation is inferred from the primary key when not given: a non-empty key
    /// value means update.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidData` when `data` is not a non-empty object,
    /// `ModelError::Validation` when rules reject it, or the error of a callback or
    /// unique lookup.
    pub fn create<T: Serialize + ?Sized>(
        &mut self,
        data: &T,
        operation: Option<Operation>,
    ) -> ModelResult<Record> {
        let result = self.build_record(data, operation);
        self.track(result)
    }

    fn build_record<T: Serialize + ?Sized>(
        &mut self,
        data: &T,
        operation: Option<Operation>,
    ) -> ModelResult<Record> {
        let mut record = Record::from_serialize(data)
            .ok_or_else(|| ModelError::InvalidData("data must be an object".to_string()))?;
        if record.is_empty() {
            return Err(ModelError::InvalidData("data is empty".to_string()));
        }
        let operation = operation.unwrap_or_else(|| self.infer_operation(&record));

        let field = self.pending.options.field.take().map(|f| f.names());
        let whitelist = field.or_else(|| match operation {
            Operation::Insert => self.insert_fields.clone(),
            Operation::Update => self.update_fields.clone(),
        });
        if let Some(allowed) = whitelist {
            record.retain(|key, _| allowed.iter().any(|f| f == key));
        }

        let validate_option = self.pending.validate.take();
        let rules: &[ValidationRule] = match &validate_option {
            Some(ValidateOption::Disabled) => &[],
            Some(ValidateOption::Rules(rules)) => rules,
            None => &self.rules,
        };
        if !rules.is_empty() {
            let probe = UniqueProbe {
                engine: self.engine.as_ref(),
                schema: &self.schema,
                table: self.table_name(),
                model: &self.name,
            };
            let ctx = ValidationContext {
                primary_key: &self.pk,
                callbacks: &self.callbacks,
                lookup: &probe,
                batch: self.batch_validation,
            };
            validate(rules, &record, operation, &ctx)?;
        }

        if self.auto_check_fields && !self.schema.is_empty() {
            let bind = &self.pending.options.bind;
            let mut checked = Record::new();
            for (key, value) in record {
                if self.schema.contains(&key) {
                    let value = Self::coerce_field(&self.schema, bind, &key, value);
                    checked.set(key, value);
                } else {
                    log::debug!("Dropping unknown field {} for {}", key, self.name);
                }
            }
            record = checked;
        }

        if operation == Operation::Insert && self.schema.autoinc {
            if let Some(pk) = self.pk.as_single() {
                if record.contains_key(pk) && is_empty(record.value(pk)) {
                    record.remove(pk);
                }
            }
        }

        let auto_option = self.pending.auto.take();
        let fills: &[AutoFillRule] = match &auto_option {
            Some(AutoOption::Disabled) => &[],
            Some(AutoOption::Rules(rules)) => rules,
            None => &self.auto_fill,
        };
        auto_fill::apply(fills, &mut record, operation, &self.callbacks)?;

        self.data = record.clone();
        Ok(record)
    }

    fn infer_operation(&self, record: &Record) -> Operation {
        let has_key = match &self.pk {
            PrimaryKey::Single(pk) => !is_empty(record.value(pk)),
            PrimaryKey::Composite(fields) => fields.iter().all(|f| !is_empty(record.value(f))),
        };
        if has_key {
            Operation::Update
        } else {
            Operation::Insert
        }
    }

    /// Insert `data`, or the current record when `None` (which is then cleared)
    ///
    /// Returns the generated id when the table has a single key the data did not supply
    /// and the engine reports a non-zero id; otherwise the affected row count.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidData` for empty input, `ModelError::UnknownField`
    /// under strict mode, or the engine's error.
    pub fn add(&mut self, data: Option<Record>) -> ModelResult<u64> {
        self.add_with(data, QueryOptions::default(), false)
    }

    /// [`add`](Self::add) with option overrides; `replace` issues a replacing insert
    pub fn add_with(
        &mut self,
        data: Option<Record>,
        overrides: QueryOptions,
        replace: bool,
    ) -> ModelResult<u64> {
        let result = self.insert_one(data, overrides, replace);
        self.track(result)
    }

    fn insert_one(
        &mut self,
        data: Option<Record>,
        overrides: QueryOptions,
        replace: bool,
    ) -> ModelResult<u64> {
        let data = match data {
            Some(data) => data,
            None => std::mem::take(&mut self.data),
        };
        if data.is_empty() {
            return Err(ModelError::InvalidData("nothing to insert".to_string()));
        }

        let (whitelist, sanitize) = self.take_write_state();
        let (options, schema) = self.resolve_for_write(overrides)?;
        let data = self.facade(
            data,
            whitelist.as_deref(),
            &options,
            schema.as_ref(),
            sanitize.as_ref(),
        )?;
        if data.is_empty() {
            return Err(ModelError::InvalidData("no writable fields".to_string()));
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::crud_span("add", &self.name).entered();

        let affected = self.engine.insert(&data, &options, replace)?;
        let generated = match self.pk.as_single() {
            Some(pk) if !data.has(pk) => self.engine.last_insert_id().filter(|id| *id != 0),
            _ => None,
        };
        Ok(generated.unwrap_or(affected))
    }

    /// Insert several records in one statement
    ///
    /// Returns the last generated id for a single-key table when the engine reports one,
    /// otherwise the affected row count.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidData` for an empty list, `ModelError::UnknownField`
    /// under strict mode, or the engine's error.
    pub fn add_all(
        &mut self,
        rows: Vec<Record>,
        overrides: QueryOptions,
        replace: bool,
    ) -> ModelResult<u64> {
        let result = self.insert_many(rows, overrides, replace);
        self.track(result)
    }

    fn insert_many(
        &mut self,
        rows: Vec<Record>,
        overrides: QueryOptions,
        replace: bool,
    ) -> ModelResult<u64> {
        if rows.is_empty() {
            return Err(ModelError::InvalidData("nothing to insert".to_string()));
        }
        let (whitelist, sanitize) = self.take_write_state();
        let (options, schema) = self.resolve_for_write(overrides)?;
        let rows = rows
            .into_iter()
            .map(|row| {
                self.facade(
                    row,
                    whitelist.as_deref(),
                    &options,
                    schema.as_ref(),
                    sanitize.as_ref(),
                )
            })
            .collect::<ModelResult<Vec<_>>>()?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::crud_span("add_all", &self.name).entered();

        let affected = self.engine.insert_all(&rows, &options, replace)?;
        let generated = self
            .pk
            .as_single()
            .and_then(|_| self.engine.last_insert_id())
            .filter(|id| *id != 0);
        Ok(generated.unwrap_or(affected))
    }

    /// Update rows with `data`, or the current record when `None` (which is then cleared)
    ///
    /// Without a where-clause the condition is derived from the primary key fields in
    /// the data, which are then stripped from the update set.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidData` when nothing is left to update,
    /// `ModelError::MissingCondition` or `ModelError::IncompleteCompositeKey` when no
    /// condition can be derived, or the engine's error.
    pub fn save(&mut self, data: Option<Record>, overrides: QueryOptions) -> ModelResult<u64> {
        let result = self.update_rows(data, overrides);
        self.track(result)
    }

    fn update_rows(&mut self, data: Option<Record>, overrides: QueryOptions) -> ModelResult<u64> {
        let data = match data {
            Some(data) if !data.is_empty() => data,
            _ => std::mem::take(&mut self.data),
        };
        if data.is_empty() {
            return Err(ModelError::InvalidData("nothing to update".to_string()));
        }

        let (whitelist, sanitize) = self.take_write_state();
        let (mut options, schema) = self.resolve_for_write(overrides)?;
        let mut data = self.facade(
            data,
            whitelist.as_deref(),
            &options,
            schema.as_ref(),
            sanitize.as_ref(),
        )?;
        if data.is_empty() {
            return Err(ModelError::InvalidData("no writable fields".to_string()));
        }

        if options.has_no_conditions() {
            let conditions = take_update_condition(&self.pk, &mut data)?;
            options.conditions = Some(conditions);
            if data.is_empty() {
                return Err(ModelError::InvalidData(
                    "nothing to update besides the key".to_string(),
                ));
            }
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::crud_span("save", &self.name).entered();

        Ok(self.engine.update(&data, &options)?)
    }

    /// Delete rows matched by `lookup`
    ///
    /// An empty key (`""`, `0`, null) counts as no key. With no key and no pending
    /// where-clause, the current record's key is used. The engine is never called with
    /// an empty where-clause.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::MissingCondition` when there is nothing to key on,
    /// `ModelError::IncompleteCompositeKey` for a short composite key,
    /// `ModelError::EmptyDeleteGuard` when the resolved where-clause is empty, or the
    /// engine's error.
    pub fn delete(&mut self, lookup: impl Into<Lookup>) -> ModelResult<u64> {
        let result = self.delete_rows(lookup.into());
        self.track(result)
    }

    fn delete_rows(&mut self, lookup: Lookup) -> ModelResult<u64> {
        let lookup = match lookup {
            Lookup::Key(key) if is_empty(&key) => Lookup::Pending,
            other => other,
        };
        let lookup = match lookup {
            Lookup::Pending if self.pending.options.has_no_conditions() => {
                self.loaded_key_lookup()?
            }
            other => other,
        };
        let overrides = resolve_lookup(&self.pk, lookup)?;
        let options = self.resolve(overrides)?;
        if options.has_no_conditions() {
            return Err(ModelError::EmptyDeleteGuard);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::crud_span("delete", &self.name).entered();

        Ok(self.engine.delete(&options)?)
    }

    fn loaded_key_lookup(&self) -> ModelResult<Lookup> {
        match &self.pk {
            PrimaryKey::Single(pk) if self.data.has(pk) => {
                Ok(Lookup::Key(self.data.value(pk).clone()))
            }
            PrimaryKey::Composite(fields) if fields.iter().all(|f| self.data.has(f)) => Ok(
                Lookup::Composite(fields.iter().map(|f| self.data.value(f).clone()).collect()),
            ),
            _ => Err(ModelError::MissingCondition),
        }
    }

    /// Read rows matched by `lookup` and the pending options
    ///
    /// # Errors
    ///
    /// Returns `ModelError::IncompleteCompositeKey` for a short composite key,
    /// `ModelError::InvalidCondition` under strict mode, or the engine's error.
    pub fn select(&mut self, lookup: impl Into<Lookup>) -> ModelResult<Selection> {
        let result = self.select_rows(lookup.into());
        self.track(result)
    }

    fn select_rows(&mut self, lookup: Lookup) -> ModelResult<Selection> {
        let overrides = resolve_lookup(&self.pk, lookup)?;
        let options = self.resolve(overrides)?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::crud_span("select", &self.name).entered();

        Ok(match self.engine.select(&options)? {
            SelectOutput::Sql(sql) => Selection::Sql(sql),
            SelectOutput::Rows(rows) => match options.index.as_deref() {
                Some(index) if !rows.is_empty() => Selection::Indexed(index_rows(rows, index)),
                _ => Selection::Rows(rows),
            },
        })
    }

    /// Read the first row matched by `lookup` and keep it as the current record
    ///
    /// The pending result transform, if any, is applied to the returned row.
    ///
    /// # Errors
    ///
    /// Same as [`select`](Self::select).
    pub fn find(&mut self, lookup: impl Into<Lookup>) -> ModelResult<Option<Fetched>> {
        let result = self.find_row(lookup.into());
        self.track(result)
    }

    fn find_row(&mut self, lookup: Lookup) -> ModelResult<Option<Fetched>> {
        let transform = self.pending.result.take();
        let overrides = resolve_lookup(&self.pk, lookup)?;
        let mut options = self.resolve(overrides)?;
        options.limit = Some(Limit::Count(1));

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::crud_span("find", &self.name).entered();

        let rows = match self.engine.select(&options)? {
            SelectOutput::Sql(sql) => return Ok(Some(Fetched::Sql(sql))),
            SelectOutput::Rows(rows) => rows,
        };
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        self.data = row.clone();
        Ok(Some(match transform {
            Some(transform) => transform.apply(row),
            None => Fetched::Row(row),
        }))
    }

    /// Read one field, or map one field to others, from matching rows
    ///
    /// A single field yields the first row's value by default, every value with
    /// [`Separator::All`] or up to `n` values with [`Separator::Limit`]. A field list
    /// `a,b` maps each `a` to its `b`; longer lists map `a` to the whole row, or to the
    /// remaining values joined by [`Separator::Join`]'s text. [`Separator::Off`] treats a
    /// list like a single expression.
    ///
    /// # Errors
    ///
    /// Same as [`select`](Self::select).
    pub fn get_field(&mut self, field: &str, separator: Separator) -> ModelResult<Option<FieldValue>> {
        let result = self.read_field(field.trim(), separator);
        self.track(result)
    }

    fn read_field(&mut self, field: &str, separator: Separator) -> ModelResult<Option<FieldValue>> {
        let multi = is_field_list(field) && separator != Separator::Off;
        let mut options = self.resolve(QueryOptions::default())?;
        options.field = Some(FieldSelection::Expr(field.to_string()));

        if multi {
            if let (Separator::Limit(n), None) = (&separator, &options.limit) {
                options.limit = Some(Limit::Count(*n));
            }
        } else {
            match separator {
                Separator::All => {}
                Separator::Limit(n) => options.limit = Some(Limit::Count(n)),
                _ => options.limit = Some(Limit::Count(1)),
            }
        }
        let single_value = !multi && options.limit == Some(Limit::Count(1));

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::crud_span("get_field", &self.name).entered();

        let rows = match self.engine.select(&options)? {
            SelectOutput::Sql(sql) => return Ok(Some(FieldValue::Sql(sql))),
            SelectOutput::Rows(rows) if rows.is_empty() => return Ok(None),
            SelectOutput::Rows(rows) => rows,
        };

        if multi {
            let list_len = field.split(',').count();
            let mut map = IndexMap::with_capacity(rows.len());
            for row in rows {
                let mut values = row.iter();
                let Some((_, first)) = values.next() else {
                    continue;
                };
                let key = to_text(first);
                let value = if list_len == 2 {
                    values.next().map_or(Value::Null, |(_, v)| v.clone())
                } else if let Separator::Join(glue) = &separator {
                    let rest: Vec<String> = values.map(|(_, v)| to_text(v)).collect();
                    Value::from(rest.join(glue.as_str()))
                } else {
                    row.clone().into_value()
                };
                map.insert(key, value);
            }
            return Ok(Some(FieldValue::Map(map)));
        }

        if single_value {
            let first = rows
                .first()
                .and_then(|row| row.values().next().cloned())
                .unwrap_or(Value::Null);
            return Ok(Some(FieldValue::Scalar(first)));
        }
        let values = rows
            .iter()
            .map(|row| match row.get(field) {
                Some(value) => value.clone(),
                None => row.values().next().cloned().unwrap_or(Value::Null),
            })
            .collect();
        Ok(Some(FieldValue::List(values)))
    }

    /// Update one field of the rows matched by the pending where-clause
    ///
    /// # Errors
    ///
    /// Same as [`save`](Self::save).
    pub fn set_field(&mut self, field: &str, value: impl Into<Value>) -> ModelResult<u64> {
        let mut data = Record::new();
        data.set(field, value);
        self.save(Some(data), QueryOptions::default())
    }

    /// Update several fields of the rows matched by the pending where-clause
    ///
    /// # Errors
    ///
    /// Same as [`save`](Self::save).
    pub fn set_fields(&mut self, data: Record) -> ModelResult<u64> {
        self.save(Some(data), QueryOptions::default())
    }

    /// Increase `field` by `step` in SQL
    ///
    /// # Errors
    ///
    /// Same as [`save`](Self::save).
    pub fn set_inc(&mut self, field: &str, step: impl Display) -> ModelResult<u64> {
        self.set_field(field, expression(format!("{field}+{step}")))
    }

    /// Decrease `field` by `step` in SQL
    ///
    /// # Errors
    ///
    /// Same as [`save`](Self::save).
    pub fn set_dec(&mut self, field: &str, step: impl Display) -> ModelResult<u64> {
        self.set_field(field, expression(format!("{field}-{step}")))
    }

    /// Run an aggregate over `field` on the rows matched by the pending options
    ///
    /// # Errors
    ///
    /// Same as [`select`](Self::select).
    pub fn aggregate(&mut self, function: Aggregate, field: &str) -> ModelResult<Option<Value>> {
        let name = function.name();
        let expr = format!("{}({field}) AS tp_{name}", name.to_uppercase());
        Ok(match self.get_field(&expr, Separator::Default)? {
            Some(FieldValue::Scalar(value)) => Some(value),
            Some(FieldValue::Sql(sql)) => Some(Value::from(sql)),
            _ => None,
        })
    }

    /// `COUNT(field)`; pass `"*"` to count rows
    ///
    /// # Errors
    ///
    /// Same as [`select`](Self::select).
    pub fn count(&mut self, field: &str) -> ModelResult<Option<Value>> {
        self.aggregate(Aggregate::Count, field)
    }

    /// # Errors
    ///
    /// Same as [`select`](Self::select).
    pub fn sum(&mut self, field: &str) -> ModelResult<Option<Value>> {
        self.aggregate(Aggregate::Sum, field)
    }

    /// # Errors
    ///
    /// Same as [`select`](Self::select).
    pub fn min(&mut self, field: &str) -> ModelResult<Option<Value>> {
        self.aggregate(Aggregate::Min, field)
    }

    /// # Errors
    ///
    /// Same as [`select`](Self::select).
    pub fn max(&mut self, field: &str) -> ModelResult<Option<Value>> {
        self.aggregate(Aggregate::Max, field)
    }

    /// # Errors
    ///
    /// Same as [`select`](Self::select).
    pub fn avg(&mut self, field: &str) -> ModelResult<Option<Value>> {
        self.aggregate(Aggregate::Avg, field)
    }

    /// First row whose `field` equals `value`
    ///
    /// # Errors
    ///
    /// Same as [`find`](Self::find).
    pub fn get_by(&mut self, field: &str, value: impl Into<Value>) -> ModelResult<Option<Fetched>> {
        self.filter(Where::new().eq(field, value));
        self.find(Lookup::Pending)
    }

    /// `column` of the first row whose `field` equals `value`
    ///
    /// # Errors
    ///
    /// Same as [`get_field`](Self::get_field).
    pub fn get_field_by(
        &mut self,
        field: &str,
        value: impl Into<Value>,
        column: &str,
    ) -> ModelResult<Option<FieldValue>> {
        self.filter(Where::new().eq(field, value));
        self.get_field(column, Separator::Default)
    }

    /// The pending select as a parenthesized sub-query
    ///
    /// # Errors
    ///
    /// Same as [`select`](Self::select).
    pub fn build_sql(&mut self) -> ModelResult<String> {
        match self.select(Lookup::FetchSql)? {
            Selection::Sql(sql) => Ok(format!("( {sql} )")),
            _ => {
                let err = ModelError::InvalidData("engine did not return SQL".to_string());
                self.track(Err(err))
            }
        }
    }

    /// Check `value` against a rule of the given kind outside any record
    ///
    /// Kinds are those of [`Check::from_kind`]; `callback` calls a registered callback.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::UnknownMethod` for an unregistered callback and
    /// `ModelError::InvalidData` for kinds that need a record (`confirm`, `unique`).
    pub fn check(&self, value: &Value, rule: Value, kind: &str) -> ModelResult<bool> {
        let check = Check::from_kind(kind, rule);
        if let Some(passed) = check_value(value, &check) {
            return Ok(passed);
        }
        match check {
            Check::Callback { name, args } => {
                let mut call_args = vec![value.clone()];
                call_args.extend(args);
                Ok(self.callbacks.call(&name, &call_args)? != Value::Bool(false))
            }
            _ => Err(ModelError::InvalidData(format!("check kind {kind} needs a record"))),
        }
    }

    /// Match `value` against a pattern or a built-in alias
    #[must_use]
    pub fn regex(&self, value: &Value, rule: &str) -> bool {
        matches_regex(value, rule)
    }
}
