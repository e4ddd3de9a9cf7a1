//! Convenience methods called by name.
//!
//! The method table is built once per model. Names resolve case-insensitively: exact
//! entries first (`order`, `count`, ...), then the `getFieldBy<Field>` and
//! `getBy<Field>` prefixes, whose suffix is converted to a snake_case field name.

use super::{FieldValue, Fetched, Model};
use crate::error::{ModelError, ModelResult};
use crate::value::{is_empty, to_text, Value};
use convert_case::{Case, Casing};
use std::collections::HashMap;

/// Chain option settable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOption {
    Strict,
    Order,
    Alias,
    Having,
    Group,
    Lock,
    Distinct,
    Index,
    Force,
}

/// Aggregate function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl Aggregate {
    /// Lowercase function name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Aggregate::Count => "count",
            Aggregate::Sum => "sum",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
            Aggregate::Avg => "avg",
        }
    }
}

/// Entry of the method table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Chain(ChainOption),
    Aggregate(Aggregate),
    /// `getBy<Field>(value)`
    GetBy,
    /// `getFieldBy<Field>(value, column)`
    GetFieldBy,
}

/// Result of [`Model::call`]
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// A chain option was set
    Chained,
    Aggregate(Option<Value>),
    Found(Option<Fetched>),
    Field(Option<FieldValue>),
}

const PREFIXES: [(&str, Method); 2] = [("getfieldby", Method::GetFieldBy), ("getby", Method::GetBy)];

/// Name to method table
#[derive(Debug, Clone)]
pub struct Dispatcher {
    methods: HashMap<&'static str, Method>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        let mut methods = HashMap::new();
        for (name, option) in [
            ("strict", ChainOption::Strict),
            ("order", ChainOption::Order),
            ("alias", ChainOption::Alias),
            ("having", ChainOption::Having),
            ("group", ChainOption::Group),
            ("lock", ChainOption::Lock),
            ("distinct", ChainOption::Distinct),
            ("index", ChainOption::Index),
            ("force", ChainOption::Force),
        ] {
            methods.insert(name, Method::Chain(option));
        }
        for aggregate in [
            Aggregate::Count,
            Aggregate::Sum,
            Aggregate::Min,
            Aggregate::Max,
            Aggregate::Avg,
        ] {
            methods.insert(aggregate.name(), Method::Aggregate(aggregate));
        }
        Self { methods }
    }

    /// Method for `name`, with the snake_case field name for prefixed lookups
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<(Method, Option<String>)> {
        let lower = name.to_lowercase();
        if let Some(method) = self.methods.get(lower.as_str()) {
            return Some((*method, None));
        }
        PREFIXES.iter().find_map(|(prefix, method)| {
            let suffix = name.get(prefix.len()..).filter(|s| !s.is_empty())?;
            lower
                .starts_with(prefix)
                .then(|| (*method, Some(suffix.to_case(Case::Snake))))
        })
    }
}

fn arg<'a>(args: &'a [Value], index: usize, name: &str) -> ModelResult<&'a Value> {
    args.get(index)
        .ok_or_else(|| ModelError::InvalidData(format!("{name} expects argument {}", index + 1)))
}

impl Model {
    /// Call a convenience method by name
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use modelkit::engine::ColumnInfo;
    /// # use modelkit::mock::MockEngine;
    /// # use modelkit::{CallOutcome, Model};
    /// # use serde_json::json;
    /// let engine = Arc::new(MockEngine::new().with_table(
    ///     "user",
    ///     vec![("id", ColumnInfo::new("int").primary()), ("user_name", ColumnInfo::new("varchar(32)"))],
    /// ));
    /// let mut user = Model::builder("User", engine).without_schema_cache().build();
    /// let found = user.call("getByUserName", &[json!("al")]).unwrap();
    /// assert_eq!(found, CallOutcome::Found(None));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `ModelError::UnknownMethod` for names outside the method table,
    /// `ModelError::InvalidData` for missing arguments, or the called operation's error.
    pub fn call(&mut self, name: &str, args: &[Value]) -> ModelResult<CallOutcome> {
        let Some((method, field)) = self.dispatcher.resolve(name) else {
            return self.track(Err(ModelError::UnknownMethod(name.to_string())));
        };
        match (method, field) {
            (Method::Chain(option), _) => {
                let value = arg(args, 0, name);
                let value = self.track(value)?.clone();
                self.apply_chain_option(option, &value);
                Ok(CallOutcome::Chained)
            }
            (Method::Aggregate(function), _) => {
                let field = args.first().map_or_else(|| "*".to_string(), to_text);
                self.aggregate(function, &field).map(CallOutcome::Aggregate)
            }
            (Method::GetBy, Some(field)) => {
                let value = arg(args, 0, name);
                let value = self.track(value)?.clone();
                self.get_by(&field, value).map(CallOutcome::Found)
            }
            (Method::GetFieldBy, Some(field)) => {
                let checked = arg(args, 0, name).and_then(|v| Ok((v, arg(args, 1, name)?)));
                let (value, column) = self.track(checked)?;
                let (value, column) = (value.clone(), to_text(column));
                self.get_field_by(&field, value, &column).map(CallOutcome::Field)
            }
            (Method::GetBy | Method::GetFieldBy, None) => {
                self.track(Err(ModelError::UnknownMethod(name.to_string())))
            }
        }
    }

    fn apply_chain_option(&mut self, option: ChainOption, value: &Value) {
        let text = to_text(value);
        let flag = !is_empty(value);
        match option {
            ChainOption::Strict => self.strict(flag),
            ChainOption::Order => self.order(&text),
            ChainOption::Alias => self.alias(&text),
            ChainOption::Having => self.having(&text),
            ChainOption::Group => self.group(&text),
            ChainOption::Lock => self.lock(flag),
            ChainOption::Distinct => self.distinct(flag),
            ChainOption::Index => self.index(&text),
            ChainOption::Force => self.force(&text),
        };
    }
}
