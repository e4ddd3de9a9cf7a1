//! Resolved query options handed to the database engine.

use crate::coercion::parse_int_prefix;
use crate::value::{Value, Where};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// Row limit: `LIMIT n` or `LIMIT offset,length`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Limit {
    Count(u64),
    Range { offset: u64, length: u64 },
}

impl Limit {
    /// Build from an offset and an optional length; a zero length means a plain count
    #[must_use]
    pub fn new(offset: u64, length: Option<u64>) -> Self {
        match length {
            Some(length) if length > 0 => Limit::Range { offset, length },
            _ => Limit::Count(offset),
        }
    }

    /// Parse `"n"` or `"offset,length"`
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let (offset, length) = split_pair(text);
        Self::new(offset, length)
    }

    /// Row count this limit allows
    #[must_use]
    pub fn count(&self) -> u64 {
        match self {
            Limit::Count(n) => *n,
            Limit::Range { length, .. } => *length,
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Count(n) => write!(f, "{n}"),
            Limit::Range { offset, length } => write!(f, "{offset},{length}"),
        }
    }
}

/// Page number and rows per page; zero rows leaves the page size to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub page: u64,
    pub list_rows: u64,
}

impl Page {
    #[must_use]
    pub fn new(page: u64, list_rows: u64) -> Self {
        Self { page, list_rows }
    }

    /// Parse `"page"` or `"page,rows"`
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let (page, rows) = split_pair(text);
        Self::new(page, rows.unwrap_or(0))
    }
}

fn split_pair(text: &str) -> (u64, Option<u64>) {
    let to_u64 = |s: &str| u64::try_from(parse_int_prefix(s)).unwrap_or(0);
    match text.split_once(',') {
        Some((a, b)) => (to_u64(a), Some(to_u64(b))),
        None => (to_u64(text), None),
    }
}

/// Projection: explicit column names or a raw select expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FieldSelection {
    Columns(Vec<String>),
    Expr(String),
}

impl FieldSelection {
    /// Comma-split field names, trimmed
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        match self {
            FieldSelection::Columns(cols) => cols.clone(),
            FieldSelection::Expr(expr) => expr
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

impl fmt::Display for FieldSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSelection::Columns(cols) => write!(f, "{}", cols.join(",")),
            FieldSelection::Expr(expr) => write!(f, "{expr}"),
        }
    }
}

/// Query fragments accumulated by a model and resolved for one engine call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryOptions {
    pub table: Option<String>,
    pub alias: Option<String>,
    /// The where-mapping
    pub conditions: Option<Where>,
    pub join: Vec<String>,
    pub union: Vec<String>,
    pub union_all: bool,
    pub order: Option<String>,
    pub group: Option<String>,
    pub having: Option<String>,
    pub limit: Option<Limit>,
    pub page: Option<Page>,
    pub field: Option<FieldSelection>,
    /// Named (`:name`) or positional parameters
    pub bind: IndexMap<String, Value>,
    pub comment: Option<String>,
    pub fetch_sql: bool,
    /// Result indexing spec, `"key"` or `"key,value"`
    pub index: Option<String>,
    pub distinct: bool,
    pub lock: bool,
    pub force: Option<String>,
    pub strict: bool,
    /// Name of the model that resolved these options
    pub model: Option<String>,
}

impl QueryOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options carrying only a where-mapping
    #[must_use]
    pub fn with_conditions(conditions: Where) -> Self {
        Self {
            conditions: Some(conditions),
            ..Self::default()
        }
    }

    /// Where-mapping, empty when none is set
    #[must_use]
    pub fn conditions_or_empty(&self) -> Where {
        self.conditions.clone().unwrap_or_default()
    }

    /// True when no usable condition is present
    #[must_use]
    pub fn has_no_conditions(&self) -> bool {
        self.conditions.as_ref().map_or(true, Where::is_empty)
    }

    /// Merge `overrides` on top of `self`
    ///
    /// Scalar options set in `overrides` win, the where-mapping merges key-wise,
    /// non-empty lists replace, binds extend, flags are or-ed.
    pub fn merge(&mut self, overrides: QueryOptions) {
        macro_rules! take_some {
            ($($name:ident),*) => {
                $(if overrides.$name.is_some() { self.$name = overrides.$name; })*
            };
        }
        take_some!(
            table, alias, order, group, having, limit, page, field, comment, index, force, model
        );

        if let Some(conditions) = overrides.conditions {
            match self.conditions.as_mut() {
                Some(existing) => existing.merge(conditions),
                None => self.conditions = Some(conditions),
            }
        }
        if !overrides.join.is_empty() {
            self.join = overrides.join;
        }
        if !overrides.union.is_empty() {
            self.union = overrides.union;
        }
        self.bind.extend(overrides.bind);
        self.union_all |= overrides.union_all;
        self.fetch_sql |= overrides.fetch_sql;
        self.distinct |= overrides.distinct;
        self.lock |= overrides.lock;
        self.strict |= overrides.strict;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Condition;
    use serde_json::json;

    #[test]
    fn test_limit_parsing() {
        assert_eq!(Limit::parse("10"), Limit::Count(10));
        assert_eq!(Limit::parse("5,10"), Limit::Range { offset: 5, length: 10 });
        assert_eq!(Limit::parse("5,0"), Limit::Count(5));
        assert_eq!(Limit::parse("5,10").to_string(), "5,10");
        assert_eq!(Limit::new(3, None).count(), 3);
    }

    #[test]
    fn test_page_parsing() {
        assert_eq!(Page::parse("2,25"), Page::new(2, 25));
        assert_eq!(Page::parse("3"), Page::new(3, 0));
    }

    #[test]
    fn test_field_selection_names() {
        let field = FieldSelection::Expr("id, name ,email".to_string());
        assert_eq!(field.names(), vec!["id", "name", "email"]);
    }

    #[test]
    fn test_merge_overrides_scalars_and_merges_conditions() {
        let mut base = QueryOptions {
            order: Some("id desc".to_string()),
            limit: Some(Limit::Count(10)),
            conditions: Some(Where::new().eq("status", 1).eq("age", 3)),
            ..QueryOptions::default()
        };
        base.merge(QueryOptions {
            limit: Some(Limit::Count(1)),
            conditions: Some(Where::new().eq("age", 4)),
            ..QueryOptions::default()
        });

        assert_eq!(base.order.as_deref(), Some("id desc"));
        assert_eq!(base.limit, Some(Limit::Count(1)));
        let conditions = base.conditions.unwrap();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions.get("age"), Some(&Condition::Eq(json!(4))));
    }

    #[test]
    fn test_has_no_conditions() {
        assert!(QueryOptions::new().has_no_conditions());
        assert!(QueryOptions::with_conditions(Where::new()).has_no_conditions());
        assert!(!QueryOptions::with_conditions(Where::new().eq("id", 1)).has_no_conditions());
    }
}
