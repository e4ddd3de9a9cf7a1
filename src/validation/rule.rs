//! Declarative validation rules.

use crate::value::{to_text, Value};
use std::fmt;
use std::sync::Arc;

/// Write being prepared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert,
    Update,
}

/// Which writes a rule applies to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Scope {
    Insert,
    Update,
    #[default]
    Both,
}

impl Scope {
    #[must_use]
    pub fn applies_to(self, operation: Operation) -> bool {
        match self {
            Scope::Both => true,
            Scope::Insert => operation == Operation::Insert,
            Scope::Update => operation == Operation::Update,
        }
    }
}

/// When a rule runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Only when the field is present
    #[default]
    Exists,
    /// Always, even when the field is absent
    Must,
    /// Only when the field's trimmed text is non-empty
    NonEmpty,
}

/// Plain validation function; the first argument is the field value (or a sub-map of
/// several fields), followed by the rule's extra arguments
pub type ValidatorFn = Arc<dyn Fn(&[Value]) -> bool + Send + Sync>;

/// Exact or ranged character count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthRule {
    Exact(usize),
    Range { min: usize, max: usize },
}

impl LengthRule {
    /// Parse `"n"` or `"min,max"`
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let num = |s: &str| s.trim().parse::<usize>().unwrap_or(0);
        match text.find(',') {
            Some(pos) if pos > 0 => {
                let (min, max) = text.split_at(pos);
                LengthRule::Range {
                    min: num(min),
                    max: num(&max[1..]),
                }
            }
            _ => LengthRule::Exact(num(text)),
        }
    }
}

/// Rule payload
#[derive(Clone)]
pub enum Check {
    /// Pattern, `/pattern/flags` or a built-in alias (`require`, `email`, `url`, ...)
    Regex(String),
    Function { func: ValidatorFn, args: Vec<Value> },
    /// Named callback registered on the model; fails only on an exact `false`
    Callback { name: String, args: Vec<Value> },
    /// Must equal another field
    Confirm(String),
    /// No other row may carry the same value(s)
    Unique,
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Between { min: Value, max: Value },
    NotBetween { min: Value, max: Value },
    Equal(Value),
    NotEqual(Value),
    Length(LengthRule),
    /// Current time must fall within `start,end` (epoch seconds or dates)
    Expire { start: String, end: String },
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Regex(p) => f.debug_tuple("Regex").field(p).finish(),
            Check::Function { args, .. } => f.debug_struct("Function").field("args", args).finish(),
            Check::Callback { name, args } => f
                .debug_struct("Callback")
                .field("name", name)
                .field("args", args)
                .finish(),
            Check::Confirm(other) => f.debug_tuple("Confirm").field(other).finish(),
            Check::Unique => write!(f, "Unique"),
            Check::In(list) => f.debug_tuple("In").field(list).finish(),
            Check::NotIn(list) => f.debug_tuple("NotIn").field(list).finish(),
            Check::Between { min, max } => f
                .debug_struct("Between")
                .field("min", min)
                .field("max", max)
                .finish(),
            Check::NotBetween { min, max } => f
                .debug_struct("NotBetween")
                .field("min", min)
                .field("max", max)
                .finish(),
            Check::Equal(v) => f.debug_tuple("Equal").field(v).finish(),
            Check::NotEqual(v) => f.debug_tuple("NotEqual").field(v).finish(),
            Check::Length(rule) => f.debug_tuple("Length").field(rule).finish(),
            Check::Expire { start, end } => f
                .debug_struct("Expire")
                .field("start", start)
                .field("end", end)
                .finish(),
        }
    }
}

impl Check {
    pub fn regex(pattern: impl Into<String>) -> Self {
        Check::Regex(pattern.into())
    }

    pub fn function<F>(func: F) -> Self
    where
        F: Fn(&[Value]) -> bool + Send + Sync + 'static,
    {
        Check::Function {
            func: Arc::new(func),
            args: Vec::new(),
        }
    }

    pub fn callback(name: impl Into<String>) -> Self {
        Check::Callback {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Extra arguments appended after the field value for function and callback checks
    #[must_use]
    pub fn with_args(self, extra: Vec<Value>) -> Self {
        match self {
            Check::Function { func, .. } => Check::Function { func, args: extra },
            Check::Callback { name, .. } => Check::Callback { name, args: extra },
            other => other,
        }
    }

    /// Build a check from a kind name and its rule value
    ///
    /// Kinds: `regex`, `callback`, `confirm`, `unique`, `in`, `notin`, `between`,
    /// `notbetween`, `equal`, `notequal`, `length`, `expire`. Unknown kinds read the rule
    /// as a regex. List rules accept an array or a comma-separated string.
    #[must_use]
    pub fn from_kind(kind: &str, rule: Value) -> Self {
        match kind.trim().to_lowercase().as_str() {
            "callback" => Check::callback(to_text(&rule)),
            "confirm" => Check::Confirm(to_text(&rule)),
            "unique" => Check::Unique,
            "in" => Check::In(list_of(rule)),
            "notin" => Check::NotIn(list_of(rule)),
            "between" => {
                let (min, max) = pair_of(rule);
                Check::Between { min, max }
            }
            "notbetween" => {
                let (min, max) = pair_of(rule);
                Check::NotBetween { min, max }
            }
            "equal" => Check::Equal(rule),
            "notequal" => Check::NotEqual(rule),
            "length" => Check::Length(LengthRule::parse(&to_text(&rule))),
            "expire" => {
                let text = to_text(&rule);
                let (start, end) = text.split_once(',').unwrap_or((text.as_str(), ""));
                Check::Expire {
                    start: start.trim().to_string(),
                    end: end.trim().to_string(),
                }
            }
            _ => Check::Regex(to_text(&rule)),
        }
    }
}

fn list_of(rule: Value) -> Vec<Value> {
    match rule {
        Value::Array(items) => items,
        other => to_text(&other)
            .split(',')
            .map(|s| Value::from(s.to_string()))
            .collect(),
    }
}

fn pair_of(rule: Value) -> (Value, Value) {
    let mut items = list_of(rule).into_iter();
    let min = items.next().unwrap_or(Value::Null);
    let max = items.next().unwrap_or(Value::Null);
    (min, max)
}

/// One validation rule
#[derive(Debug, Clone)]
pub struct ValidationRule {
    /// Target field, or several fields checked together
    pub fields: Vec<String>,
    pub check: Check,
    pub message: String,
    pub trigger: Trigger,
    pub scope: Scope,
}

impl ValidationRule {
    /// Rule on `fields`; a comma-separated string names several fields
    pub fn new(fields: &str, check: Check, message: impl Into<String>) -> Self {
        Self {
            fields: fields
                .split(',')
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
            check,
            message: message.into(),
            trigger: Trigger::default(),
            scope: Scope::default(),
        }
    }

    #[must_use]
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    #[must_use]
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Key under which batch errors for this rule are recorded
    #[must_use]
    pub fn error_key(&self) -> String {
        self.fields.join(",")
    }

    /// First target field
    #[must_use]
    pub fn field(&self) -> &str {
        self.fields.first().map_or("", String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scope_applies() {
        assert!(Scope::Both.applies_to(Operation::Insert));
        assert!(Scope::Both.applies_to(Operation::Update));
        assert!(Scope::Insert.applies_to(Operation::Insert));
        assert!(!Scope::Insert.applies_to(Operation::Update));
        assert!(!Scope::Update.applies_to(Operation::Insert));
    }

    #[test]
    fn test_rule_defaults() {
        let rule = ValidationRule::new("name", Check::regex("require"), "name required");
        assert_eq!(rule.trigger, Trigger::Exists);
        assert_eq!(rule.scope, Scope::Both);
        assert_eq!(rule.fields, vec!["name"]);
    }

    #[test]
    fn test_multi_field_rule() {
        let rule = ValidationRule::new("start, end", Check::Unique, "taken");
        assert_eq!(rule.fields, vec!["start", "end"]);
        assert_eq!(rule.error_key(), "start,end");
    }

    #[test]
    fn test_length_rule_parse() {
        assert_eq!(LengthRule::parse("6"), LengthRule::Exact(6));
        assert_eq!(LengthRule::parse("3,12"), LengthRule::Range { min: 3, max: 12 });
    }

    #[test]
    fn test_from_kind() {
        assert!(matches!(
            Check::from_kind("in", json!("1,2,3")),
            Check::In(list) if list == vec![json!("1"), json!("2"), json!("3")]
        ));
        assert!(matches!(
            Check::from_kind("Between", json!([1, 9])),
            Check::Between { min, max } if min == json!(1) && max == json!(9)
        ));
        assert!(matches!(
            Check::from_kind("expire", json!("2020-01-01,2030-01-01")),
            Check::Expire { start, end } if start == "2020-01-01" && end == "2030-01-01"
        ));
        assert!(matches!(Check::from_kind("whatever", json!("email")), Check::Regex(p) if p == "email"));
    }
}
