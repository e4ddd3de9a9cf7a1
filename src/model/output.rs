//! Result shapes returned by reads, and transforms applied to them.

use crate::value::{to_text, Record, Value};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Rows from `select`
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Rows(Vec<Record>),
    /// Rows re-keyed by the `index` option
    Indexed(IndexMap<String, Value>),
    /// Generated SQL (`fetch_sql` mode)
    Sql(String),
}

impl Selection {
    /// Number of rows or entries; zero for SQL
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Selection::Rows(rows) => rows.len(),
            Selection::Indexed(map) => map.len(),
            Selection::Sql(_) => 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn rows(&self) -> Option<&[Record]> {
        match self {
            Selection::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_rows(self) -> Option<Vec<Record>> {
        match self {
            Selection::Rows(rows) => Some(rows),
            _ => None,
        }
    }
}

/// Row from `find`, possibly transformed
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Row(Record),
    Sql(String),
    /// JSON or XML text
    Text(String),
    /// Output of a callable transform
    Value(Value),
}

impl Fetched {
    #[must_use]
    pub fn row(&self) -> Option<&Record> {
        match self {
            Fetched::Row(row) => Some(row),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_row(self) -> Option<Record> {
        match self {
            Fetched::Row(row) => Some(row),
            _ => None,
        }
    }
}

/// Transform applied to the row `find` returns
#[derive(Clone)]
pub enum ResultTransform {
    Json,
    Xml,
    Callable(Arc<dyn Fn(&Record) -> Value + Send + Sync>),
}

impl fmt::Debug for ResultTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultTransform::Json => write!(f, "Json"),
            ResultTransform::Xml => write!(f, "Xml"),
            ResultTransform::Callable(_) => write!(f, "Callable(..)"),
        }
    }
}

impl ResultTransform {
    pub fn callable<F>(func: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        ResultTransform::Callable(Arc::new(func))
    }

    pub(crate) fn apply(&self, row: Record) -> Fetched {
        match self {
            ResultTransform::Json => Fetched::Text(row.into_value().to_string()),
            ResultTransform::Xml => Fetched::Text(xml_encode(&row.into_value())),
            ResultTransform::Callable(func) => Fetched::Value(func(&row)),
        }
    }
}

/// Result of `get_field`
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// First row's value of a single field
    Scalar(Value),
    /// Values of a single field across rows
    List(Vec<Value>),
    /// First field to the remaining field(s), joined or as a row
    Map(IndexMap<String, Value>),
    Sql(String),
}

/// Row limit and joining of `get_field` results
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Separator {
    /// Single field: first value. Several fields: map to the second field's value
    #[default]
    Default,
    /// Single field: every value
    All,
    /// Single field: at most `n` values
    Limit(u64),
    /// Several fields: remaining fields joined with this text
    Join(String),
    /// Read a field list as one expression, yielding the first value
    Off,
}

/// Re-key rows by `"key"` or `"key,value"`
///
/// With one field every row is kept whole under its key; with two, only the value
/// field is kept, or the whole row when it lacks that field. Later rows win on
/// duplicate keys.
#[must_use]
pub fn index_rows(rows: Vec<Record>, index: &str) -> IndexMap<String, Value> {
    let mut parts = index.splitn(2, ',').map(str::trim);
    let key = parts.next().unwrap_or_default();
    let value_field = parts.next().filter(|v| !v.is_empty());

    let mut indexed = IndexMap::with_capacity(rows.len());
    for row in rows {
        let k = to_text(row.value(key));
        let v = match value_field {
            Some(field) if row.has(field) => row.value(field).clone(),
            _ => row.into_value(),
        };
        indexed.insert(k, v);
    }
    indexed
}

/// Serialize a value as an XML document with a `think` root element
#[must_use]
pub fn xml_encode(value: &Value) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><think>");
    write_xml(&mut xml, value);
    xml.push_str("</think>");
    xml
}

fn write_xml(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, item) in map {
                write_element(out, key, item);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                write_element(out, &i.to_string(), item);
            }
        }
        scalar => out.push_str(&escape_xml(&to_text(scalar))),
    }
}

fn write_element(out: &mut String, key: &str, item: &Value) {
    let (open, close) = if key.parse::<u64>().is_ok() {
        (format!("item id=\"{key}\""), "item".to_string())
    } else {
        (key.to_string(), key.to_string())
    };
    out.push('<');
    out.push_str(&open);
    out.push('>');
    write_xml(out, item);
    out.push_str("</");
    out.push_str(&close);
    out.push('>');
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
