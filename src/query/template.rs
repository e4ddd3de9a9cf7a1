//! SQL text templating: table placeholders and positional argument substitution.

use crate::coercion::parse_int_prefix;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static TABLE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"__([A-Z0-9_-]+?)__").expect("valid table token pattern"));

static FORMAT_SPEC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%([%sdfu])").expect("valid format pattern"));

/// Rewrite `__USER_GROUP__` style tokens to `prefix + user_group`
#[must_use]
pub fn rewrite_table_tokens(sql: &str, prefix: &str) -> String {
    TABLE_TOKEN
        .replace_all(sql, |caps: &Captures<'_>| {
            format!("{prefix}{}", caps[1].to_lowercase())
        })
        .into_owned()
}

/// Replace `__TABLE__` and `__PREFIX__`, then any remaining table tokens
#[must_use]
pub fn expand_placeholders(sql: &str, table: &str, prefix: &str) -> String {
    let sql = sql.replace("__TABLE__", table).replace("__PREFIX__", prefix);
    rewrite_table_tokens(&sql, prefix)
}

/// Substitute `%s`, `%d`, `%u`, `%f` and `%%` with `args` in order
///
/// Arguments are inserted as given; escaping is the caller's job. Missing arguments
/// become empty strings (zero for numeric specifiers).
#[must_use]
pub fn format_positional(template: &str, args: &[String]) -> String {
    let mut next = args.iter();
    FORMAT_SPEC
        .replace_all(template, |caps: &Captures<'_>| {
            let spec = &caps[1];
            if spec == "%" {
                return "%".to_string();
            }
            let arg = next.next().map(String::as_str).unwrap_or("");
            match spec {
                "d" => parse_int_prefix(arg).to_string(),
                "u" => parse_int_prefix(arg).max(0).to_string(),
                "f" => format!("{:.6}", arg.trim().parse::<f64>().unwrap_or(0.0)),
                _ => arg.to_string(),
            }
        })
        .into_owned()
}
