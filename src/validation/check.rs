//! Context-free checks: patterns, ranges, lengths and time windows.

use crate::validation::rule::{Check, LengthRule};
use crate::value::{loose_cmp, loose_eq, to_text, Value};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

/// Built-in pattern for an alias name
#[must_use]
pub fn regex_alias(name: &str) -> Option<&'static str> {
    let pattern = match name.to_lowercase().as_str() {
        "require" => r"\S+",
        "email" => r"^\w+([-+.]\w+)*@\w+([-.]\w+)*\.\w+([-.]\w+)*$",
        "url" => {
            r"^http(s?)://(?:[A-za-z0-9-]+\.)+[A-za-z]{2,4}(:\d+)?(?:[/?#][/=?%\-&~`@\[\]':+!.#\w]*)?$"
        }
        "currency" => r"^\d+(\.\d+)?$",
        "number" => r"^\d+$",
        "zip" => r"^\d{6}$",
        "integer" => r"^[-\+]?\d+$",
        "double" => r"^[-\+]?\d+(\.\d+)?$",
        "english" => r"^[A-Za-z]+$",
        _ => return None,
    };
    Some(pattern)
}

/// Compile an alias, a `/pattern/flags` literal or a bare pattern
///
/// # Errors
///
/// Returns the regex compile error.
pub fn compile_pattern(rule: &str) -> Result<Regex, regex::Error> {
    if let Some(pattern) = regex_alias(rule) {
        return Regex::new(pattern);
    }
    match split_delimited(rule) {
        Some((body, flags)) => {
            let mut builder = RegexBuilder::new(body);
            for flag in flags.chars() {
                match flag {
                    'i' => builder.case_insensitive(true),
                    'm' => builder.multi_line(true),
                    's' => builder.dot_matches_new_line(true),
                    'x' => builder.ignore_whitespace(true),
                    'U' => builder.swap_greed(true),
                    _ => &mut builder,
                };
            }
            builder.build()
        }
        None => Regex::new(rule),
    }
}

fn split_delimited(rule: &str) -> Option<(&str, &str)> {
    let rest = rule.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    let flags = &rest[end + 1..];
    flags
        .chars()
        .all(|c| c.is_ascii_alphabetic())
        .then(|| (&rest[..end], flags))
}

/// Match the text form of `value` against `rule`
///
/// An invalid pattern never matches.
#[must_use]
pub fn matches_regex(value: &Value, rule: &str) -> bool {
    match compile_pattern(rule) {
        Ok(re) => re.is_match(&to_text(value)),
        Err(e) => {
            log::warn!("Invalid validation pattern {}: {}", rule, e);
            false
        }
    }
}

/// Seconds since the epoch for a numeric string or a date, 0 when unparseable
#[must_use]
pub fn parse_timestamp(text: &str) -> i64 {
    let text = text.trim();
    if let Ok(secs) = text.parse::<i64>() {
        return secs;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return dt.timestamp();
    }
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        });
    naive
        .and_then(|n| Local.from_local_datetime(&n).earliest())
        .map_or(0, |dt| dt.timestamp())
}

fn in_range(value: &Value, min: &Value, max: &Value) -> bool {
    let ge_min = matches!(loose_cmp(value, min), Some(Ordering::Greater | Ordering::Equal));
    let le_max = matches!(loose_cmp(value, max), Some(Ordering::Less | Ordering::Equal));
    ge_min && le_max
}

/// Evaluate a context-free check against one value
///
/// Returns `None` for checks that need the record, the model or the database
/// (function, callback, confirm, unique).
#[must_use]
pub fn check_value(value: &Value, check: &Check) -> Option<bool> {
    let passed = match check {
        Check::Regex(rule) => matches_regex(value, rule),
        Check::In(list) => list.iter().any(|item| loose_eq(value, item)),
        Check::NotIn(list) => !list.iter().any(|item| loose_eq(value, item)),
        Check::Between { min, max } => in_range(value, min, max),
        Check::NotBetween { min, max } => {
            matches!(loose_cmp(value, min), Some(Ordering::Less))
                || matches!(loose_cmp(value, max), Some(Ordering::Greater))
        }
        Check::Equal(expected) => loose_eq(value, expected),
        Check::NotEqual(expected) => !loose_eq(value, expected),
        Check::Length(rule) => {
            let length = to_text(value).chars().count();
            match rule {
                LengthRule::Exact(n) => length == *n,
                LengthRule::Range { min, max } => length >= *min && length <= *max,
            }
        }
        Check::Expire { start, end } => {
            let now = Local::now().timestamp();
            now >= parse_timestamp(start) && now <= parse_timestamp(end)
        }
        Check::Function { .. } | Check::Callback { .. } | Check::Confirm(_) | Check::Unique => {
            return None
        }
    };
    Some(passed)
}
