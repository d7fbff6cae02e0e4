use std::sync::OnceLock;

use regex::Regex;

use crate::models::{GenericValue, Number};
use crate::utils::time::parse_yaml_timestamp;

fn decimal_int_re() -> &'static Regex {
    static DECIMAL_INT_RE: OnceLock<Regex> = OnceLock::new();
    DECIMAL_INT_RE.get_or_init(|| Regex::new(r"^[-+]?[0-9]+$").expect("valid yaml int regex"))
}

fn float_re() -> &'static Regex {
    static FLOAT_RE: OnceLock<Regex> = OnceLock::new();
    FLOAT_RE.get_or_init(|| {
        Regex::new(r"^[-+]?(?:\.[0-9]+|[0-9]+(?:\.[0-9]*)?)(?:[eE][-+]?[0-9]+)?$")
            .expect("valid yaml float regex")
    })
}

/// Resolves an unquoted scalar: core-schema null, bool, int and float, then
/// the YAML 1.1 timestamp grammar. Anything else is a string.
///
/// Quoted and block scalars never come through here; they are always strings.
#[must_use]
pub(super) fn resolve_plain_scalar(text: &str) -> GenericValue {
    match text {
        "" | "~" | "null" | "Null" | "NULL" => return GenericValue::Null,
        "true" | "True" | "TRUE" => return GenericValue::Bool(true),
        "false" | "False" | "FALSE" => return GenericValue::Bool(false),
        _ => {}
    }

    if let Some(number) = resolve_number(text) {
        return GenericValue::Number(number);
    }

    match parse_yaml_timestamp(text) {
        Some(timestamp) => GenericValue::Timestamp(timestamp),
        None => GenericValue::String(text.to_string()),
    }
}

fn resolve_number(text: &str) -> Option<Number> {
    if decimal_int_re().is_match(text) {
        if let Ok(value) = text.parse::<i64>() {
            return Some(Number::Int(value));
        }
        if let Ok(value) = text.parse::<u64>() {
            return Some(Number::from_u64(value));
        }
        return text.parse::<f64>().ok().map(Number::Float);
    }

    for (prefix, radix) in [("0x", 16), ("0o", 8)] {
        if let Some(digits) = text.strip_prefix(prefix) {
            if let Ok(value) = u64::from_str_radix(digits, radix) {
                return Some(Number::from_u64(value));
            }
        }
    }

    if float_re().is_match(text) {
        return text.parse::<f64>().ok().map(Number::Float);
    }

    special_float(text).map(Number::Float)
}

fn special_float(text: &str) -> Option<f64> {
    if matches!(text, ".nan" | ".NaN" | ".NAN") {
        return Some(f64::NAN);
    }
    let (sign, body) = match text.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, text.strip_prefix('+').unwrap_or(text)),
    };
    matches!(body, ".inf" | ".Inf" | ".INF").then_some(sign * f64::INFINITY)
}
