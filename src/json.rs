//! Lenient accessors for provider payloads, where fields may be missing,
//! mistyped or spelled two ways.

use serde_json::Value;

use crate::clock::{ms_from_timestamp, parse_iso_ms};

pub fn get_path_value<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for segment in path {
        current = current.get(*segment)?;
    }
    Some(current)
}

pub fn get_path_string(root: &Value, path: &[&str]) -> Option<String> {
    value_as_string(get_path_value(root, path))
}

/// Trimmed, non-empty string contents.
pub fn value_as_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(raw)) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        _ => None,
    }
}

pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64().filter(|number| number.is_finite()),
        Value::String(raw) => raw.trim().parse::<f64>().ok().filter(|number| number.is_finite()),
        _ => None,
    }
}

pub fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(raw) => match raw.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// First key present on the object, for payloads mixing snake_case and camelCase.
pub fn first_field<'a>(root: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| root.get(*key))
        .find(|value| !value.is_null())
}

pub fn first_f64(root: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| root.get(*key))
        .find_map(value_as_f64)
}

/// Epoch milliseconds from a numeric timestamp (seconds or millis) or an
/// RFC 3339 string.
pub fn value_as_epoch_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_f64().and_then(ms_from_timestamp),
        Value::String(raw) => {
            if let Ok(number) = raw.trim().parse::<f64>() {
                return ms_from_timestamp(number);
            }
            parse_iso_ms(raw)
        }
        _ => None,
    }
}
