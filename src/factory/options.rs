//! Readers for JSON option objects.
//!
//! Every reader names the option block and the field in its error so a
//! misconfigured target or destination can be fixed from the message alone.

use serde_json::{Map, Value};

use crate::utils::{BrokerError, Result};

pub type Options = Map<String, Value>;

/// The option block as a JSON object. `null` counts as an empty object.
pub fn object<'a>(value: &'a Value, block: &str) -> Result<&'a Options> {
    static EMPTY: std::sync::OnceLock<Options> = std::sync::OnceLock::new();
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(EMPTY.get_or_init(Options::new)),
        other => Err(BrokerError::invalid(format!(
            "{block}: expected a JSON object, found {}",
            kind(other)
        ))),
    }
}

/// A present, non-empty string field.
pub fn required_str<'a>(options: &'a Options, block: &str, field: &str) -> Result<&'a str> {
    match options.get(field) {
        None | Some(Value::Null) => Err(BrokerError::invalid(format!(
            "{block}: missing required field '{field}'"
        ))),
        Some(Value::String(s)) if s.is_empty() => Err(BrokerError::invalid(format!(
            "{block}: field '{field}' must not be empty"
        ))),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(BrokerError::invalid(format!(
            "{block}: field '{field}' must be a string, found {}",
            kind(other)
        ))),
    }
}

pub fn optional_str<'a>(options: &'a Options, block: &str, field: &str) -> Result<Option<&'a str>> {
    match options.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(BrokerError::invalid(format!(
            "{block}: field '{field}' must be a string, found {}",
            kind(other)
        ))),
    }
}

pub fn optional_bool(options: &Options, block: &str, field: &str, default: bool) -> Result<bool> {
    match options.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(BrokerError::invalid(format!(
            "{block}: field '{field}' must be a boolean, found {}",
            kind(other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
