// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Built-in value filters.
//!
//! Filters are synchronous transforms over `serde_json` values. Positions
//! are attached by the engine when a filter fails, so the implementations
//! here report faults without location information.

use crate::error::{ParamqlError, RenderFault, Result};
use crate::extensions::FilterExtension;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Returns one instance of every built-in filter.
pub fn builtins() -> Vec<Arc<dyn FilterExtension>> {
    vec![
        Arc::new(Upper),
        Arc::new(Lower),
        Arc::new(Trim),
        Arc::new(Length),
        Arc::new(Default),
        Arc::new(Join),
    ]
}

fn fault(message: impl Into<String>) -> ParamqlError {
    RenderFault::new(message, 0, 0).into()
}

fn expect_string<'a>(name: &str, value: &'a JsonValue) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| fault(format!("filter '{}' expects a string value", name)))
}

fn scalar_to_string(name: &str, value: &JsonValue) -> Result<String> {
    match value {
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::Bool(b) => Ok(b.to_string()),
        JsonValue::Null => Ok(String::new()),
        _ => Err(fault(format!(
            "filter '{}' cannot stringify a nested value",
            name
        ))),
    }
}

/// `upper`: uppercases a string.
pub struct Upper;

impl FilterExtension for Upper {
    fn name(&self) -> &str {
        "upper"
    }
    fn apply(&self, value: &JsonValue, _args: &[JsonValue]) -> Result<JsonValue> {
        Ok(JsonValue::String(
            expect_string(self.name(), value)?.to_uppercase(),
        ))
    }
}

/// `lower`: lowercases a string.
pub struct Lower;

impl FilterExtension for Lower {
    fn name(&self) -> &str {
        "lower"
    }
    fn apply(&self, value: &JsonValue, _args: &[JsonValue]) -> Result<JsonValue> {
        Ok(JsonValue::String(
            expect_string(self.name(), value)?.to_lowercase(),
        ))
    }
}

/// `trim`: strips surrounding whitespace from a string.
pub struct Trim;

impl FilterExtension for Trim {
    fn name(&self) -> &str {
        "trim"
    }
    fn apply(&self, value: &JsonValue, _args: &[JsonValue]) -> Result<JsonValue> {
        Ok(JsonValue::String(
            expect_string(self.name(), value)?.trim().to_string(),
        ))
    }
}

/// `length`: character count of a string, element count of an array or
/// object, 0 for null.
pub struct Length;

impl FilterExtension for Length {
    fn name(&self) -> &str {
        "length"
    }
    fn apply(&self, value: &JsonValue, _args: &[JsonValue]) -> Result<JsonValue> {
        let len = match value {
            JsonValue::String(s) => s.chars().count(),
            JsonValue::Array(items) => items.len(),
            JsonValue::Object(map) => map.len(),
            JsonValue::Null => 0,
            _ => {
                return Err(fault("filter 'length' expects a string, array or object"));
            }
        };
        Ok(JsonValue::from(len))
    }
}

/// `default(fallback)`: substitutes the fallback when the value is null or
/// absent; any other value passes through unchanged.
pub struct Default;

impl FilterExtension for Default {
    fn name(&self) -> &str {
        "default"
    }
    fn apply(&self, value: &JsonValue, args: &[JsonValue]) -> Result<JsonValue> {
        let fallback = args
            .first()
            .ok_or_else(|| fault("filter 'default' requires a fallback argument"))?;
        if value.is_null() {
            Ok(fallback.clone())
        } else {
            Ok(value.clone())
        }
    }
}

/// `join(separator)`: joins an array of scalars; the separator defaults to
/// `", "`.
pub struct Join;

impl FilterExtension for Join {
    fn name(&self) -> &str {
        "join"
    }
    fn apply(&self, value: &JsonValue, args: &[JsonValue]) -> Result<JsonValue> {
        let items = value
            .as_array()
            .ok_or_else(|| fault("filter 'join' expects an array"))?;
        let separator = match args.first() {
            Some(JsonValue::String(s)) => s.clone(),
            Some(_) => return Err(fault("filter 'join' separator must be a string")),
            None => ", ".to_string(),
        };

        let parts: Result<Vec<String>> = items
            .iter()
            .map(|item| scalar_to_string(self.name(), item))
            .collect();
        Ok(JsonValue::String(parts?.join(&separator)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upper_and_lower() {
        assert_eq!(
            Upper.apply(&json!("select"), &[]).unwrap(),
            json!("SELECT")
        );
        assert_eq!(Lower.apply(&json!("FROM"), &[]).unwrap(), json!("from"));
    }

    #[test]
    fn upper_rejects_non_string() {
        let err = Upper.apply(&json!(3), &[]).unwrap_err();
        assert!(err.to_string().contains("expects a string"));
    }

    #[test]
    fn length_counts_strings_and_arrays() {
        assert_eq!(Length.apply(&json!("abc"), &[]).unwrap(), json!(3));
        assert_eq!(Length.apply(&json!([1, 2]), &[]).unwrap(), json!(2));
        assert_eq!(Length.apply(&JsonValue::Null, &[]).unwrap(), json!(0));
    }

    #[test]
    fn default_substitutes_null_only() {
        assert_eq!(
            Default.apply(&JsonValue::Null, &[json!(10)]).unwrap(),
            json!(10)
        );
        assert_eq!(Default.apply(&json!(0), &[json!(10)]).unwrap(), json!(0));
    }

    #[test]
    fn join_with_and_without_separator() {
        assert_eq!(
            Join.apply(&json!([1, 2, 3]), &[json!(" AND ")]).unwrap(),
            json!("1 AND 2 AND 3")
        );
        assert_eq!(
            Join.apply(&json!(["a", "b"]), &[]).unwrap(),
            json!("a, b")
        );
    }
}
