//! `${{ expr }}` interpolation for step config values
//!
//! A string made of exactly one placeholder yields the raw expression value,
//! so `"${{ data.items }}"` stays an array. Mixed strings render each value
//! as text. Objects and arrays are walked recursively.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use super::expressions::{try_evaluate, ExpressionError};

static TEMPLATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{\{\s*([^}]+?)\s*\}\}").unwrap());

/// Interpolate every placeholder in a string
pub fn interpolate(
    input: &str,
    data: &Map<String, Value>,
    variables: &Map<String, Value>,
) -> Result<Value, ExpressionError> {
    if let Some(cap) = TEMPLATE_REGEX.captures(input) {
        if let (Some(whole), Some(expr)) = (cap.get(0), cap.get(1)) {
            if whole.start() == 0 && whole.end() == input.len() {
                return try_evaluate(expr.as_str(), data, variables);
            }
        }
    } else {
        return Ok(Value::String(input.to_string()));
    }

    let mut rendered = String::with_capacity(input.len());
    let mut last = 0;
    for cap in TEMPLATE_REGEX.captures_iter(input) {
        let (Some(whole), Some(expr)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        rendered.push_str(&input[last..whole.start()]);
        rendered.push_str(&render(&try_evaluate(expr.as_str(), data, variables)?));
        last = whole.end();
    }
    rendered.push_str(&input[last..]);

    Ok(Value::String(rendered))
}

/// Interpolate strings anywhere inside a JSON value
pub fn interpolate_value(
    value: &Value,
    data: &Map<String, Value>,
    variables: &Map<String, Value>,
) -> Result<Value, ExpressionError> {
    match value {
        Value::String(s) => interpolate(s, data, variables),
        Value::Array(items) => items
            .iter()
            .map(|item| interpolate_value(item, data, variables))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), interpolate_value(item, data, variables)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
