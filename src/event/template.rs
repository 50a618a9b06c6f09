//! `{{ expr }}` substitution inside action configs.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::context::Scope;
use crate::expression::{ExpressionError, ExpressionEvaluator};
use crate::value::to_display_string;

lazy_static! {
    static ref WHOLE: Regex = Regex::new(r"^\s*\{\{\s*(.+?)\s*\}\}\s*$").unwrap();
    static ref SEGMENT: Regex = Regex::new(r"\{\{\s*(.+?)\s*\}\}").unwrap();
}

/// Renders one config value. A string that is exactly one `{{ expr }}` becomes
/// the expression's value; other strings have each segment replaced by its
/// display string. Arrays and objects are rendered member by member.
pub fn render_value(
    evaluator: &ExpressionEvaluator,
    value: &Value,
    scope: &Scope,
) -> Result<Value, ExpressionError> {
    match value {
        Value::String(text) => render_string(evaluator, text, scope),
        Value::Array(items) => items
            .iter()
            .map(|item| render_value(evaluator, item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => render_map(evaluator, map, scope).map(Value::Object),
        other => Ok(other.clone()),
    }
}

pub fn render_map(
    evaluator: &ExpressionEvaluator,
    map: &Map<String, Value>,
    scope: &Scope,
) -> Result<Map<String, Value>, ExpressionError> {
    map.iter()
        .map(|(key, value)| Ok((key.clone(), render_value(evaluator, value, scope)?)))
        .collect()
}

fn render_string(
    evaluator: &ExpressionEvaluator,
    text: &str,
    scope: &Scope,
) -> Result<Value, ExpressionError> {
    if let Some(captures) = WHOLE.captures(text) {
        // `{{ a }} and {{ b }}` also matches WHOLE; only a single segment counts.
        if SEGMENT.find_iter(text).count() == 1 {
            return evaluator.execute(&captures[1], scope);
        }
    }
    if !SEGMENT.is_match(text) {
        return Ok(Value::String(text.to_string()));
    }

    let mut failure = None;
    let rendered = SEGMENT.replace_all(text, |captures: &Captures| {
        match evaluator.execute(&captures[1], scope) {
            Ok(value) => to_display_string(&value),
            Err(e) => {
                failure.get_or_insert(e);
                String::new()
            }
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(Value::String(rendered.into_owned())),
    }
}
