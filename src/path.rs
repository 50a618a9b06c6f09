//! Dotted data paths such as `orders[2].items[0].name`.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("cannot assign through `{segment}`: parent is a {found}")]
    NotAContainer { segment: String, found: &'static str },

    #[error("index {index} is out of bounds for an array of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("empty path")]
    Empty,
}

/// Splits a path into segments. Bracket suffixes with a numeric body become
/// index segments; any other bracket body is treated as a quoted key.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    for part in path.split('.').filter(|p| !p.is_empty()) {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if !key.is_empty() {
            segments.push(PathSegment::Key(key.to_string()));
        }
        while let Some(stripped) = rest.strip_prefix('[') {
            let Some(end) = stripped.find(']') else {
                // Unterminated bracket: keep the raw text as a key.
                segments.push(PathSegment::Key(rest.to_string()));
                break;
            };
            let body = &stripped[..end];
            match body.parse::<usize>() {
                Ok(index) => segments.push(PathSegment::Index(index)),
                Err(_) => segments.push(PathSegment::Key(
                    body.trim_matches(|c| c == '"' || c == '\'').to_string(),
                )),
            }
            rest = &stripped[end + 1..];
        }
    }
    segments
}

/// Walks `segments` from `root`. Missing links yield `None`.
pub fn get_path<'a>(root: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    segments.iter().try_fold(root, |current, segment| match (segment, current) {
        (PathSegment::Key(key), Value::Object(map)) => map.get(key),
        (PathSegment::Index(index), Value::Array(items)) => items.get(*index),
        (PathSegment::Key(key), Value::Array(items)) => {
            key.parse::<usize>().ok().and_then(|i| items.get(i))
        }
        _ => None,
    })
}

/// Convenience wrapper resolving a textual path to an owned value (`null` when missing).
pub fn lookup(root: &Value, path: &str) -> Value {
    get_path(root, &parse_path(path)).cloned().unwrap_or(Value::Null)
}

/// Writes `value` at `segments` under `root`, creating intermediate maps as needed.
/// Appending at `len` extends an array by one.
pub fn set_path(root: &mut Value, segments: &[PathSegment], value: Value) -> Result<(), PathError> {
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut current = root;
    for segment in parents {
        current = child_mut(current, segment)?;
    }

    match last {
        PathSegment::Key(key) => {
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
            match current {
                Value::Object(map) => {
                    map.insert(key.clone(), value);
                    Ok(())
                }
                other => Err(PathError::NotAContainer {
                    segment: key.clone(),
                    found: crate::value::type_name(other),
                }),
            }
        }
        PathSegment::Index(index) => match current {
            Value::Array(items) if *index < items.len() => {
                items[*index] = value;
                Ok(())
            }
            Value::Array(items) if *index == items.len() => {
                items.push(value);
                Ok(())
            }
            Value::Array(items) => Err(PathError::IndexOutOfBounds {
                index: *index,
                len: items.len(),
            }),
            other => Err(PathError::NotAContainer {
                segment: format!("[{}]", index),
                found: crate::value::type_name(other),
            }),
        },
    }
}

fn child_mut<'a>(current: &'a mut Value, segment: &PathSegment) -> Result<&'a mut Value, PathError> {
    match segment {
        PathSegment::Key(key) => {
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
            match current {
                Value::Object(map) => Ok(map.entry(key.clone()).or_insert(Value::Null)),
                other => Err(PathError::NotAContainer {
                    segment: key.clone(),
                    found: crate::value::type_name(other),
                }),
            }
        }
        PathSegment::Index(index) => match current {
            Value::Array(items) => {
                let len = items.len();
                items
                    .get_mut(*index)
                    .ok_or(PathError::IndexOutOfBounds { index: *index, len })
            }
            other => Err(PathError::NotAContainer {
                segment: format!("[{}]", index),
                found: crate::value::type_name(other),
            }),
        },
    }
}
