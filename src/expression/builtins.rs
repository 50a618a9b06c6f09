//! The fixed function set callable from expressions.
//!
//! Three call shapes exist: global functions (`parseInt(x)`), namespace
//! statics (`Math.max(a, b)`) and value methods (`name.toUpperCase()`).
//! Nothing outside this module is reachable from an expression.

use serde_json::{Map, Value};

use super::interpreter::mismatch;
use super::EvalFault;
use crate::value::{is_truthy, number_value, strict_equals, to_display_string, to_number};

const NAMESPACES: [&str; 5] = ["Math", "JSON", "Date", "Object", "Array"];

pub fn is_namespace(name: &str) -> bool {
    NAMESPACES.contains(&name)
}

pub fn constant(namespace: &str, name: &str) -> Option<Value> {
    match (namespace, name) {
        ("Math", "PI") => Some(number_value(std::f64::consts::PI)),
        ("Math", "E") => Some(number_value(std::f64::consts::E)),
        _ => None,
    }
}

fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&Value::Null)
}

fn require(function: &str, args: &[Value], expected: usize) -> Result<(), EvalFault> {
    if args.len() < expected {
        return Err(EvalFault::ArgumentCount {
            function: function.to_string(),
            expected,
            found: args.len(),
        });
    }
    Ok(())
}

pub fn call_global(name: &str, args: &[Value]) -> Result<Value, EvalFault> {
    match name {
        "String" => Ok(Value::String(
            args.first().map(to_display_string).unwrap_or_default(),
        )),
        "Number" => Ok(args
            .first()
            .map(|v| number_value(to_number(v)))
            .unwrap_or(Value::from(0))),
        "Boolean" => Ok(Value::Bool(is_truthy(arg(args, 0)))),
        "parseInt" => {
            require(name, args, 1)?;
            let radix = match args.get(1) {
                Some(r) if !r.is_null() => to_number(r) as u32,
                _ => 10,
            };
            Ok(parse_int(&to_display_string(&args[0]), radix))
        }
        "parseFloat" => {
            require(name, args, 1)?;
            Ok(parse_float(&to_display_string(&args[0])))
        }
        "isNaN" => Ok(Value::Bool(to_number(arg(args, 0)).is_nan())),
        "isFinite" => Ok(Value::Bool(to_number(arg(args, 0)).is_finite())),
        other => Err(EvalFault::UnknownFunction(other.to_string())),
    }
}

pub fn call_static(namespace: &str, name: &str, args: &[Value]) -> Result<Value, EvalFault> {
    let qualified = || format!("{}.{}", namespace, name);
    match (namespace, name) {
        ("Math", "max") => Ok(number_value(
            args.iter().map(to_number).fold(f64::NEG_INFINITY, f64::max),
        )),
        ("Math", "min") => Ok(number_value(
            args.iter().map(to_number).fold(f64::INFINITY, f64::min),
        )),
        ("Math", "pow") => {
            require(&qualified(), args, 2)?;
            Ok(number_value(to_number(&args[0]).powf(to_number(&args[1]))))
        }
        ("Math", unary) => {
            let f: fn(f64) -> f64 = match unary {
                "abs" => f64::abs,
                "ceil" => f64::ceil,
                "floor" => f64::floor,
                "round" => |x: f64| (x + 0.5).floor(),
                "sqrt" => f64::sqrt,
                "trunc" => f64::trunc,
                "sign" => |x: f64| if x == 0.0 { 0.0 } else { x.signum() },
                _ => return Err(EvalFault::UnknownFunction(qualified())),
            };
            require(&qualified(), args, 1)?;
            Ok(number_value(f(to_number(&args[0]))))
        }
        ("JSON", "stringify") => serde_json::to_string(arg(args, 0))
            .map(Value::String)
            .map_err(|e| EvalFault::InvalidArgument {
                function: qualified(),
                message: e.to_string(),
            }),
        ("JSON", "parse") => {
            require(&qualified(), args, 1)?;
            match &args[0] {
                Value::String(text) => {
                    serde_json::from_str(text).map_err(|e| EvalFault::InvalidArgument {
                        function: qualified(),
                        message: e.to_string(),
                    })
                }
                other => Err(mismatch("JSON.parse", other)),
            }
        }
        ("Date", "now") => Ok(Value::from(chrono::Utc::now().timestamp_millis())),
        ("Object", "keys" | "values" | "entries") => {
            let map = match arg(args, 0) {
                Value::Object(map) => map.clone(),
                Value::Null => return Err(mismatch(&qualified(), &Value::Null)),
                _ => Map::new(),
            };
            Ok(Value::Array(match name {
                "keys" => map.keys().cloned().map(Value::String).collect(),
                "values" => map.values().cloned().collect(),
                _ => map
                    .into_iter()
                    .map(|(k, v)| Value::Array(vec![Value::String(k), v]))
                    .collect(),
            }))
        }
        ("Array", "isArray") => Ok(Value::Bool(arg(args, 0).is_array())),
        _ => Err(EvalFault::UnknownFunction(qualified())),
    }
}

pub fn call_method(receiver: &Value, name: &str, args: &[Value]) -> Result<Value, EvalFault> {
    match (receiver, name) {
        (_, "toString") => Ok(Value::String(to_display_string(receiver))),
        (Value::String(s), _) => string_method(s, name, args),
        (Value::Array(items), _) => array_method(items, name, args),
        (Value::Number(_), "toFixed") => {
            let digits = to_number(arg(args, 0)).clamp(0.0, 100.0) as usize;
            Ok(Value::String(format!("{:.*}", digits, to_number(receiver))))
        }
        _ => Err(EvalFault::UnknownFunction(format!(
            "{}.{}",
            crate::value::type_name(receiver),
            name
        ))),
    }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Result<Value, EvalFault> {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let text_arg = |i: usize| to_display_string(arg(args, i));

    Ok(match name {
        "toUpperCase" => Value::String(s.to_uppercase()),
        "toLowerCase" => Value::String(s.to_lowercase()),
        "trim" => Value::String(s.trim().to_string()),
        "includes" => Value::Bool(s.contains(&text_arg(0))),
        "startsWith" => Value::Bool(s.starts_with(&text_arg(0))),
        "endsWith" => Value::Bool(s.ends_with(&text_arg(0))),
        "indexOf" => {
            let needle = text_arg(0);
            match s.find(&needle) {
                Some(byte) => Value::from(s[..byte].chars().count()),
                None => Value::from(-1),
            }
        }
        "charAt" => {
            let i = to_number(arg(args, 0));
            let c = if i >= 0.0 { chars.get(i as usize) } else { None };
            Value::String(c.map(|c| c.to_string()).unwrap_or_default())
        }
        "slice" => {
            let (start, end) = slice_bounds(args, len);
            Value::String(chars[start..end.max(start)].iter().collect())
        }
        "substring" => {
            let clamp = |v: &Value, fallback: usize| match v {
                Value::Null => fallback,
                v => {
                    let n = to_number(v);
                    if n.is_nan() || n < 0.0 {
                        0
                    } else {
                        (n as usize).min(len)
                    }
                }
            };
            let a = clamp(arg(args, 0), 0);
            let b = clamp(arg(args, 1), len);
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            Value::String(chars[start..end].iter().collect())
        }
        "split" => match args.first() {
            None | Some(Value::Null) => Value::Array(vec![Value::String(s.to_string())]),
            Some(sep) => {
                let sep = to_display_string(sep);
                if sep.is_empty() {
                    chars.iter().map(|c| Value::String(c.to_string())).collect()
                } else {
                    s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect()
                }
            }
        },
        "replace" => {
            require("replace", args, 2)?;
            Value::String(s.replacen(&text_arg(0), &text_arg(1), 1))
        }
        "concat" => Value::String(args.iter().fold(s.to_string(), |mut acc, v| {
            acc.push_str(&to_display_string(v));
            acc
        })),
        other => return Err(EvalFault::UnknownFunction(format!("string.{}", other))),
    })
}

fn array_method(items: &[Value], name: &str, args: &[Value]) -> Result<Value, EvalFault> {
    Ok(match name {
        "includes" => Value::Bool(items.iter().any(|item| strict_equals(item, arg(args, 0)))),
        "indexOf" => items
            .iter()
            .position(|item| strict_equals(item, arg(args, 0)))
            .map(Value::from)
            .unwrap_or(Value::from(-1)),
        "join" => {
            let sep = match args.first() {
                None | Some(Value::Null) => ",".to_string(),
                Some(sep) => to_display_string(sep),
            };
            Value::String(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Null => String::new(),
                        other => to_display_string(other),
                    })
                    .collect::<Vec<_>>()
                    .join(&sep),
            )
        }
        "slice" => {
            let (start, end) = slice_bounds(args, items.len());
            Value::Array(items[start..end.max(start)].to_vec())
        }
        "concat" => {
            let mut out = items.to_vec();
            for value in args {
                match value {
                    Value::Array(more) => out.extend(more.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Value::Array(out)
        }
        "reverse" => Value::Array(items.iter().rev().cloned().collect()),
        other => return Err(EvalFault::UnknownFunction(format!("array.{}", other))),
    })
}

/// `slice(start?, end?)` bounds with negative offsets counted from the end.
fn slice_bounds(args: &[Value], len: usize) -> (usize, usize) {
    let resolve = |v: &Value, fallback: usize| -> usize {
        if v.is_null() {
            return fallback;
        }
        let n = to_number(v);
        if n.is_nan() {
            0
        } else if n < 0.0 {
            len.saturating_sub((-n) as usize)
        } else {
            (n as usize).min(len)
        }
    };
    (resolve(arg(args, 0), 0), resolve(arg(args, 1), len))
}

/// Leading-integer parse: optional sign, then digits valid in `radix`.
fn parse_int(text: &str, radix: u32) -> Value {
    if !(2..=36).contains(&radix) {
        return Value::Null;
    }
    let trimmed = text.trim_start();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let digits: String = body.chars().take_while(|c| c.is_digit(radix)).collect();
    match i64::from_str_radix(&digits, radix) {
        Ok(n) => Value::from(if negative { -n } else { n }),
        Err(_) => Value::Null,
    }
}

/// Longest numeric prefix, or `null` when there is none.
fn parse_float(text: &str) -> Value {
    let trimmed = text.trim_start();
    let mut best = None;
    for (i, c) in trimmed.char_indices() {
        if !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')) {
            break;
        }
        if let Ok(n) = trimmed[..i + c.len_utf8()].parse::<f64>() {
            best = Some(n);
        }
    }
    best.map(number_value).unwrap_or(Value::Null)
}
