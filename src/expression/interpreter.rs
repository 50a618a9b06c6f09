//! Tree-walking evaluation of a parsed [`Expr`] against an explicit scope.

use serde_json::{Map, Value};

use super::builtins;
use super::parser::{BinaryOp, Expr, LogicalOp, UnaryOp};
use super::EvalFault;
use crate::context::Scope;
use crate::value::{
    compare, is_truthy, loose_equals, number_value, strict_equals, to_display_string, to_number,
    type_name,
};

pub struct Interpreter<'s> {
    scope: &'s Scope,
}

impl<'s> Interpreter<'s> {
    pub fn new(scope: &'s Scope) -> Self {
        Self { scope }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, EvalFault> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Identifier(name) => self
                .scope
                .get(name)
                .cloned()
                .ok_or_else(|| EvalFault::UndefinedVariable(name.clone())),
            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Object(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval(value)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Member { .. } | Expr::Index { .. } | Expr::Call { .. } => {
                Ok(self.eval_chain(expr)?.unwrap_or(Value::Null))
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!is_truthy(&value)),
                    UnaryOp::Negate => number_value(-to_number(&value)),
                    UnaryOp::Plus => number_value(to_number(&value)),
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left)?;
                let take_left = match op {
                    LogicalOp::And => !is_truthy(&left),
                    LogicalOp::Or => is_truthy(&left),
                    LogicalOp::Nullish => !left.is_null(),
                };
                if take_left {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if is_truthy(&self.eval(test)?) {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
        }
    }

    /// Evaluates a member/index/call chain. `None` means an optional link met
    /// `null` and the rest of the chain was skipped.
    fn eval_chain(&self, expr: &Expr) -> Result<Option<Value>, EvalFault> {
        match expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                if let Some(constant) = self.static_constant(object, property) {
                    return Ok(Some(constant));
                }
                let Some(target) = self.eval_link(object)? else {
                    return Ok(None);
                };
                if target.is_null() {
                    return if *optional {
                        Ok(None)
                    } else {
                        Err(EvalFault::NullAccess {
                            property: property.clone(),
                        })
                    };
                }
                Ok(Some(get_property(&target, property)))
            }
            Expr::Index {
                object,
                index,
                optional,
            } => {
                let Some(target) = self.eval_link(object)? else {
                    return Ok(None);
                };
                let index = self.eval(index)?;
                if target.is_null() {
                    return if *optional {
                        Ok(None)
                    } else {
                        Err(EvalFault::NullAccess {
                            property: to_display_string(&index),
                        })
                    };
                }
                Ok(Some(get_index(&target, &index)))
            }
            Expr::Call {
                callee,
                arguments,
                optional,
            } => self.eval_call(callee, arguments, *optional),
            other => self.eval(other).map(Some),
        }
    }

    fn eval_link(&self, expr: &Expr) -> Result<Option<Value>, EvalFault> {
        match expr {
            Expr::Member { .. } | Expr::Index { .. } | Expr::Call { .. } => self.eval_chain(expr),
            other => self.eval(other).map(Some),
        }
    }

    fn eval_call(
        &self,
        callee: &Expr,
        arguments: &[Expr],
        optional: bool,
    ) -> Result<Option<Value>, EvalFault> {
        let args = || {
            arguments
                .iter()
                .map(|arg| self.eval(arg))
                .collect::<Result<Vec<_>, _>>()
        };

        match callee {
            Expr::Identifier(name) => builtins::call_global(name, &args()?).map(Some),
            Expr::Member {
                object,
                property,
                optional: optional_member,
            } => {
                if let Expr::Identifier(namespace) = object.as_ref() {
                    if self.is_builtin_namespace(namespace) {
                        return builtins::call_static(namespace, property, &args()?).map(Some);
                    }
                }
                let Some(receiver) = self.eval_link(object)? else {
                    return Ok(None);
                };
                if receiver.is_null() {
                    return if *optional_member || optional {
                        Ok(None)
                    } else {
                        Err(EvalFault::NullAccess {
                            property: property.clone(),
                        })
                    };
                }
                builtins::call_method(&receiver, property, &args()?).map(Some)
            }
            _ => Err(EvalFault::UnknownFunction("<computed callee>".to_string())),
        }
    }

    /// `Math`, `JSON`, `Date`, `Object` and `Array` resolve to the built-in
    /// namespaces unless the scope shadows them.
    fn is_builtin_namespace(&self, name: &str) -> bool {
        builtins::is_namespace(name) && !self.scope.contains_key(name)
    }

    fn static_constant(&self, object: &Expr, property: &str) -> Option<Value> {
        match object {
            Expr::Identifier(namespace) if self.is_builtin_namespace(namespace) => {
                builtins::constant(namespace, property)
            }
            _ => None,
        }
    }
}

fn get_property(target: &Value, property: &str) -> Value {
    match (target, property) {
        (Value::String(s), "length") => Value::from(s.chars().count()),
        (Value::Array(items), "length") => Value::from(items.len()),
        (Value::Object(map), key) => map.get(key).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn get_index(target: &Value, index: &Value) -> Value {
    match (target, index) {
        (Value::Array(items), Value::Number(_)) => {
            let i = to_number(index);
            if i >= 0.0 && i.fract() == 0.0 {
                items.get(i as usize).cloned().unwrap_or(Value::Null)
            } else {
                Value::Null
            }
        }
        (Value::String(s), Value::Number(_)) => {
            let i = to_number(index);
            if i >= 0.0 && i.fract() == 0.0 {
                s.chars()
                    .nth(i as usize)
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or(Value::Null)
            } else {
                Value::Null
            }
        }
        (Value::Object(map), key) => map.get(&to_display_string(key)).cloned().unwrap_or(Value::Null),
        (other, Value::String(key)) => get_property(other, key),
        _ => Value::Null,
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalFault> {
    use std::cmp::Ordering;

    Ok(match op {
        BinaryOp::Add => {
            let concatenates = |v: &Value| matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_));
            if concatenates(left) || concatenates(right) {
                Value::String(to_display_string(left) + &to_display_string(right))
            } else {
                number_value(to_number(left) + to_number(right))
            }
        }
        BinaryOp::Subtract => number_value(to_number(left) - to_number(right)),
        BinaryOp::Multiply => number_value(to_number(left) * to_number(right)),
        BinaryOp::Divide | BinaryOp::Modulo => {
            let divisor = to_number(right);
            if divisor == 0.0 {
                return Err(EvalFault::DivisionByZero);
            }
            let dividend = to_number(left);
            if op == BinaryOp::Divide {
                number_value(dividend / divisor)
            } else {
                number_value(dividend % divisor)
            }
        }
        BinaryOp::Equal => Value::Bool(loose_equals(left, right)),
        BinaryOp::NotEqual => Value::Bool(!loose_equals(left, right)),
        BinaryOp::StrictEqual => Value::Bool(strict_equals(left, right)),
        BinaryOp::StrictNotEqual => Value::Bool(!strict_equals(left, right)),
        BinaryOp::Less => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::LessEqual => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Greater => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::GreaterEqual => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
    })
}

/// Fault for an operation applied to a value of the wrong shape.
pub(super) fn mismatch(operation: &str, found: &Value) -> EvalFault {
    EvalFault::TypeMismatch {
        operation: operation.to_string(),
        found: type_name(found),
    }
}
