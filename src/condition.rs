//! Boolean predicates gating node presence and action execution.

use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::context::{NamespaceKind, RenderContext};
use crate::expression::{ExpressionError, ExpressionEvaluator};
use crate::path;
use crate::schema::{Condition, ConditionOperator, Logic};
use crate::value::{is_empty, is_truthy, strict_equals, to_display_string, to_number};

#[derive(Error, Debug)]
pub enum ConditionError {
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error("invalid pattern `{pattern}`")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Evaluates [`Condition`]s. Errors never escape [`evaluate`](Self::evaluate):
/// they are logged and the condition counts as `false`.
#[derive(Debug, Clone)]
pub struct ConditionEvaluator {
    expressions: Arc<ExpressionEvaluator>,
    patterns: Arc<DashMap<String, Regex>>,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(ExpressionEvaluator::new()))
    }
}

impl ConditionEvaluator {
    pub fn new(expressions: Arc<ExpressionEvaluator>) -> Self {
        Self {
            expressions,
            patterns: Arc::new(DashMap::new()),
        }
    }

    pub fn evaluate(&self, condition: &Condition, context: &RenderContext) -> bool {
        match self.try_evaluate(condition, context) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Condition evaluation failed, treating as false: {}", e);
                false
            }
        }
    }

    pub fn evaluate_all(&self, conditions: &[Condition], context: &RenderContext) -> Vec<bool> {
        conditions
            .iter()
            .map(|condition| self.evaluate(condition, context))
            .collect()
    }

    /// Evaluates without the fail-closed wrapper. Sub-conditions of a
    /// `complex` condition are still evaluated fail-closed individually.
    pub fn try_evaluate(
        &self,
        condition: &Condition,
        context: &RenderContext,
    ) -> Result<bool, ConditionError> {
        match condition {
            Condition::Simple {
                field,
                operator,
                value,
            } => {
                let Some(operator) = operator else {
                    return Ok(true);
                };
                if field.is_empty() {
                    return Ok(true);
                }
                let actual = resolve_field(field, context);
                self.compare(operator, &actual, value)
            }
            Condition::Complex { logic, conditions } => Ok(match logic {
                Logic::And => conditions.iter().all(|c| self.evaluate(c, context)),
                Logic::Or => {
                    conditions.is_empty() || conditions.iter().any(|c| self.evaluate(c, context))
                }
            }),
            Condition::Raw { expression } => {
                let result = self.expressions.execute(expression, &context.to_scope())?;
                Ok(is_truthy(&result))
            }
            Condition::Unknown => {
                tracing::warn!("Unknown condition type, treating as true");
                Ok(true)
            }
        }
    }

    fn compare(
        &self,
        operator: &ConditionOperator,
        actual: &Value,
        expected: &Value,
    ) -> Result<bool, ConditionError> {
        use std::cmp::Ordering;

        let text = |v: &Value| to_display_string(v);
        Ok(match operator {
            ConditionOperator::Equals => strict_equals(actual, expected),
            ConditionOperator::NotEquals => !strict_equals(actual, expected),
            ConditionOperator::Contains => contains(actual, expected),
            ConditionOperator::NotContains => !contains(actual, expected),
            ConditionOperator::GreaterThan => numeric(actual, expected) == Some(Ordering::Greater),
            ConditionOperator::LessThan => numeric(actual, expected) == Some(Ordering::Less),
            ConditionOperator::GreaterThanOrEqual => matches!(
                numeric(actual, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            ConditionOperator::LessThanOrEqual => matches!(
                numeric(actual, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            ConditionOperator::IsEmpty => is_empty(actual),
            ConditionOperator::IsNotEmpty => !is_empty(actual),
            ConditionOperator::In => match expected {
                Value::Array(options) => options.iter().any(|o| strict_equals(o, actual)),
                _ => false,
            },
            ConditionOperator::NotIn => match expected {
                Value::Array(options) => !options.iter().any(|o| strict_equals(o, actual)),
                _ => false,
            },
            ConditionOperator::StartsWith => text(actual).starts_with(&text(expected)),
            ConditionOperator::EndsWith => text(actual).ends_with(&text(expected)),
            ConditionOperator::Matches => self.pattern(&text(expected))?.is_match(&text(actual)),
            ConditionOperator::Unknown(name) => {
                tracing::warn!("Unknown condition operator `{}`, treating as true", name);
                true
            }
        })
    }

    fn pattern(&self, source: &str) -> Result<Regex, ConditionError> {
        if let Some(regex) = self.patterns.get(source) {
            return Ok(regex.value().clone());
        }
        let regex = Regex::new(source).map_err(|e| ConditionError::InvalidPattern {
            pattern: source.to_string(),
            source: e,
        })?;
        self.patterns.insert(source.to_string(), regex.clone());
        Ok(regex)
    }
}

/// Resolves `root.rest` against the namespace named by `root`; any other
/// root is looked up as a whole path inside `data`.
fn resolve_field(field: &str, context: &RenderContext) -> Value {
    let (root, rest) = field.split_once('.').unwrap_or((field, ""));
    match root.parse::<NamespaceKind>() {
        Ok(kind) => context.lookup(kind, rest),
        Err(_) => path::lookup(&context.snapshot(NamespaceKind::Data), field),
    }
}

/// Sequence membership for arrays, substring containment otherwise.
fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| strict_equals(item, expected)),
        other => to_display_string(other).contains(&to_display_string(expected)),
    }
}

fn numeric(actual: &Value, expected: &Value) -> Option<std::cmp::Ordering> {
    to_number(actual).partial_cmp(&to_number(expected))
}
