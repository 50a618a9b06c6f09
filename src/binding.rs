//! Computes property values from [`Binding`]s at render time.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::context::{NamespaceKind, RenderContext};
use crate::expression::{ExpressionError, ExpressionEvaluator};
use crate::schema::{Binding, BindingKind, BindingMode};

#[derive(Error, Debug)]
pub enum BindingError {
    #[error("binding `{target}` failed")]
    Expression {
        target: String,
        #[source]
        source: ExpressionError,
    },

    #[error("binding `{target}` of kind `{kind}` needs a string source, got {found}")]
    InvalidSource {
        target: String,
        kind: String,
        found: &'static str,
    },
}

/// Resolves bindings against a [`RenderContext`].
///
/// Failures degrade: the binding's `defaultValue` is used when present,
/// otherwise `null`. Only bindings in [`BindingMode::Strict`] without a
/// default surface the error.
#[derive(Debug, Clone)]
pub struct DataBindingResolver {
    expressions: Arc<ExpressionEvaluator>,
}

impl Default for DataBindingResolver {
    fn default() -> Self {
        Self::new(Arc::new(ExpressionEvaluator::new()))
    }
}

impl DataBindingResolver {
    pub fn new(expressions: Arc<ExpressionEvaluator>) -> Self {
        Self { expressions }
    }

    pub fn resolve(&self, binding: &Binding, context: &RenderContext) -> Result<Value, BindingError> {
        match self.try_resolve(binding, context) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::error!("Data binding resolution error: {}", e);
                if let Some(default) = &binding.default_value {
                    Ok(default.clone())
                } else if binding.mode == BindingMode::Strict {
                    Err(e)
                } else {
                    Ok(Value::Null)
                }
            }
        }
    }

    /// Resolves every binding, in order.
    pub fn resolve_all(
        &self,
        bindings: &[Binding],
        context: &RenderContext,
    ) -> Result<Vec<Value>, BindingError> {
        bindings
            .iter()
            .map(|binding| self.resolve(binding, context))
            .collect()
    }

    fn try_resolve(&self, binding: &Binding, context: &RenderContext) -> Result<Value, BindingError> {
        let raw = match &binding.kind {
            BindingKind::Static => binding.source.clone(),
            BindingKind::Expression | BindingKind::Computed => {
                let expression = source_text(binding)?;
                self.expressions
                    .execute(expression, &context.to_scope())
                    .map_err(|source| BindingError::Expression {
                        target: binding.target.clone(),
                        source,
                    })?
            }
            BindingKind::Datasource => context.lookup(NamespaceKind::Data, source_text(binding)?),
            BindingKind::State => context.lookup(NamespaceKind::State, source_text(binding)?),
            BindingKind::Variable => context.lookup(NamespaceKind::Variables, source_text(binding)?),
            BindingKind::Context => resolve_context_path(source_text(binding)?, context),
            BindingKind::Unknown(kind) => {
                tracing::warn!("Unknown binding type `{}` on `{}`", kind, binding.target);
                Value::Null
            }
        };

        if raw.is_null() {
            if let Some(default) = &binding.default_value {
                return Ok(default.clone());
            }
        }

        Ok(match &binding.transform {
            Some(transform) => self.apply_transform(raw, transform, context),
            None => raw,
        })
    }

    /// Evaluates `transform` with the resolved value bound as `value`. A
    /// failing transform leaves the value untouched.
    fn apply_transform(&self, value: Value, transform: &str, context: &RenderContext) -> Value {
        let mut scope = context.to_scope();
        scope.insert("value".to_string(), value.clone());
        match self.expressions.execute(transform, &scope) {
            Ok(transformed) => transformed,
            Err(e) => {
                tracing::error!("Transform error: {}", e);
                value
            }
        }
    }
}

fn source_text(binding: &Binding) -> Result<&str, BindingError> {
    binding.source_str().ok_or_else(|| BindingError::InvalidSource {
        target: binding.target.clone(),
        kind: binding.kind.to_string(),
        found: crate::value::type_name(&binding.source),
    })
}

/// `context` bindings may only reach `user`, `tenant`, `params` and `query`.
fn resolve_context_path(source: &str, context: &RenderContext) -> Value {
    let (root, rest) = source.split_once('.').unwrap_or((source, ""));
    match root.parse::<NamespaceKind>() {
        Ok(
            kind @ (NamespaceKind::User
            | NamespaceKind::Tenant
            | NamespaceKind::Params
            | NamespaceKind::Query),
        ) => context.lookup(kind, rest),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> RenderContext {
        let ctx = RenderContext::new()
            .with_data(json!({"orders": [{"id": "o1"}, {"id": "o2", "lines": [10, 20]}]}))
            .with_state(json!({"count": 5}))
            .with_params(json!({"page": 2}))
            .with_user(json!({"name": "Ann"}));
        ctx.variables.insert("theme".to_string(), json!("dark"));
        ctx
    }

    fn resolve(binding: Binding) -> Result<Value, BindingError> {
        DataBindingResolver::default().resolve(&binding, &context())
    }

    #[test]
    fn test_state_binding_and_default() {
        assert_eq!(
            resolve(Binding::new("text", BindingKind::State, json!("count"))).unwrap(),
            json!(5)
        );
        let empty = RenderContext::new();
        let binding = Binding::new("text", BindingKind::State, json!("count")).with_default(json!(0));
        assert_eq!(
            DataBindingResolver::default().resolve(&binding, &empty).unwrap(),
            json!(0)
        );
    }

    #[test]
    fn test_every_kind() {
        assert_eq!(
            resolve(Binding::new("a", BindingKind::Static, json!({"x": 1}))).unwrap(),
            json!({"x": 1})
        );
        assert_eq!(
            resolve(Binding::new("a", BindingKind::Expression, json!("state.count * 2"))).unwrap(),
            json!(10)
        );
        assert_eq!(
            resolve(Binding::new("a", BindingKind::Computed, json!("user.name + '!'"))).unwrap(),
            json!("Ann!")
        );
        assert_eq!(
            resolve(Binding::new("a", BindingKind::Datasource, json!("orders[1].lines[1]"))).unwrap(),
            json!(20)
        );
        assert_eq!(
            resolve(Binding::new("a", BindingKind::Variable, json!("theme"))).unwrap(),
            json!("dark")
        );
        assert_eq!(
            resolve(Binding::new("a", BindingKind::Context, json!("params.page"))).unwrap(),
            json!(2)
        );
        assert_eq!(
            resolve(Binding::new("a", BindingKind::Context, json!("state.count"))).unwrap(),
            json!(null)
        );
    }

    #[test]
    fn test_failure_modes() {
        let broken = Binding::new("a", BindingKind::Expression, json!("missing.value"));
        assert_eq!(resolve(broken.clone()).unwrap(), json!(null));
        assert_eq!(
            resolve(broken.clone().with_default(json!("fallback"))).unwrap(),
            json!("fallback")
        );
        assert!(matches!(
            resolve(broken.clone().with_mode(BindingMode::Strict)),
            Err(BindingError::Expression { .. })
        ));
        assert_eq!(
            resolve(broken.with_mode(BindingMode::Strict).with_default(json!(1))).unwrap(),
            json!(1)
        );
        assert!(matches!(
            resolve(Binding::new("a", BindingKind::State, json!(3)).with_mode(BindingMode::Strict)),
            Err(BindingError::InvalidSource { .. })
        ));
    }

    #[test]
    fn test_transform() {
        let binding = Binding::new("a", BindingKind::State, json!("count")).with_transform("value * 100");
        assert_eq!(resolve(binding).unwrap(), json!(500));
        let failing = Binding::new("a", BindingKind::State, json!("count")).with_transform("value.x.y");
        assert_eq!(resolve(failing).unwrap(), json!(5));
    }

    #[test]
    fn test_static_and_pure_expressions_are_idempotent() {
        let resolver = DataBindingResolver::default();
        let ctx = context();
        for binding in [
            Binding::new("a", BindingKind::Static, json!([1, 2])),
            Binding::new("b", BindingKind::Expression, json!("state.count + params.page")),
        ] {
            let first = resolver.resolve(&binding, &ctx).unwrap();
            let second = resolver.resolve(&binding, &ctx).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_resolve_all_keeps_order() {
        let values = DataBindingResolver::default()
            .resolve_all(
                &[
                    Binding::new("a", BindingKind::Static, json!(1)),
                    Binding::new("b", BindingKind::State, json!("count")),
                    Binding::new("c", BindingKind::Unknown("magic".to_string()), json!(null)),
                ],
                &context(),
            )
            .unwrap();
        assert_eq!(values, vec![json!(1), json!(5), json!(null)]);
    }
}
