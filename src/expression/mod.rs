//! A small, side-effect-free expression language.
//!
//! Expressions are parsed once into an [`Expr`] tree and evaluated against an
//! explicit [`Scope`]. Only names present in the scope and the fixed built-in
//! function set are reachable; there is no way to touch the host process.
//!
//! ```
//! use lowcoder_runtime::context::Scope;
//! use lowcoder_runtime::expression::ExpressionEvaluator;
//! use serde_json::json;
//!
//! let evaluator = ExpressionEvaluator::new();
//! let scope = Scope::from([("state".to_string(), json!({"count": 2}))]);
//! assert_eq!(evaluator.execute("state.count * 10", &scope).unwrap(), json!(20));
//! assert_eq!(evaluator.extract_variables("state.count + Math.max(a, 1)"), vec!["state", "a"]);
//! ```

mod builtins;
mod interpreter;
pub mod parser;
pub mod token;

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::context::Scope;
pub use interpreter::Interpreter;
pub use parser::Expr;

/// Default number of parsed expressions retained per evaluator.
pub const DEFAULT_CACHE_SIZE: usize = 512;

lazy_static! {
    static ref RESERVED_WORDS: HashSet<&'static str> = [
        "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete",
        "do", "else", "export", "extends", "finally", "for", "function", "if", "import", "in",
        "instanceof", "let", "new", "return", "super", "switch", "this", "throw", "try",
        "typeof", "var", "void", "while", "with", "yield", "true", "false", "null", "undefined",
    ]
    .into_iter()
    .collect();

    static ref WELL_KNOWN_GLOBALS: HashSet<&'static str> = [
        "Array", "Boolean", "Date", "Error", "Function", "JSON", "Math", "Number", "Object",
        "Promise", "RegExp", "String", "Symbol", "console", "parseInt", "parseFloat", "isNaN",
        "isFinite", "encodeURI", "decodeURI", "encodeURIComponent", "decodeURIComponent",
    ]
    .into_iter()
    .collect();

    static ref IDENTIFIER: Regex = Regex::new(r"[A-Za-z_$][A-Za-z0-9_$]*").unwrap();
    static ref STRING_LITERAL: Regex = Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#).unwrap();
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("syntax error in `{expression}` at offset {position}: {message}")]
    Syntax {
        expression: String,
        message: String,
        position: usize,
    },

    #[error("failed to evaluate `{expression}`")]
    Execution {
        expression: String,
        #[source]
        fault: EvalFault,
    },
}

impl ExpressionError {
    pub fn expression(&self) -> &str {
        match self {
            Self::Syntax { expression, .. } | Self::Execution { expression, .. } => expression,
        }
    }
}

/// The underlying cause of a failed evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalFault {
    #[error("`{0}` is not defined")]
    UndefinedVariable(String),

    #[error("cannot read `{property}` of null")]
    NullAccess { property: String },

    #[error("`{operation}` cannot be applied to a {found}")]
    TypeMismatch {
        operation: String,
        found: &'static str,
    },

    #[error("`{0}` is not a function")]
    UnknownFunction(String),

    #[error("`{function}` expects at least {expected} argument(s), got {found}")]
    ArgumentCount {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid argument to `{function}`: {message}")]
    InvalidArgument { function: String, message: String },

    #[error("division by zero")]
    DivisionByZero,
}

/// Parses and evaluates expressions, caching parsed trees by source text.
#[derive(Debug)]
pub struct ExpressionEvaluator {
    cache: DashMap<String, Arc<Expr>>,
    capacity: usize,
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self::with_cache_size(DEFAULT_CACHE_SIZE)
    }

    /// A capacity of zero disables the parse cache.
    pub fn with_cache_size(capacity: usize) -> Self {
        Self {
            cache: DashMap::new(),
            capacity,
        }
    }

    pub fn parse(&self, expression: &str) -> Result<Arc<Expr>, ExpressionError> {
        if let Some(expr) = self.cache.get(expression) {
            return Ok(expr.value().clone());
        }

        let expr = parser::parse(expression)
            .map(Arc::new)
            .map_err(|e| ExpressionError::Syntax {
                expression: expression.to_string(),
                message: e.message,
                position: e.position,
            })?;

        if self.capacity > 0 {
            if self.cache.len() >= self.capacity {
                tracing::debug!("expression cache full ({} entries), clearing", self.cache.len());
                self.cache.clear();
            }
            self.cache.insert(expression.to_string(), expr.clone());
        }
        Ok(expr)
    }

    /// Evaluates `expression` with only the names bound in `scope` visible.
    pub fn execute(&self, expression: &str, scope: &Scope) -> Result<Value, ExpressionError> {
        let expr = self.parse(expression)?;
        Interpreter::new(scope)
            .eval(&expr)
            .map_err(|fault| ExpressionError::Execution {
                expression: expression.to_string(),
                fault,
            })
    }

    /// Syntax check only; nothing is evaluated.
    pub fn validate(&self, expression: &str) -> bool {
        self.parse(expression).is_ok()
    }

    /// Free identifiers in first-seen order, without reserved words and
    /// well-known globals. Falls back to a lexical scan for text that does
    /// not parse.
    pub fn extract_variables(&self, expression: &str) -> Vec<String> {
        let mut names = Vec::new();
        match self.parse(expression) {
            Ok(expr) => collect_identifiers(&expr, &mut names),
            Err(_) => {
                let without_strings = STRING_LITERAL.replace_all(expression, " ");
                names.extend(
                    IDENTIFIER
                        .find_iter(&without_strings)
                        .map(|m| m.as_str().to_string()),
                );
            }
        }

        let mut seen = HashSet::new();
        names
            .into_iter()
            .filter(|name| {
                !RESERVED_WORDS.contains(name.as_str()) && !WELL_KNOWN_GLOBALS.contains(name.as_str())
            })
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

fn collect_identifiers(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Identifier(name) => out.push(name.clone()),
        Expr::Array(items) => items.iter().for_each(|item| collect_identifiers(item, out)),
        Expr::Object(entries) => entries
            .iter()
            .for_each(|(_, value)| collect_identifiers(value, out)),
        Expr::Member { object, .. } => collect_identifiers(object, out),
        Expr::Index { object, index, .. } => {
            collect_identifiers(object, out);
            collect_identifiers(index, out);
        }
        Expr::Call {
            callee, arguments, ..
        } => {
            collect_identifiers(callee, out);
            arguments.iter().for_each(|arg| collect_identifiers(arg, out));
        }
        Expr::Unary { operand, .. } => collect_identifiers(operand, out),
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            collect_identifiers(left, out);
            collect_identifiers(right, out);
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            collect_identifiers(test, out);
            collect_identifiers(consequent, out);
            collect_identifiers(alternate, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn scope() -> Scope {
        Scope::from([
            ("state".to_string(), json!({"items": ["a", "b", "c"], "name": " ann "})),
            ("variables".to_string(), json!({"index": 1})),
        ])
    }

    #[test]
    fn test_execute_with_builtins() {
        let evaluator = ExpressionEvaluator::new();
        let scope = scope();
        assert_eq!(
            evaluator
                .execute("state.items[variables.index].toUpperCase()", &scope)
                .unwrap(),
            json!("B")
        );
        assert_eq!(
            evaluator.execute("state.name.trim().length", &scope).unwrap(),
            json!(3)
        );
        assert_eq!(
            evaluator.execute("state.items.join('|')", &scope).unwrap(),
            json!("a|b|c")
        );
        assert!(evaluator.execute("Math.max(...[1])", &scope).is_err());
    }

    #[test]
    fn test_errors_carry_expression() {
        let evaluator = ExpressionEvaluator::new();
        let err = evaluator.execute("missing + 1", &Scope::new()).unwrap_err();
        assert_eq!(err.expression(), "missing + 1");
        assert!(matches!(
            err,
            ExpressionError::Execution {
                fault: EvalFault::UndefinedVariable(_),
                ..
            }
        ));
        assert!(matches!(
            evaluator.execute("1 +", &Scope::new()),
            Err(ExpressionError::Syntax { .. })
        ));
    }

    #[test]
    fn test_scope_shadows_builtin_namespace() {
        let evaluator = ExpressionEvaluator::new();
        let scope = Scope::from([("Math".to_string(), json!({"PI": 3}))]);
        assert_eq!(evaluator.execute("Math.PI", &scope).unwrap(), json!(3));
    }

    #[test]
    fn test_validate_does_not_evaluate() {
        let evaluator = ExpressionEvaluator::new();
        assert!(evaluator.validate("unknownFn(a, b) + c"));
        assert!(!evaluator.validate("a +* b"));
        assert!(!evaluator.validate(""));
    }

    #[test]
    fn test_extract_variables() {
        let evaluator = ExpressionEvaluator::new();
        assert_eq!(
            evaluator.extract_variables("user.name + ' ' + user.age > limit ? parseInt(x) : true"),
            vec!["user", "limit", "x"]
        );
        // Unparseable text falls back to a lexical scan.
        assert_eq!(
            evaluator.extract_variables("a + + 'b c' ) d"),
            vec!["a", "d"]
        );
    }

    #[test]
    fn test_oversized_chains_fail_cleanly() {
        let evaluator = ExpressionEvaluator::new();
        let sum = vec!["1"; 20_000].join("+");
        assert!(matches!(
            evaluator.execute(&sum, &Scope::new()),
            Err(ExpressionError::Syntax { .. })
        ));
        assert!(!evaluator.validate(&sum));
        assert!(!evaluator.validate(&vec!["a"; 20_000].join(" && ")));
        assert_eq!(evaluator.extract_variables(&vec!["x"; 20_000].join("+")), vec!["x"]);

        let modest = vec!["1"; 200].join("+");
        assert_eq!(evaluator.execute(&modest, &Scope::new()).unwrap(), json!(200));
    }

    #[test]
    fn test_parse_cache_is_bounded() {
        let evaluator = ExpressionEvaluator::with_cache_size(2);
        evaluator.validate("a");
        evaluator.validate("b");
        assert_eq!(evaluator.cached_len(), 2);
        evaluator.validate("c");
        assert_eq!(evaluator.cached_len(), 1);
        evaluator.validate("c");
        assert_eq!(evaluator.cached_len(), 1);
    }

    proptest! {
        #[test]
        fn integer_arithmetic_matches_rust(a in -1000i64..1000, b in -1000i64..1000) {
            let evaluator = ExpressionEvaluator::new();
            let scope = Scope::from([("a".to_string(), json!(a)), ("b".to_string(), json!(b))]);
            prop_assert_eq!(evaluator.execute("a + b * 2", &scope).unwrap(), json!(a + b * 2));
            prop_assert_eq!(evaluator.execute("a - b", &scope).unwrap(), json!(a - b));
        }

        #[test]
        fn validate_never_panics(source in "[a-z0-9 +*/().?:'\\[\\]-]{0,24}") {
            let evaluator = ExpressionEvaluator::new();
            let _ = evaluator.validate(&source);
        }
    }
}
