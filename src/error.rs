use thiserror::Error;

use crate::analyzer::{ResourceLimitError, SchemaValidationError};
use crate::binding::BindingError;
use crate::condition::ConditionError;
use crate::engine::EngineError;
use crate::event::{ActionError, EventError, NetworkError};
use crate::expression::ExpressionError;
use crate::path::PathError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Schema validation error: {0}")]
    SchemaValidation(#[from] SchemaValidationError),
    #[error("Resource limit error: {0}")]
    ResourceLimit(#[from] ResourceLimitError),
    // evaluation
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),
    #[error("Condition error: {0}")]
    Condition(#[from] ConditionError),
    #[error("Binding error: {0}")]
    Binding(#[from] BindingError),
    #[error("Path error: {0}")]
    Path(#[from] PathError),
    // events
    #[error("Action error: {0}")]
    Action(#[from] ActionError),
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}

/// Joins an error with its `source()` chain: `outer: inner: root`.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
