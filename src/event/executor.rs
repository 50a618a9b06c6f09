//! Runs the action chains of registered handlers when a named event fires.
//!
//! Within one handler the actions run strictly one after another, each
//! finishing before the next reads the state it may have written. Handlers for
//! the same event are independent of each other and are driven concurrently;
//! a failing handler never affects its siblings.
//!
//! Every action may branch: `onSuccess` runs after the action completes,
//! `onError` runs instead of propagating the failure. Both lists nest without a
//! declared bound, so the interpreter is recursive and guarded by
//! [`ExecutorConfig::max_chain_depth`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_recursion::async_recursion;
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::api::{ApiClient, ApiRequest, HttpApiClient, NetworkError};
use super::event_bus::{ErrorEvent, ErrorSeverity, Event, EventBus, EventType};
use super::registry::{HandlerRegistry, RegisteredHandler};
use super::template;
use crate::condition::ConditionEvaluator;
use crate::config::ExecutorConfig;
use crate::context::{NamespaceKind, RenderContext, Scope};
use crate::error::error_chain;
use crate::expression::{ExpressionError, ExpressionEvaluator};
use crate::path::PathError;
use crate::schema::{Action, ActionKind, EventHandler, Schema};
use crate::value::to_display_string;

/// A host function callable through `callFunction`: receives the call
/// arguments and the current event data.
pub type HostFunction =
    Arc<dyn Fn(Vec<Value>, Value) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("{action} action requires `{field}`")]
    MissingConfig { action: String, field: String },

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("cannot assign `{key}`")]
    Assign {
        key: String,
        #[source]
        source: PathError,
    },

    #[error("function `{0}` is not registered")]
    UnknownFunction(String),

    #[error("function `{name}` failed: {message}")]
    Function { name: String, message: String },

    #[error("action chain too deep: depth {depth} exceeds the limit of {limit}")]
    ChainTooDeep { depth: usize, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerFailure {
    pub node_id: String,
    pub event: String,
    pub error: String,
}

/// Outcome of one [`EventExecutor::execute`] call. Debounced handlers are
/// only counted as `scheduled`; their outcome is reported on the error
/// channel of the bus.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub event: String,
    /// Correlates this dispatch with its bus notifications.
    pub execution_id: String,
    /// Handlers whose action list ran to completion or failed.
    pub handled: usize,
    /// Handlers whose gating condition was false.
    pub skipped: usize,
    /// Handlers deferred by a debounce window.
    pub scheduled: usize,
    /// Handlers dropped by a throttle window.
    pub suppressed: usize,
    pub failures: Vec<HandlerFailure>,
}

impl ExecutionReport {
    fn new(event: &str) -> Self {
        Self {
            event: event.to_string(),
            execution_id: Uuid::new_v4().to_string(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone)]
pub struct EventExecutor {
    registry: Arc<HandlerRegistry>,
    conditions: ConditionEvaluator,
    expressions: Arc<ExpressionEvaluator>,
    api: Arc<dyn ApiClient>,
    bus: Arc<EventBus>,
    functions: Arc<DashMap<String, HostFunction>>,
    config: ExecutorConfig,
}

impl std::fmt::Debug for EventExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventExecutor")
            .field("handlers", &self.registry.len())
            .field("functions", &self.functions.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for EventExecutor {
    fn default() -> Self {
        let config = ExecutorConfig::default();
        Self::new(
            Arc::new(ExpressionEvaluator::new()),
            Arc::new(HttpApiClient::new()),
            Arc::new(EventBus::new(config.event_buffer_size)),
            config,
        )
    }
}

impl EventExecutor {
    pub fn new(
        expressions: Arc<ExpressionEvaluator>,
        api: Arc<dyn ApiClient>,
        bus: Arc<EventBus>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry: Arc::new(HandlerRegistry::new()),
            conditions: ConditionEvaluator::new(expressions.clone()),
            expressions,
            api,
            bus,
            functions: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn register(&self, node_id: &str, handler: EventHandler) {
        self.registry.register(node_id, handler);
    }

    pub fn register_schema(&self, schema: &Schema) -> usize {
        self.registry.register_schema(schema)
    }

    pub fn unregister(&self, node_id: &str, event: Option<&str>) -> usize {
        self.registry.unregister(node_id, event)
    }

    pub fn clear(&self) {
        self.registry.clear();
    }

    /// Makes `name` callable from `callFunction` actions.
    pub fn register_function<F, Fut>(&self, name: &str, function: F)
    where
        F: Fn(Vec<Value>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        let function: HostFunction = Arc::new(move |args, data| function(args, data).boxed());
        self.functions.insert(name.to_string(), function);
    }

    /// Runs every handler registered for `event`. Failures are collected in
    /// the report and published on the error channel; they never escape.
    #[tracing::instrument(skip(self, data, context))]
    pub async fn execute(
        &self,
        event: &str,
        data: Value,
        context: &RenderContext,
    ) -> ExecutionReport {
        self.dispatch(event, data, context, 0).await
    }

    #[async_recursion]
    async fn dispatch(
        &self,
        event: &str,
        data: Value,
        context: &RenderContext,
        depth: usize,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::new(event);
        self.notify(
            Event::new(EventType::EventTriggered {
                event: event.to_string(),
            })
            .with_parameter("executionId", json!(report.execution_id))
            .with_parameter("data", data.clone()),
        );

        let mut immediate = Vec::new();
        for registered in self.registry.handlers_for(event) {
            let handler = &registered.handler;
            if let Some(condition) = &handler.condition {
                if !self.conditions.evaluate(condition, context) {
                    tracing::debug!("Handler on `{}` skipped by its condition", registered.node_id);
                    report.skipped += 1;
                    continue;
                }
            }

            if let Some(window) = handler.throttle.filter(|ms| *ms > 0) {
                if !registered.coalescer.throttle_permits(Duration::from_millis(window)) {
                    tracing::debug!("Handler on `{}` throttled", registered.node_id);
                    report.suppressed += 1;
                    continue;
                }
            }

            if let Some(window) = handler.debounce.filter(|ms| *ms > 0) {
                let executor = self.clone();
                let context = context.clone();
                let data = data.clone();
                let target = registered.clone();
                let execution_id = report.execution_id.clone();
                registered
                    .coalescer
                    .debounce(Duration::from_millis(window), async move {
                        executor
                            .run_handler(&target, data, &context, &execution_id, depth)
                            .await;
                    });
                report.scheduled += 1;
                continue;
            }

            immediate.push(registered);
        }

        let execution_id = report.execution_id.as_str();
        let outcomes = join_all(immediate.iter().map(|registered| {
            self.run_handler(registered, data.clone(), context, execution_id, depth)
        }))
        .await;
        report.handled += outcomes.len();
        report.failures.extend(outcomes.into_iter().flatten());
        report
    }

    async fn run_handler(
        &self,
        registered: &RegisteredHandler,
        data: Value,
        context: &RenderContext,
        execution_id: &str,
        depth: usize,
    ) -> Option<HandlerFailure> {
        let actions = &registered.handler.actions;
        let error = self.run_actions(actions, &data, context, depth).await.err()?;

        let failure = HandlerFailure {
            node_id: registered.node_id.clone(),
            event: registered.handler.event.clone(),
            error: error_chain(&error),
        };
        tracing::warn!(
            "Handler for `{}` on `{}` aborted: {}",
            failure.event,
            failure.node_id,
            failure.error
        );
        let published = self.bus.sync_publish_error(
            ErrorEvent::new("HandlerFailed", failure.error.clone(), ErrorSeverity::Error)
                .with_parameter("nodeId", json!(failure.node_id))
                .with_parameter("event", json!(failure.event))
                .with_parameter("executionId", json!(execution_id)),
        );
        if let Err(e) = published {
            tracing::error!("Failed to publish handler failure: {}", e);
        }
        Some(failure)
    }

    /// Runs `actions` in order. The first failure without an `onError`
    /// continuation aborts the rest of the list.
    #[async_recursion]
    async fn run_actions(
        &self,
        actions: &[Action],
        data: &Value,
        context: &RenderContext,
        depth: usize,
    ) -> Result<(), ActionError> {
        if depth > self.config.max_chain_depth {
            return Err(ActionError::ChainTooDeep {
                depth,
                limit: self.config.max_chain_depth,
            });
        }

        for action in actions {
            if let Some(condition) = &action.condition {
                if !self.conditions.evaluate(condition, context) {
                    tracing::debug!("Action `{}` skipped by its condition", action.kind);
                    continue;
                }
            }

            let outcome = match self.perform(action, data, context, depth).await {
                Ok(()) => match &action.on_success {
                    Some(on_success) => self.run_actions(on_success, data, context, depth + 1).await,
                    None => Ok(()),
                },
                Err(e) => Err(e),
            };

            match (outcome, &action.on_error) {
                (Ok(()), _) => {}
                (Err(e @ ActionError::ChainTooDeep { .. }), _) | (Err(e), None) => return Err(e),
                (Err(e), Some(on_error)) => {
                    let message = error_chain(&e);
                    tracing::warn!("Action `{}` failed, running onError: {}", action.kind, message);
                    let payload = json!({"error": message, "originalEventData": data});
                    self.run_actions(on_error, &payload, context, depth + 1)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn perform(
        &self,
        action: &Action,
        data: &Value,
        context: &RenderContext,
        depth: usize,
    ) -> Result<(), ActionError> {
        let mut scope = context.to_scope();
        scope.insert("eventData".to_string(), data.clone());
        let name = action.kind.as_str();

        match &action.kind {
            ActionKind::SetState | ActionKind::SetVariable => {
                let config = self.config_of(action, &scope)?;
                let key = required_str(&config, name, "key")?;
                let value = config.get("value").cloned().unwrap_or(Value::Null);
                let (kind, event_type) = match action.kind {
                    ActionKind::SetState => (
                        NamespaceKind::State,
                        EventType::StateUpdated { key: key.clone() },
                    ),
                    _ => (
                        NamespaceKind::Variables,
                        EventType::VariableUpdated { key: key.clone() },
                    ),
                };
                self.assign(context, kind, &key, value.clone())?;
                self.notify(Event::new(event_type).with_parameter("value", value));
            }
            ActionKind::CallApi => {
                let config = self.config_of(action, &scope)?;
                let request = ApiRequest {
                    url: required_str(&config, name, "url")?,
                    method: config
                        .get("method")
                        .and_then(Value::as_str)
                        .unwrap_or("GET")
                        .to_string(),
                    headers: config
                        .get("headers")
                        .and_then(Value::as_object)
                        .map(|headers| {
                            headers
                                .iter()
                                .map(|(k, v)| (k.clone(), to_display_string(v)))
                                .collect()
                        })
                        .unwrap_or_default(),
                    body: config.get("body").filter(|body| !body.is_null()).cloned(),
                };
                tracing::debug!("Calling {} {}", request.method, request.url);
                let response = self.api.call(request.clone()).await?;
                self.notify(
                    Event::new(EventType::ApiCalled)
                        .with_parameter("url", json!(request.url))
                        .with_parameter("method", json!(request.method)),
                );
                self.store_result(&config, context, response)?;
            }
            ActionKind::Navigate => {
                let config = self.config_of(action, &scope)?;
                let url = required_str(&config, name, "url")?;
                self.notify(Event::new(EventType::Navigate).with_parameter("url", json!(url)));
            }
            ActionKind::ShowMessage => {
                let config = self.config_of(action, &scope)?;
                let message = required(&config, name, "message")?;
                let level = config
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("info")
                    .to_string();
                self.notify(
                    Event::new(EventType::ShowMessage)
                        .with_parameter("message", message)
                        .with_parameter("type", json!(level)),
                );
            }
            ActionKind::OpenModal => {
                let config = self.config_of(action, &scope)?;
                let modal_id = required(&config, name, "modalId")?;
                self.notify(Event::new(EventType::OpenModal).with_parameter("modalId", modal_id));
            }
            ActionKind::CloseModal => {
                let config = self.config_of(action, &scope)?;
                let modal_id = config.get("modalId").cloned().unwrap_or(Value::Null);
                self.notify(Event::new(EventType::CloseModal).with_parameter("modalId", modal_id));
            }
            ActionKind::ExecuteCode => {
                // `code` is itself an expression and is not templated.
                let code = required_str(&action.config, name, "code")?;
                let result = self.expressions.execute(&code, &scope)?;
                self.store_result(&action.config, context, result)?;
            }
            ActionKind::TriggerEvent => {
                let config = self.config_of(action, &scope)?;
                let event = required_str(&config, name, "event")?;
                if depth + 1 > self.config.max_chain_depth {
                    return Err(ActionError::ChainTooDeep {
                        depth: depth + 1,
                        limit: self.config.max_chain_depth,
                    });
                }
                let payload = config.get("data").cloned().unwrap_or(Value::Null);
                let report = self.dispatch(&event, payload, context, depth + 1).await;
                tracing::debug!(
                    "Triggered `{}`: {} handled, {} failed",
                    event,
                    report.handled,
                    report.failures.len()
                );
            }
            ActionKind::CallFunction => {
                let config = self.config_of(action, &scope)?;
                let function_name = required_str(&config, name, "function")?;
                let function = self
                    .functions
                    .get(&function_name)
                    .map(|entry| entry.value().clone())
                    .ok_or_else(|| ActionError::UnknownFunction(function_name.clone()))?;
                let args = match config.get("args") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(args)) => args.clone(),
                    Some(single) => vec![single.clone()],
                };
                let result = function(args, data.clone())
                    .await
                    .map_err(|message| ActionError::Function {
                        name: function_name,
                        message,
                    })?;
                self.store_result(&config, context, result)?;
            }
            kind if kind.is_reserved() => {
                tracing::debug!("Action `{}` has no built-in behaviour", kind);
            }
            kind => {
                tracing::warn!("Unknown action type: {}", kind);
            }
        }
        Ok(())
    }

    fn config_of(&self, action: &Action, scope: &Scope) -> Result<Map<String, Value>, ActionError> {
        Ok(template::render_map(&self.expressions, &action.config, scope)?)
    }

    fn assign(
        &self,
        context: &RenderContext,
        kind: NamespaceKind,
        key: &str,
        value: Value,
    ) -> Result<(), ActionError> {
        context
            .assign(kind, key, value)
            .map_err(|source| ActionError::Assign {
                key: key.to_string(),
                source,
            })
    }

    /// Writes `value` to `state[resultKey]` when the action names a key.
    fn store_result(
        &self,
        config: &Map<String, Value>,
        context: &RenderContext,
        value: Value,
    ) -> Result<(), ActionError> {
        let Some(key) = config.get("resultKey").and_then(Value::as_str) else {
            return Ok(());
        };
        self.assign(context, NamespaceKind::State, key, value.clone())?;
        self.notify(
            Event::new(EventType::StateUpdated {
                key: key.to_string(),
            })
            .with_parameter("value", value),
        );
        Ok(())
    }

    fn notify(&self, event: Event) {
        if let Err(e) = self.bus.sync_publish(event) {
            tracing::error!("Failed to publish event: {}", e);
        }
    }
}

fn required(config: &Map<String, Value>, action: &str, field: &str) -> Result<Value, ActionError> {
    match config.get(field) {
        Some(value) if !value.is_null() && value != "" => Ok(value.clone()),
        _ => Err(ActionError::MissingConfig {
            action: action.to_string(),
            field: field.to_string(),
        }),
    }
}

fn required_str(
    config: &Map<String, Value>,
    action: &str,
    field: &str,
) -> Result<String, ActionError> {
    required(config, action, field).map(|value| to_display_string(&value))
}
