//! # Render engine
//!
//! Turns a [`Schema`] and a [`RenderContext`] into a [`RenderResult`]:
//!
//! 1. validate the schema, aborting with every violation found
//! 2. serve a cached result for the schema id when caching is on
//! 3. analyze the tree and enforce the depth/node ceilings
//! 4. render recursively from the root
//! 5. attach performance counters on request and cache the result
//!
//! Per node the renderer evaluates the condition first (false drops the node
//! and its subtree), then expands a loop into one output per item, otherwise
//! resolves bindings and renders children and slots. Siblings, slot lists and
//! loop iterations render concurrently and are joined in source order.

pub mod cache;
pub mod component;
pub mod result;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_recursion::async_recursion;
use futures::future::try_join_all;
use serde_json::{json, Map, Value};
use thiserror::Error;

pub use cache::{CacheStats, RenderCache};
pub use component::{ComponentRef, ComponentRegistry, ComponentResolver, MockComponentResolver};
pub use result::{PerformanceMetrics, RenderNode, RenderOutput, RenderResult};

use crate::analyzer::{
    analyze_schema, check_limits, extract_data_dependencies, validate_schema, ResourceLimitError,
    SchemaValidationError,
};
use crate::binding::{BindingError, DataBindingResolver};
use crate::condition::ConditionEvaluator;
use crate::config::{EngineConfig, RenderOptions};
use crate::context::{NamespaceKind, RenderContext};
use crate::event::{
    ApiClient, ErrorEvent, ErrorSeverity, Event, EventBus, EventExecutor, EventType,
    ExecutionReport, HttpApiClient,
};
use crate::expression::ExpressionEvaluator;
use crate::schema::{Loop, LoopSource, Node, Schema};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] SchemaValidationError),

    #[error(transparent)]
    ResourceLimit(#[from] ResourceLimitError),

    #[error("binding `{target}` on node `{node_id}` failed")]
    Binding {
        node_id: String,
        target: String,
        #[source]
        source: BindingError,
    },

    #[error("render cancelled")]
    Cancelled,
}

/// Observes every render-level failure before it is returned to the caller.
pub type ErrorHandler = Arc<dyn Fn(&EngineError, &Schema) + Send + Sync>;

pub struct RenderEngineBuilder {
    config: EngineConfig,
    components: Option<Arc<dyn ComponentResolver>>,
    api: Option<Arc<dyn ApiClient>>,
    bus: Option<Arc<EventBus>>,
    error_handler: Option<ErrorHandler>,
}

impl RenderEngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            components: None,
            api: None,
            bus: None,
            error_handler: None,
        }
    }

    pub fn component_resolver(mut self, components: Arc<dyn ComponentResolver>) -> Self {
        self.components = Some(components);
        self
    }

    pub fn api_client(mut self, api: Arc<dyn ApiClient>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&EngineError, &Schema) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> RenderEngine {
        let config = self.config;
        let expressions = Arc::new(ExpressionEvaluator::with_cache_size(
            config.expression_cache_size,
        ));
        let bus = self
            .bus
            .unwrap_or_else(|| Arc::new(EventBus::new(config.executor.event_buffer_size)));
        let api = self
            .api
            .unwrap_or_else(|| Arc::new(HttpApiClient::new()) as Arc<dyn ApiClient>);
        let executor = EventExecutor::new(
            expressions.clone(),
            api,
            bus.clone(),
            config.executor.clone(),
        );

        RenderEngine {
            conditions: ConditionEvaluator::new(expressions.clone()),
            bindings: DataBindingResolver::new(expressions),
            components: self
                .components
                .unwrap_or_else(|| Arc::new(ComponentRegistry::new()) as Arc<dyn ComponentResolver>),
            executor,
            bus,
            cache: RenderCache::new(config.cache.max_size, config.cache.ttl),
            error_handler: self.error_handler.unwrap_or_else(|| {
                Arc::new(|error: &EngineError, schema: &Schema| {
                    tracing::error!("Render of `{}` failed: {}", schema.id, error)
                }) as ErrorHandler
            }),
            config,
        }
    }
}

/// One engine instance owns its evaluators, handler table and result cache;
/// nothing is shared between instances.
pub struct RenderEngine {
    config: EngineConfig,
    conditions: ConditionEvaluator,
    bindings: DataBindingResolver,
    components: Arc<dyn ComponentResolver>,
    executor: EventExecutor,
    bus: Arc<EventBus>,
    cache: RenderCache,
    error_handler: ErrorHandler,
}

impl Default for RenderEngine {
    fn default() -> Self {
        RenderEngineBuilder::new(EngineConfig::default()).build()
    }
}

impl std::fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderEngine")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .field("cache", &self.cache.stats())
            .finish()
    }
}

impl RenderEngine {
    pub fn builder(config: EngineConfig) -> RenderEngineBuilder {
        RenderEngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn executor(&self) -> &EventExecutor {
        &self.executor
    }

    /// Renders `schema`. `options` replaces the configured defaults when
    /// given. Failures are passed to the error handler, published as
    /// `RenderFailed`, and returned.
    #[tracing::instrument(skip_all, fields(schema_id = %schema.id))]
    pub async fn render(
        &self,
        schema: &Schema,
        context: &RenderContext,
        options: Option<RenderOptions>,
    ) -> Result<Arc<RenderResult>, EngineError> {
        let options = options.unwrap_or(self.config.default_options);
        match self.render_schema(schema, context, options).await {
            Ok(result) => Ok(result),
            Err(e) => {
                self.report(&e, schema);
                Err(e)
            }
        }
    }

    /// Like [`render`](Self::render), but gives up with
    /// [`EngineError::Cancelled`] as soon as `cancel` resolves. A cancel
    /// future that is already complete wins over the render.
    pub async fn render_with_cancel<C>(
        &self,
        schema: &Schema,
        context: &RenderContext,
        options: Option<RenderOptions>,
        cancel: C,
    ) -> Result<Arc<RenderResult>, EngineError>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                let e = EngineError::Cancelled;
                self.report(&e, schema);
                Err(e)
            }
            result = self.render(schema, context, options) => result,
        }
    }

    async fn render_schema(
        &self,
        schema: &Schema,
        context: &RenderContext,
        options: RenderOptions,
    ) -> Result<Arc<RenderResult>, EngineError> {
        let started = Instant::now();
        validate_schema(schema).into_result()?;

        // Debug renders always render fresh but still refresh the cache.
        if self.config.cache.enabled && !options.debug {
            if let Some(cached) = self.cache.get(&schema.id) {
                tracing::debug!("Render cache hit for `{}`", schema.id);
                self.notify(Event::new(EventType::RenderCached {
                    schema_id: schema.id.clone(),
                }));
                return Ok(cached);
            }
        }

        let analysis = analyze_schema(schema);
        check_limits(&analysis, self.config.max_depth, self.config.max_nodes)?;

        self.notify(Event::new(EventType::RenderStarted {
            schema_id: schema.id.clone(),
        }));

        let content = match &schema.root {
            Some(root) => self.render_node(root, context).await?.into_nodes(),
            None => Vec::new(),
        };

        let render_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        let performance = options
            .enable_performance_tracking
            .then(|| PerformanceMetrics {
                render_time_ms,
                component_count: analysis.total_nodes,
                data_binding_count: analysis.data_bindings.len(),
                event_handler_count: analysis.event_handlers.len(),
            });

        let result = Arc::new(RenderResult {
            content,
            component_dependencies: analysis.component_dependencies,
            data_dependencies: extract_data_dependencies(schema),
            performance,
        });

        if self.config.cache.enabled {
            self.cache.insert(&schema.id, result.clone());
        }

        self.notify(
            Event::new(EventType::RenderCompleted {
                schema_id: schema.id.clone(),
            })
            .with_parameter("renderTime", json!(render_time_ms)),
        );
        Ok(result)
    }

    #[async_recursion]
    async fn render_node(
        &self,
        node: &Node,
        context: &RenderContext,
    ) -> Result<RenderOutput, EngineError> {
        if !self.condition_holds(node, context) {
            return Ok(RenderOutput::Absent);
        }
        match &node.repeat {
            Some(repeat) => self.render_loop(node, repeat, context).await,
            None => self.render_element(node, context).await.map(RenderOutput::Node),
        }
    }

    fn condition_holds(&self, node: &Node, context: &RenderContext) -> bool {
        node.condition
            .as_ref()
            .map_or(true, |condition| self.conditions.evaluate(condition, context))
    }

    /// Renders the node once per item, as if it had no loop. Each iteration
    /// sees the item and index in `variables` and re-evaluates the condition
    /// against them.
    async fn render_loop(
        &self,
        node: &Node,
        repeat: &Loop,
        context: &RenderContext,
    ) -> Result<RenderOutput, EngineError> {
        let items = loop_items(repeat, context);
        let iterations = items.into_iter().enumerate().map(|(index, item)| {
            let iteration = context.with_variables([
                (repeat.item_key.clone(), item),
                (repeat.index_key.clone(), json!(index)),
            ]);
            async move {
                if !self.condition_holds(node, &iteration) {
                    return Ok(None);
                }
                self.render_element(node, &iteration).await.map(Some)
            }
        });
        let rendered = try_join_all(iterations).await?;
        Ok(RenderOutput::Fragment(rendered.into_iter().flatten().collect()))
    }

    async fn render_element(
        &self,
        node: &Node,
        context: &RenderContext,
    ) -> Result<RenderNode, EngineError> {
        let props = self.resolve_props(node, context)?;

        let slots = try_join_all(node.slots.iter().map(|(name, nodes)| async move {
            Ok::<_, EngineError>((name.clone(), self.render_list(nodes, context).await?))
        }));
        let (children, slots) =
            futures::try_join!(self.render_list(&node.children, context), slots)?;

        let component = self.components.resolve(&node.node_type);
        if component.is_none() {
            tracing::debug!(
                "No component registered for `{}`, rendering `{}` as a placeholder",
                node.node_type,
                node.id
            );
        }

        Ok(RenderNode {
            id: node.id.clone(),
            node_type: node.node_type.clone(),
            props,
            style: node.style.clone(),
            layout: node.layout.clone(),
            meta: node.meta.clone(),
            placeholder: component.is_none(),
            component,
            children,
            slots: slots.into_iter().collect(),
        })
    }

    async fn render_list(
        &self,
        nodes: &[Node],
        context: &RenderContext,
    ) -> Result<Vec<RenderNode>, EngineError> {
        let outputs = try_join_all(nodes.iter().map(|node| self.render_node(node, context))).await?;
        Ok(outputs.into_iter().flat_map(RenderOutput::into_nodes).collect())
    }

    fn resolve_props(
        &self,
        node: &Node,
        context: &RenderContext,
    ) -> Result<Map<String, Value>, EngineError> {
        let mut props = node.props.clone();
        for binding in &node.bindings {
            let value = self
                .bindings
                .resolve(binding, context)
                .map_err(|source| EngineError::Binding {
                    node_id: node.id.clone(),
                    target: binding.target.clone(),
                    source,
                })?;
            props.insert(binding.target.clone(), value);
        }
        Ok(props)
    }

    /// Validates `schema` and registers every handler it declares.
    pub fn mount(&self, schema: &Schema) -> Result<usize, EngineError> {
        validate_schema(schema).into_result()?;
        let count = self.executor.register_schema(schema);
        tracing::info!("Mounted `{}` with {} handler(s)", schema.id, count);
        Ok(count)
    }

    /// Removes the handlers of every node in `schema`.
    pub fn unmount(&self, schema: &Schema) -> usize {
        schema
            .collect_nodes()
            .iter()
            .map(|node| self.executor.unregister(&node.id, None))
            .sum()
    }

    pub async fn dispatch(
        &self,
        event: &str,
        data: Value,
        context: &RenderContext,
    ) -> ExecutionReport {
        self.executor.execute(event, data, context).await
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        self.notify(Event::new(EventType::CacheCleared));
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn report(&self, error: &EngineError, schema: &Schema) {
        let published = self.bus.sync_publish_error(
            ErrorEvent::new(
                "RenderFailed",
                crate::error::error_chain(error),
                ErrorSeverity::Error,
            )
            .with_parameter("schemaId", json!(schema.id)),
        );
        if let Err(e) = published {
            tracing::error!("Failed to publish render failure: {}", e);
        }
        (self.error_handler)(error, schema);
    }

    fn notify(&self, event: Event) {
        if let Err(e) = self.bus.sync_publish(event) {
            tracing::error!("Failed to publish event: {}", e);
        }
    }
}

/// Items of a loop source. A path is looked up under `data`, `state` or
/// `variables` by its first segment, and under `data` otherwise. Anything that
/// is not a sequence iterates zero times.
fn loop_items(repeat: &Loop, context: &RenderContext) -> Vec<Value> {
    let resolved = match &repeat.data_source {
        LoopSource::Items(items) => return items.clone(),
        LoopSource::Path(path) => {
            let (root, rest) = path.split_once('.').unwrap_or((path.as_str(), ""));
            match root.parse::<NamespaceKind>() {
                Ok(kind @ (NamespaceKind::Data | NamespaceKind::State | NamespaceKind::Variables)) => {
                    context.lookup(kind, rest)
                }
                _ => context.lookup(NamespaceKind::Data, path),
            }
        }
        LoopSource::Other(other) => other.clone(),
    };
    match resolved {
        Value::Array(items) => items,
        other => {
            tracing::warn!(
                "Loop data source is not an array ({}), rendering nothing",
                crate::value::type_name(&other)
            );
            Vec::new()
        }
    }
}
