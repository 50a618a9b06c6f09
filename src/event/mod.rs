//! # Events and actions
//!
//! Interaction flows independently of rendering:
//!
//! ```text
//! host ──(event, data)──▶ EventExecutor ──▶ HandlerRegistry
//!                              │                 │
//!                              │        handlers in registration order
//!                              ▼                 │
//!                          action chains ◀───────┘
//!                              │
//!                              ▼
//!                           EventBus ──▶ host (navigate, messages, modals, state updates)
//! ```
//!
//! Handlers come from [`Node::events`](crate::schema::Node::events) and are
//! registered per node. The executor mutates the shared [`RenderContext`]
//! directly and announces every externally visible effect on the [`EventBus`].
//!
//! [`RenderContext`]: crate::context::RenderContext

pub mod api;
mod coalesce;
pub mod event_bus;
pub mod executor;
pub mod registry;
pub mod template;

pub use api::{ApiClient, ApiRequest, HttpApiClient, MockApiClient, NetworkError};
pub use event_bus::{
    ErrorEvent, ErrorReceiver, ErrorSeverity, Event, EventBus, EventError, EventReceiver,
    EventResult, EventType,
};
pub use executor::{ActionError, EventExecutor, ExecutionReport, HandlerFailure, HostFunction};
pub use registry::{HandlerRegistry, RegisteredHandler};
