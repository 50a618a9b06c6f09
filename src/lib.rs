//! # lowcoder-runtime: schema-driven rendering and interaction engine
//!
//! A page is described by a [`Schema`](schema::Schema): a tree of typed nodes
//! carrying properties, data bindings, visibility conditions, loops and
//! event handlers. The runtime turns that description plus a mutable
//! [`RenderContext`](context::RenderContext) into a resolved render tree, and
//! runs the action chains that interaction events trigger.
//!
//! ## Layers
//!
//! Leaves first, each depending only on the ones above it:
//!
//! - Values and paths ([`value`], [`path`], [`context`])
//! - Expression language ([`expression`]): a restricted parser and
//!   interpreter. Nothing outside the explicit scope is reachable.
//! - Conditions ([`condition`]) and bindings ([`binding`])
//! - Schema model and analysis ([`schema`], [`analyzer`])
//! - Events and actions ([`event`])
//! - Rendering ([`engine`])
//!
//! ## Rendering pipeline
//!
//! ```text
//! Schema → validate → (cache) → analyze + limits → render nodes → RenderResult
//! ```
//!
//! ## Interaction
//!
//! ```text
//! (event, data) → EventExecutor → handlers → action chains → context + EventBus
//! ```
//!
//! Configuration lives in [`config`]; the crate-wide error type in [`error`].

pub mod analyzer;
pub mod binding;
pub mod condition;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod event;
pub mod expression;
pub mod path;
pub mod schema;
pub mod value;

// Re-exports
pub use config::{EngineConfig, RenderOptions};
pub use context::RenderContext;
pub use engine::{RenderEngine, RenderResult};
pub use error::*;
pub use schema::Schema;
