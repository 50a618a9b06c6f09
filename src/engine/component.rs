//! Type tag → renderable component lookup, supplied by the host UI layer.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What the host renders a node type with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl ComponentRef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: None,
            meta: Map::new(),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }
}

/// Resolves a node's type tag. `None` is not an error: the engine renders a
/// placeholder node and keeps its children.
#[mockall::automock]
pub trait ComponentResolver: Send + Sync {
    fn resolve(&self, node_type: &str) -> Option<ComponentRef>;
}

/// A resolver backed by explicit registrations. An empty registry resolves
/// nothing, which turns every node into a placeholder.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    components: DashMap<String, ComponentRef>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, node_type: &str, component: ComponentRef) {
        self.components.insert(node_type.to_string(), component);
    }

    /// Registers each tag as a component of the same name.
    pub fn with_types<'a>(types: impl IntoIterator<Item = &'a str>) -> Self {
        let registry = Self::new();
        for node_type in types {
            registry.register(node_type, ComponentRef::new(node_type));
        }
        registry
    }

    pub fn unregister(&self, node_type: &str) -> Option<ComponentRef> {
        self.components.remove(node_type).map(|(_, component)| component)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl ComponentResolver for ComponentRegistry {
    fn resolve(&self, node_type: &str) -> Option<ComponentRef> {
        self.components.get(node_type).map(|entry| entry.value().clone())
    }
}
