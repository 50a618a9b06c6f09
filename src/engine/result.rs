use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use super::component::ComponentRef;

/// One resolved node of the output tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    /// Static props overlaid with resolved bindings.
    pub props: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<ComponentRef>,
    /// Set when no component is registered for `node_type`.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub placeholder: bool,
    pub children: Vec<RenderNode>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub slots: BTreeMap<String, Vec<RenderNode>>,
}

impl RenderNode {
    pub fn find(&self, id: &str) -> Option<&RenderNode> {
        if self.id == id {
            return Some(self);
        }
        self.children
            .iter()
            .chain(self.slots.values().flatten())
            .find_map(|child| child.find(id))
    }
}

/// What one schema node turns into.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutput {
    Node(RenderNode),
    /// Loop iterations, spliced in order into the parent.
    Fragment(Vec<RenderNode>),
    /// Condition was false.
    Absent,
}

impl RenderOutput {
    pub fn into_nodes(self) -> Vec<RenderNode> {
        match self {
            Self::Node(node) => vec![node],
            Self::Fragment(nodes) => nodes,
            Self::Absent => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub render_time_ms: f64,
    pub component_count: usize,
    pub data_binding_count: usize,
    pub event_handler_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResult {
    /// Usually one node. Empty when the root's condition is false, several
    /// when the root itself loops.
    pub content: Vec<RenderNode>,
    pub component_dependencies: Vec<String>,
    pub data_dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceMetrics>,
}

impl RenderResult {
    pub fn root(&self) -> Option<&RenderNode> {
        self.content.first()
    }

    pub fn find(&self, id: &str) -> Option<&RenderNode> {
        self.content.iter().find_map(|node| node.find(id))
    }
}
