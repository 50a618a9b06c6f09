//! The declarative page description: a versioned tree of [`Node`]s.
//!
//! Field names follow the JSON documents produced by the editor (`camelCase`,
//! `type` tags). Every string-tagged kind is a closed enum with an explicit
//! fallback variant so that unrecognised tags survive deserialization and are
//! reported (and skipped) at evaluation time instead of rejecting the page.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One page/view.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<Node>,
    /// Status, timestamps, ownership. Owned by the persistence layer.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl Schema {
    pub fn new(id: &str, version: &str, root: Node) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            root: Some(root),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn find_node(&self, id: &str) -> Option<&Node> {
        self.root.as_ref().and_then(|root| root.find(id))
    }

    /// Ids from the root down to (and including) the node with `id`.
    pub fn node_path(&self, id: &str) -> Option<Vec<String>> {
        fn search(node: &Node, id: &str, trail: &mut Vec<String>) -> bool {
            trail.push(node.id.clone());
            if node.id == id {
                return true;
            }
            for child in node.children.iter().chain(node.slots.values().flatten()) {
                if search(child, id, trail) {
                    return true;
                }
            }
            trail.pop();
            false
        }

        let root = self.root.as_ref()?;
        let mut trail = Vec::new();
        search(root, id, &mut trail).then_some(trail)
    }

    /// Every node in depth-first order, children before slots.
    pub fn collect_nodes(&self) -> Vec<&Node> {
        let mut nodes = Vec::new();
        if let Some(root) = &self.root {
            root.walk(&mut |node, _| nodes.push(node));
        }
        nodes
    }
}

/// One element of the UI tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub props: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<EventHandler>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(rename = "loop", default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<Loop>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub slots: BTreeMap<String, Vec<Node>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Node {
    pub fn new(id: &str, node_type: &str) -> Self {
        Self {
            id: id.to_string(),
            node_type: node_type.to_string(),
            ..Default::default()
        }
    }

    /// Depth-first traversal over children and every slot list. The callback
    /// receives each node with its depth (root = 0).
    pub fn walk<'a, F>(&'a self, visit: &mut F)
    where
        F: FnMut(&'a Node, usize),
    {
        self.walk_at(0, visit);
    }

    fn walk_at<'a, F>(&'a self, depth: usize, visit: &mut F)
    where
        F: FnMut(&'a Node, usize),
    {
        visit(self, depth);
        for child in &self.children {
            child.walk_at(depth + 1, visit);
        }
        for slot_node in self.slots.values().flatten() {
            slot_node.walk_at(depth + 1, visit);
        }
    }

    pub fn find(&self, id: &str) -> Option<&Node> {
        if self.id == id {
            return Some(self);
        }
        self.children
            .iter()
            .chain(self.slots.values().flatten())
            .find_map(|child| child.find(id))
    }
}

/// Declares how one property is computed at render time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub target: String,
    #[serde(rename = "type")]
    pub kind: BindingKind,
    /// Literal for `static`, expression text for `expression`/`computed`,
    /// dotted path for the path kinds.
    #[serde(default)]
    pub source: Value,
    /// Expression applied to the resolved value, bound as `value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub mode: BindingMode,
}

impl Binding {
    pub fn new(target: &str, kind: BindingKind, source: Value) -> Self {
        Self {
            target: target.to_string(),
            kind,
            source,
            transform: None,
            default_value: None,
            mode: BindingMode::default(),
        }
    }

    pub fn with_default(mut self, default_value: Value) -> Self {
        self.default_value = Some(default_value);
        self
    }

    pub fn with_mode(mut self, mode: BindingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_transform(mut self, transform: &str) -> Self {
        self.transform = Some(transform.to_string());
        self
    }

    /// The source as text, for the kinds that expect a path or expression.
    pub fn source_str(&self) -> Option<&str> {
        self.source.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumString)]
#[serde(from = "String", into = "String")]
pub enum BindingKind {
    #[strum(serialize = "static")]
    Static,
    #[strum(serialize = "expression")]
    Expression,
    #[strum(serialize = "datasource")]
    Datasource,
    #[strum(serialize = "state")]
    State,
    #[strum(serialize = "variable")]
    Variable,
    #[strum(serialize = "context")]
    Context,
    #[strum(serialize = "computed")]
    Computed,
    #[strum(default)]
    Unknown(String),
}

impl BindingKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Static => "static",
            Self::Expression => "expression",
            Self::Datasource => "datasource",
            Self::State => "state",
            Self::Variable => "variable",
            Self::Context => "context",
            Self::Computed => "computed",
            Self::Unknown(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingMode {
    #[default]
    OneWay,
    TwoWay,
    Strict,
}

/// A boolean predicate gating a node's presence or an action's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Condition {
    Simple {
        #[serde(default)]
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operator: Option<ConditionOperator>,
        #[serde(default)]
        value: Value,
    },
    Complex {
        #[serde(default)]
        logic: Logic,
        #[serde(default)]
        conditions: Vec<Condition>,
    },
    Raw {
        expression: String,
    },
    #[serde(other)]
    Unknown,
}

impl Condition {
    pub fn simple(field: &str, operator: ConditionOperator, value: Value) -> Self {
        Self::Simple {
            field: field.to_string(),
            operator: Some(operator),
            value,
        }
    }

    pub fn raw(expression: &str) -> Self {
        Self::Raw {
            expression: expression.to_string(),
        }
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Self::Complex {
            logic: Logic::And,
            conditions,
        }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Self::Complex {
            logic: Logic::Or,
            conditions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumString)]
#[serde(from = "String", into = "String")]
pub enum ConditionOperator {
    #[strum(serialize = "equals", serialize = "==")]
    Equals,
    #[strum(serialize = "notEquals", serialize = "!=")]
    NotEquals,
    #[strum(serialize = "contains")]
    Contains,
    #[strum(serialize = "notContains")]
    NotContains,
    #[strum(serialize = "greaterThan", serialize = ">")]
    GreaterThan,
    #[strum(serialize = "lessThan", serialize = "<")]
    LessThan,
    #[strum(serialize = "greaterThanOrEqual", serialize = ">=")]
    GreaterThanOrEqual,
    #[strum(serialize = "lessThanOrEqual", serialize = "<=")]
    LessThanOrEqual,
    #[strum(serialize = "isEmpty")]
    IsEmpty,
    #[strum(serialize = "isNotEmpty")]
    IsNotEmpty,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "notIn")]
    NotIn,
    #[strum(serialize = "startsWith")]
    StartsWith,
    #[strum(serialize = "endsWith")]
    EndsWith,
    #[strum(serialize = "matches")]
    Matches,
    #[strum(default)]
    Unknown(String),
}

impl ConditionOperator {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "notEquals",
            Self::Contains => "contains",
            Self::NotContains => "notContains",
            Self::GreaterThan => "greaterThan",
            Self::LessThan => "lessThan",
            Self::GreaterThanOrEqual => "greaterThanOrEqual",
            Self::LessThanOrEqual => "lessThanOrEqual",
            Self::IsEmpty => "isEmpty",
            Self::IsNotEmpty => "isNotEmpty",
            Self::In => "in",
            Self::NotIn => "notIn",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Matches => "matches",
            Self::Unknown(name) => name,
        }
    }
}

/// Expands one node into N siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loop {
    pub data_source: LoopSource,
    #[serde(default = "default_item_key")]
    pub item_key: String,
    #[serde(default = "default_index_key")]
    pub index_key: String,
}

impl Loop {
    pub fn over_path(path: &str) -> Self {
        Self {
            data_source: LoopSource::Path(path.to_string()),
            item_key: default_item_key(),
            index_key: default_index_key(),
        }
    }

    pub fn over_items(items: Vec<Value>) -> Self {
        Self {
            data_source: LoopSource::Items(items),
            item_key: default_item_key(),
            index_key: default_index_key(),
        }
    }

    pub fn with_keys(mut self, item_key: &str, index_key: &str) -> Self {
        self.item_key = item_key.to_string();
        self.index_key = index_key.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LoopSource {
    Path(String),
    Items(Vec<Value>),
    /// Anything else; iterates zero times.
    Other(Value),
}

fn default_item_key() -> String {
    "item".to_string()
}

fn default_index_key() -> String {
    "index".to_string()
}

/// A named-event-triggered, optionally gated and coalesced action list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHandler {
    pub event: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Trailing-edge coalescing window in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce: Option<u64>,
    /// Leading-edge rate limit window in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle: Option<u64>,
}

impl EventHandler {
    pub fn new(event: &str, actions: Vec<Action>) -> Self {
        Self {
            event: event.to_string(),
            actions,
            condition: None,
            debounce: None,
            throttle: None,
        }
    }
}

/// One step of an event handler, with error/success continuations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<Vec<Action>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<Vec<Action>>,
}

impl Action {
    pub fn new(kind: ActionKind, config: Value) -> Self {
        Self {
            kind,
            config: match config {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            condition: None,
            on_error: None,
            on_success: None,
        }
    }

    pub fn on_error(mut self, actions: Vec<Action>) -> Self {
        self.on_error = Some(actions);
        self
    }

    pub fn on_success(mut self, actions: Vec<Action>) -> Self {
        self.on_success = Some(actions);
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumString)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    #[strum(serialize = "setState")]
    SetState,
    #[strum(serialize = "setVariable")]
    SetVariable,
    #[strum(serialize = "callApi", serialize = "callAPI")]
    CallApi,
    #[strum(serialize = "navigate")]
    Navigate,
    #[strum(serialize = "showMessage")]
    ShowMessage,
    #[strum(serialize = "openModal")]
    OpenModal,
    #[strum(serialize = "closeModal")]
    CloseModal,
    #[strum(serialize = "executeCode", serialize = "customCode")]
    ExecuteCode,
    #[strum(serialize = "triggerEvent")]
    TriggerEvent,
    #[strum(serialize = "callFunction")]
    CallFunction,
    // Valid in documents, no built-in behaviour.
    #[strum(serialize = "condition")]
    Condition,
    #[strum(serialize = "loop")]
    Loop,
    #[strum(serialize = "parallel")]
    Parallel,
    #[strum(serialize = "sequence")]
    Sequence,
    #[strum(serialize = "updateComponent")]
    UpdateComponent,
    #[strum(serialize = "showComponent")]
    ShowComponent,
    #[strum(serialize = "hideComponent")]
    HideComponent,
    #[strum(serialize = "showNotification")]
    ShowNotification,
    #[strum(serialize = "callWorkflow")]
    CallWorkflow,
    #[strum(default)]
    Unknown(String),
}

impl ActionKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SetState => "setState",
            Self::SetVariable => "setVariable",
            Self::CallApi => "callApi",
            Self::Navigate => "navigate",
            Self::ShowMessage => "showMessage",
            Self::OpenModal => "openModal",
            Self::CloseModal => "closeModal",
            Self::ExecuteCode => "executeCode",
            Self::TriggerEvent => "triggerEvent",
            Self::CallFunction => "callFunction",
            Self::Condition => "condition",
            Self::Loop => "loop",
            Self::Parallel => "parallel",
            Self::Sequence => "sequence",
            Self::UpdateComponent => "updateComponent",
            Self::ShowComponent => "showComponent",
            Self::HideComponent => "hideComponent",
            Self::ShowNotification => "showNotification",
            Self::CallWorkflow => "callWorkflow",
            Self::Unknown(name) => name,
        }
    }

    /// Kinds accepted in documents that have no executor behaviour.
    pub fn is_reserved(&self) -> bool {
        matches!(
            self,
            Self::Condition
                | Self::Loop
                | Self::Parallel
                | Self::Sequence
                | Self::UpdateComponent
                | Self::ShowComponent
                | Self::HideComponent
                | Self::ShowNotification
                | Self::CallWorkflow
        )
    }
}

/// Wires a string-tagged enum with a catch-all `Unknown(String)` variant into
/// serde and `Display` through its `as_str`/`FromStr` pair.
macro_rules! string_tagged {
    ($($kind:ident),+ $(,)?) => {$(
        impl From<String> for $kind {
            fn from(tag: String) -> Self {
                tag.parse().unwrap_or(Self::Unknown(tag))
            }
        }

        impl From<$kind> for String {
            fn from(kind: $kind) -> Self {
                kind.as_str().to_string()
            }
        }

        impl fmt::Display for $kind {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    )+};
}

string_tagged!(BindingKind, ConditionOperator, ActionKind);
