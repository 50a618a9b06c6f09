//! The mutable data context a render or an event pipeline runs against.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};

use crate::path::{self, PathError, PathSegment};

/// A shared, concurrently writable namespace of top-level keys.
pub type Namespace = Arc<DashMap<String, Value>>;

/// Flattened name → value bindings handed to the expression evaluator.
pub type Scope = HashMap<String, Value>;

/// The namespaces a field path may be rooted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum NamespaceKind {
    Data,
    State,
    Variables,
    Params,
    Query,
    User,
    Tenant,
}

/// Mutable, externally owned namespaces plus read-only `user`/`tenant` records.
///
/// Cloning is cheap and shares every namespace. A loop iteration derives a child
/// with [`RenderContext::with_variables`], which copies only `variables`.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    pub data: Namespace,
    pub state: Namespace,
    pub variables: Namespace,
    pub params: Namespace,
    pub query: Namespace,
    pub user: Arc<Value>,
    pub tenant: Arc<Value>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(self, data: Value) -> Self {
        fill(&self.data, data);
        self
    }

    pub fn with_state(self, state: Value) -> Self {
        fill(&self.state, state);
        self
    }

    pub fn with_params(self, params: Value) -> Self {
        fill(&self.params, params);
        self
    }

    pub fn with_query(self, query: Value) -> Self {
        fill(&self.query, query);
        self
    }

    pub fn with_user(mut self, user: Value) -> Self {
        self.user = Arc::new(user);
        self
    }

    pub fn with_tenant(mut self, tenant: Value) -> Self {
        self.tenant = Arc::new(tenant);
        self
    }

    /// Builds a context from a JSON document with optional
    /// `data/state/variables/params/query/user/tenant` members.
    pub fn from_json(value: &Value) -> Self {
        let context = Self::new();
        for kind in [
            NamespaceKind::Data,
            NamespaceKind::State,
            NamespaceKind::Variables,
            NamespaceKind::Params,
            NamespaceKind::Query,
        ] {
            if let (Some(ns), Some(members)) = (context.namespace(kind), value.get(kind.to_string())) {
                fill(ns, members.clone());
            }
        }
        context
            .with_user(value.get("user").cloned().unwrap_or(Value::Null))
            .with_tenant(value.get("tenant").cloned().unwrap_or(Value::Null))
    }

    /// Derives a child context whose `variables` are a copy of this one's,
    /// extended with `extra`. All other namespaces stay shared.
    pub fn with_variables<I>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let variables: DashMap<String, Value> = self
            .variables
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        for (key, value) in extra {
            variables.insert(key, value);
        }
        Self {
            variables: Arc::new(variables),
            ..self.clone()
        }
    }

    /// The writable map behind a namespace; `None` for the read-only records.
    pub fn namespace(&self, kind: NamespaceKind) -> Option<&Namespace> {
        match kind {
            NamespaceKind::Data => Some(&self.data),
            NamespaceKind::State => Some(&self.state),
            NamespaceKind::Variables => Some(&self.variables),
            NamespaceKind::Params => Some(&self.params),
            NamespaceKind::Query => Some(&self.query),
            NamespaceKind::User | NamespaceKind::Tenant => None,
        }
    }

    /// Snapshot of a whole namespace as a JSON value.
    pub fn snapshot(&self, kind: NamespaceKind) -> Value {
        match kind {
            NamespaceKind::User => self.user.as_ref().clone(),
            NamespaceKind::Tenant => self.tenant.as_ref().clone(),
            _ => self
                .namespace(kind)
                .map(|ns| snapshot_namespace(ns))
                .unwrap_or(Value::Null),
        }
    }

    /// Resolves a dotted path inside one namespace. Missing values are `null`.
    pub fn lookup(&self, kind: NamespaceKind, path: &str) -> Value {
        let segments = path::parse_path(path);
        match kind {
            NamespaceKind::User => resolve(&self.user, &segments),
            NamespaceKind::Tenant => resolve(&self.tenant, &segments),
            _ => {
                let Some(ns) = self.namespace(kind) else {
                    return Value::Null;
                };
                match segments.split_first() {
                    None => snapshot_namespace(ns),
                    Some((PathSegment::Key(key), rest)) => ns
                        .get(key)
                        .map(|entry| resolve(entry.value(), rest))
                        .unwrap_or(Value::Null),
                    Some((PathSegment::Index(_), _)) => Value::Null,
                }
            }
        }
    }

    /// Writes a value at a dotted path inside a writable namespace.
    pub fn assign(&self, kind: NamespaceKind, path: &str, value: Value) -> Result<(), PathError> {
        let segments = path::parse_path(path);
        let ns = self.namespace(kind).ok_or(PathError::NotAContainer {
            segment: kind.to_string(),
            found: "read-only record",
        })?;
        match segments.split_first() {
            None => Err(PathError::Empty),
            Some((PathSegment::Key(key), rest)) => {
                let mut entry = ns.entry(key.clone()).or_insert(Value::Null);
                path::set_path(entry.value_mut(), rest, value)
            }
            Some((PathSegment::Index(index), _)) => Err(PathError::NotAContainer {
                segment: format!("[{}]", index),
                found: "namespace",
            }),
        }
    }

    /// Flattens every namespace into an expression scope.
    pub fn to_scope(&self) -> Scope {
        use strum::IntoEnumIterator;
        NamespaceKind::iter()
            .map(|kind| (kind.to_string(), self.snapshot(kind)))
            .collect()
    }
}

fn fill(ns: &Namespace, value: Value) {
    if let Value::Object(map) = value {
        for (key, value) in map {
            ns.insert(key, value);
        }
    }
}

fn snapshot_namespace(ns: &Namespace) -> Value {
    Value::Object(
        ns.iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect::<Map<String, Value>>(),
    )
}

fn resolve(root: &Value, segments: &[PathSegment]) -> Value {
    path::get_path(root, segments).cloned().unwrap_or(Value::Null)
}
