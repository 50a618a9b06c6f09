//! Single-pass schema statistics, structural validation and dependency keys.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::schema::{Action, Binding, BindingKind, Node, Schema};

lazy_static! {
    static ref SEMVER: Regex =
        Regex::new(r"^\d+\.\d+\.\d+(-[0-9A-Za-z.-]+)?(\+[0-9A-Za-z.-]+)?$").unwrap();
}

/// Every handler declared in a tree, flattened with its owning node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerEntry {
    pub node_id: String,
    pub event: String,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaAnalysis {
    /// Distinct type tags in first-seen order.
    pub component_dependencies: Vec<String>,
    pub data_bindings: Vec<Binding>,
    pub event_handlers: Vec<HandlerEntry>,
    pub conditional_nodes: Vec<String>,
    pub loop_nodes: Vec<String>,
    pub max_depth: usize,
    pub total_nodes: usize,
}

pub fn analyze_schema(schema: &Schema) -> SchemaAnalysis {
    let mut analysis = SchemaAnalysis::default();
    let Some(root) = &schema.root else {
        return analysis;
    };

    let mut seen_types = HashSet::new();
    root.walk(&mut |node: &Node, depth| {
        analysis.total_nodes += 1;
        analysis.max_depth = analysis.max_depth.max(depth);

        if seen_types.insert(node.node_type.clone()) {
            analysis.component_dependencies.push(node.node_type.clone());
        }
        analysis.data_bindings.extend(node.bindings.iter().cloned());
        analysis
            .event_handlers
            .extend(node.events.iter().map(|handler| HandlerEntry {
                node_id: node.id.clone(),
                event: handler.event.clone(),
                actions: handler.actions.clone(),
            }));
        if node.condition.is_some() {
            analysis.conditional_nodes.push(node.id.clone());
        }
        if node.repeat.is_some() {
            analysis.loop_nodes.push(node.id.clone());
        }
    });

    analysis
}

/// Semantic dependency keys of every binding: the raw path for `datasource`,
/// `state:<path>` and `variable:<path>` for the namespace kinds.
pub fn extract_data_dependencies(schema: &Schema) -> Vec<String> {
    let mut seen = HashSet::new();
    analyze_schema(schema)
        .data_bindings
        .iter()
        .filter_map(|binding| {
            let source = binding.source_str()?;
            match binding.kind {
                BindingKind::Datasource => Some(source.to_string()),
                BindingKind::State => Some(format!("state:{}", source)),
                BindingKind::Variable => Some(format!("variable:{}", source)),
                _ => None,
            }
        })
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

/// One structural problem found by [`validate_schema`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum Violation {
    #[error("Schema must have a root node")]
    MissingRoot,
    #[error("Schema must have a version")]
    MissingVersion,
    #[error("Schema version `{0}` is not a semantic version")]
    InvalidVersion(String),
    #[error("Schema must have an id")]
    MissingId,
    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),
    #[error("Node of type `{0}` has an empty id")]
    EmptyNodeId(String),
    #[error("Node `{0}` has an empty type")]
    EmptyNodeType(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<Violation>,
}

impl ValidationReport {
    pub fn into_result(self) -> Result<(), SchemaValidationError> {
        if self.valid {
            Ok(())
        } else {
            Err(SchemaValidationError {
                violations: self.errors,
            })
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Schema validation failed: {}", .violations.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
pub struct SchemaValidationError {
    pub violations: Vec<Violation>,
}

pub fn validate_schema(schema: &Schema) -> ValidationReport {
    let mut errors = Vec::new();

    if schema.root.is_none() {
        errors.push(Violation::MissingRoot);
    }
    if schema.version.is_empty() {
        errors.push(Violation::MissingVersion);
    } else if !SEMVER.is_match(&schema.version) {
        errors.push(Violation::InvalidVersion(schema.version.clone()));
    }
    if schema.id.is_empty() {
        errors.push(Violation::MissingId);
    }

    if let Some(root) = &schema.root {
        let mut ids = HashSet::new();
        root.walk(&mut |node: &Node, _| {
            if node.id.is_empty() {
                errors.push(Violation::EmptyNodeId(node.node_type.clone()));
            } else if !ids.insert(node.id.clone()) {
                errors.push(Violation::DuplicateNodeId(node.id.clone()));
            }
            if node.node_type.is_empty() {
                errors.push(Violation::EmptyNodeType(node.id.clone()));
            }
        });
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

/// 32-bit rolling hash over the canonical JSON form, base-36 encoded.
pub fn compute_schema_hash(schema: &Schema) -> String {
    let canonical = serde_json::to_string(schema).unwrap_or_default();
    let hash = canonical
        .encode_utf16()
        .fold(0i32, |hash, unit| {
            hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(unit as i32)
        });
    to_base36((hash as i64).unsigned_abs())
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceLimitError {
    #[error("Schema depth {depth} exceeds the limit of {limit}")]
    MaxDepth { depth: usize, limit: usize },

    #[error("Schema has {nodes} nodes, more than the limit of {limit}")]
    MaxNodes { nodes: usize, limit: usize },
}

/// Checks the analysed tree against the configured ceilings.
pub fn check_limits(
    analysis: &SchemaAnalysis,
    max_depth: usize,
    max_nodes: usize,
) -> Result<(), ResourceLimitError> {
    if analysis.max_depth > max_depth {
        return Err(ResourceLimitError::MaxDepth {
            depth: analysis.max_depth,
            limit: max_depth,
        });
    }
    if analysis.total_nodes > max_nodes {
        return Err(ResourceLimitError::MaxNodes {
            nodes: analysis.total_nodes,
            limit: max_nodes,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Action, ActionKind, Binding, Condition, EventHandler, Loop};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> Schema {
        let mut title = Node::new("title", "Text");
        title.bindings = vec![
            Binding::new("text", BindingKind::State, json!("title")),
            Binding::new("color", BindingKind::Static, json!("red")),
        ];
        title.condition = Some(Condition::raw("state.visible"));

        let mut row = Node::new("row", "Text");
        row.repeat = Some(Loop::over_path("data.items"));
        row.bindings = vec![
            Binding::new("text", BindingKind::Variable, json!("item.name")),
            Binding::new("hint", BindingKind::Datasource, json!("items")),
        ];

        let mut list = Node::new("list", "List");
        list.children = vec![row];
        list.slots.insert("footer".to_string(), vec![Node::new("footer", "Text")]);

        let mut root = Node::new("root", "Page");
        root.events = vec![EventHandler::new(
            "load",
            vec![Action::new(ActionKind::SetState, json!({"key": "ready", "value": true}))],
        )];
        root.children = vec![title, list];
        Schema::new("page", "1.0.0", root)
    }

    #[test]
    fn test_analyze_counts_children_and_slots() {
        let analysis = analyze_schema(&sample());
        assert_eq!(analysis.total_nodes, 5);
        assert_eq!(analysis.max_depth, 2);
        assert_eq!(analysis.component_dependencies, vec!["Page", "Text", "List"]);
        assert_eq!(analysis.data_bindings.len(), 4);
        assert_eq!(analysis.event_handlers[0].node_id, "root");
        assert_eq!(analysis.conditional_nodes, vec!["title"]);
        assert_eq!(analysis.loop_nodes, vec!["row"]);
    }

    #[test]
    fn test_dependencies() {
        assert_eq!(
            extract_data_dependencies(&sample()),
            vec!["state:title", "variable:item.name", "items"]
        );
    }

    #[test]
    fn test_validate_flags_duplicates_in_slots() {
        let mut schema = sample();
        if let Some(root) = schema.root.as_mut() {
            root.slots.insert("extra".to_string(), vec![Node::new("title", "Text")]);
        }
        let report = validate_schema(&schema);
        assert!(!report.valid);
        assert_eq!(report.errors, vec![Violation::DuplicateNodeId("title".to_string())]);
        assert!(validate_schema(&sample()).valid);
    }

    #[test]
    fn test_validate_header_fields() {
        let schema = Schema {
            version: "one".to_string(),
            ..Default::default()
        };
        let report = validate_schema(&schema);
        assert_eq!(
            report.errors,
            vec![
                Violation::MissingRoot,
                Violation::InvalidVersion("one".to_string()),
                Violation::MissingId,
            ]
        );
        let err = report.into_result().unwrap_err();
        assert!(err.to_string().contains("Schema must have an id"));
    }

    #[test]
    fn test_validate_empty_node_fields() {
        let mut root = Node::new("root", "Page");
        root.children = vec![Node::new("", "Text"), Node::new("blank", "")];
        let report = validate_schema(&Schema::new("p", "2.1.0-beta.1", root));
        assert_eq!(
            report.errors,
            vec![
                Violation::EmptyNodeId("Text".to_string()),
                Violation::EmptyNodeType("blank".to_string()),
            ]
        );
    }

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let schema = sample();
        let hash = compute_schema_hash(&schema);
        assert_eq!(hash, compute_schema_hash(&schema.clone()));
        assert!(hash.chars().all(|c| c.is_ascii_alphanumeric()));

        let mut changed = schema;
        changed.version = "1.0.1".to_string();
        assert_ne!(hash, compute_schema_hash(&changed));
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn test_limits() {
        let analysis = analyze_schema(&sample());
        assert!(check_limits(&analysis, 2, 5).is_ok());
        assert_eq!(
            check_limits(&analysis, 1, 5),
            Err(ResourceLimitError::MaxDepth { depth: 2, limit: 1 })
        );
        assert_eq!(
            check_limits(&analysis, 10, 4),
            Err(ResourceLimitError::MaxNodes { nodes: 5, limit: 4 })
        );
    }
}
