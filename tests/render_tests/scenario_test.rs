use std::sync::Arc;

use lowcoder_runtime::binding::DataBindingResolver;
use lowcoder_runtime::context::NamespaceKind;
use lowcoder_runtime::engine::{ComponentRegistry, EngineError};
use lowcoder_runtime::expression::ExpressionEvaluator;
use lowcoder_runtime::schema::{Binding, BindingKind};
use lowcoder_runtime::{RenderContext, RenderEngine, RenderOptions};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use super::{ids, parse_schema};

const TWO_TEXTS: &str = r#"
{
    "id": "conditional-page",
    "version": "1.0.0",
    "root": {
        "id": "root",
        "type": "Container",
        "children": [
            {
                "id": "greeting",
                "type": "Text",
                "condition": {"type": "simple", "field": "state.show", "operator": "equals", "value": true}
            },
            {"id": "footer", "type": "Text"}
        ]
    }
}
"#;

const ORDER_TABLE: &str = r#"
{
    "id": "orders",
    "version": "2.1.0",
    "root": {
        "id": "table",
        "type": "Table",
        "bindings": [
            {"target": "title", "type": "expression", "source": "'Orders of ' + user.name"},
            {"target": "first", "type": "datasource", "source": "orders[0].item", "defaultValue": "none"}
        ],
        "children": [
            {
                "id": "row",
                "type": "Row",
                "loop": {"dataSource": "data.orders", "itemKey": "order", "indexKey": "i"},
                "condition": {"type": "simple", "field": "variables.order.status", "operator": "notEquals", "value": "cancelled"},
                "bindings": [
                    {"target": "label", "type": "expression", "source": "(variables.i + 1) + '. ' + variables.order.item"},
                    {"target": "price", "type": "variable", "source": "order.price", "transform": "value * 2"}
                ]
            }
        ]
    }
}
"#;

#[tokio::test]
async fn test_false_condition_leaves_one_child() {
    let schema = parse_schema(TWO_TEXTS);
    let engine = RenderEngine::default();
    let context = RenderContext::new().with_state(json!({"show": false}));

    let result = engine.render(&schema, &context, None).await.unwrap();
    let root = result.root().unwrap();
    assert_eq!(root.children.len(), 1);
    assert_eq!(ids(&root.children), vec!["footer"]);

    context
        .assign(NamespaceKind::State, "show", json!(true))
        .unwrap();
    let result = engine.render(&schema, &context, None).await.unwrap();
    assert_eq!(ids(&result.root().unwrap().children), vec!["greeting", "footer"]);
}

#[test]
fn test_state_binding_with_default() {
    let resolver = DataBindingResolver::new(Arc::new(ExpressionEvaluator::new()));
    let binding = Binding::new("count", BindingKind::State, json!("count"));

    let context = RenderContext::new().with_state(json!({"count": 5}));
    assert_eq!(resolver.resolve(&binding, &context).unwrap(), json!(5));

    let binding = binding.with_default(json!(0));
    let context = RenderContext::new().with_state(json!({}));
    assert_eq!(resolver.resolve(&binding, &context).unwrap(), json!(0));
}

#[tokio::test]
async fn test_looped_rows_see_their_item_and_index() {
    let schema = parse_schema(ORDER_TABLE);
    let engine = RenderEngine::builder(Default::default())
        .component_resolver(Arc::new(ComponentRegistry::with_types(["Table", "Row"])))
        .build();
    let context = RenderContext::new()
        .with_data(json!({
            "orders": [
                {"item": "tea", "price": 3, "status": "paid"},
                {"item": "cake", "price": 5, "status": "cancelled"},
                {"item": "jam", "price": 4, "status": "open"}
            ]
        }))
        .with_user(json!({"name": "Ada"}));

    let result = engine.render(&schema, &context, None).await.unwrap();
    let table = result.root().unwrap();
    assert_eq!(table.props["title"], json!("Orders of Ada"));
    assert_eq!(table.props["first"], json!("tea"));
    assert!(!table.placeholder);

    let labels: Vec<&Value> = table.children.iter().map(|row| &row.props["label"]).collect();
    assert_eq!(labels, vec![&json!("1. tea"), &json!("3. jam")]);
    let prices: Vec<&Value> = table.children.iter().map(|row| &row.props["price"]).collect();
    assert_eq!(prices, vec![&json!(6), &json!(8)]);
    assert_eq!(
        result.data_dependencies,
        vec!["orders[0].item".to_string(), "variable:order.price".to_string()]
    );
}

#[tokio::test]
async fn test_loop_over_n_items_yields_n_siblings() {
    let schema = parse_schema(
        r#"{
            "id": "list",
            "version": "1.0.0",
            "root": {
                "id": "list",
                "type": "List",
                "children": [{"id": "item", "type": "Text", "loop": {"dataSource": "items"}}]
            }
        }"#,
    );
    let engine = RenderEngine::default();

    for n in [0usize, 1, 7] {
        let items: Vec<Value> = (0..n).map(|i| json!(i)).collect();
        let context = RenderContext::new().with_data(json!({ "items": items }));
        let result = engine.render(&schema, &context, None).await.unwrap();
        assert_eq!(result.root().unwrap().children.len(), n);
    }

    // Not a sequence: zero outputs and no error.
    let context = RenderContext::new().with_data(json!({"items": {"a": 1}}));
    let result = engine.render(&schema, &context, None).await.unwrap();
    assert!(result.root().unwrap().children.is_empty());
}

#[tokio::test]
async fn test_condition_is_checked_before_the_loop() {
    let schema = parse_schema(
        r#"{
            "id": "gated-list",
            "version": "1.0.0",
            "root": {
                "id": "list",
                "type": "List",
                "children": [{
                    "id": "item",
                    "type": "Text",
                    "loop": {"dataSource": ["a", "b", "c"]},
                    "condition": {"type": "complex", "logic": "and", "conditions": [
                        {"type": "raw", "expression": "state.enabled"},
                        {"type": "simple", "field": "variables.item", "operator": "notEquals", "value": "b"}
                    ]}
                }]
            }
        }"#,
    );
    let engine = RenderEngine::default();

    let context = RenderContext::new().with_state(json!({"enabled": false}));
    let result = engine.render(&schema, &context, None).await.unwrap();
    assert!(result.root().unwrap().children.is_empty());

    let context = RenderContext::new().with_state(json!({"enabled": true}));
    let result = engine.render(&schema, &context, None).await.unwrap();
    assert_eq!(result.root().unwrap().children.len(), 2);
}

#[tokio::test]
async fn test_lenient_binding_failures_do_not_abort() {
    let schema = parse_schema(
        r#"{
            "id": "lenient",
            "version": "1.0.0",
            "root": {
                "id": "root",
                "type": "Text",
                "bindings": [
                    {"target": "a", "type": "expression", "source": "1 +", "defaultValue": "fallback"},
                    {"target": "b", "type": "expression", "source": "nothing.here"},
                    {"target": "c", "type": "mystery", "source": "x"}
                ]
            }
        }"#,
    );
    let engine = RenderEngine::default();
    let result = engine
        .render(&schema, &RenderContext::new(), None)
        .await
        .unwrap();
    let props = &result.root().unwrap().props;
    assert_eq!(props["a"], json!("fallback"));
    assert_eq!(props["b"], Value::Null);
    assert_eq!(props["c"], Value::Null);
}

#[tokio::test]
async fn test_invalid_schema_never_renders() {
    let schema = parse_schema(
        r#"{
            "id": "dupes",
            "version": "1.0",
            "root": {"id": "x", "type": "Page", "children": [{"id": "x", "type": "Text"}]}
        }"#,
    );
    let engine = RenderEngine::default();
    let (mut events, mut errors) = engine.event_bus().subscribe();

    let err = engine
        .render(&schema, &RenderContext::new(), None)
        .await
        .unwrap_err();
    let EngineError::Validation(validation) = err else {
        panic!("expected a validation error, got {:?}", err);
    };
    assert_eq!(validation.violations.len(), 2);
    assert_eq!(errors.recv().await.unwrap().error_type, "RenderFailed");
    // Nothing was rendered, so no render notifications went out.
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_cancelled_render() {
    let schema = parse_schema(TWO_TEXTS);
    let engine = RenderEngine::default();
    let context = RenderContext::new();

    let cancelled = engine
        .render_with_cancel(&schema, &context, None, std::future::ready(()))
        .await;
    assert!(matches!(cancelled, Err(EngineError::Cancelled)));

    let completed = engine
        .render_with_cancel(&schema, &context, None, std::future::pending())
        .await;
    assert!(completed.is_ok());
}

#[tokio::test]
async fn test_performance_counters() {
    let schema = parse_schema(ORDER_TABLE);
    let engine = RenderEngine::default();
    let options = RenderOptions {
        enable_performance_tracking: true,
        ..Default::default()
    };
    let result = engine
        .render(&schema, &RenderContext::new(), Some(options))
        .await
        .unwrap();
    let performance = result.performance.as_ref().unwrap();
    assert_eq!(performance.component_count, 2);
    assert_eq!(performance.data_binding_count, 4);
    assert_eq!(performance.event_handler_count, 0);
    assert_eq!(
        result.component_dependencies,
        vec!["Table".to_string(), "Row".to_string()]
    );
}
