use lowcoder_runtime::context::NamespaceKind;
use lowcoder_runtime::event::{EventType, ExecutionReport};
use lowcoder_runtime::schema::{Action, ActionKind, EventHandler};
use lowcoder_runtime::{RenderContext, RenderEngine, Schema};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use super::{mark, set_state};

const SIGNUP_FORM: &str = r#"
{
    "id": "signup",
    "version": "1.0.0",
    "root": {
        "id": "form",
        "type": "Form",
        "children": [
            {
                "id": "submit",
                "type": "Button",
                "events": [{
                    "event": "submit",
                    "actions": [
                        {"type": "setState", "config": {"key": "form.email", "value": "{{ eventData.email }}"}},
                        {"type": "setState", "config": {"key": "greeting", "value": "Welcome {{ state.form.email }}"}},
                        {"type": "navigate", "config": {"url": "/welcome?u={{ eventData.email }}"}}
                    ]
                }]
            },
            {
                "id": "status",
                "type": "Text",
                "events": [{
                    "event": "reset",
                    "condition": {"type": "raw", "expression": "state.form.email != null"},
                    "actions": [
                        {"type": "setState", "config": {"key": "form", "value": {}}},
                        {"type": "showMessage", "config": {"message": "Form cleared"}}
                    ]
                }]
            }
        ]
    }
}
"#;

async fn run(engine: &RenderEngine, event: &str, data: Value, ctx: &RenderContext) -> ExecutionReport {
    engine.dispatch(event, data, ctx).await
}

#[tokio::test]
async fn test_mount_dispatch_unmount() {
    let schema = Schema::from_json(SIGNUP_FORM).unwrap();
    let engine = RenderEngine::default();
    assert_eq!(engine.mount(&schema).unwrap(), 2);
    let (mut events, _) = engine.event_bus().subscribe();

    let ctx = RenderContext::new();
    let report = run(&engine, "submit", json!({"email": "ada@example.com"}), &ctx).await;
    assert!(report.is_success());
    assert_eq!(ctx.lookup(NamespaceKind::State, "greeting"), json!("Welcome ada@example.com"));

    let mut navigated = None;
    while let Some(event) = events.try_recv() {
        if event.event_type == EventType::Navigate {
            navigated = Some(event.parameter("url"));
        }
    }
    assert_eq!(navigated, Some(json!("/welcome?u=ada@example.com")));

    let report = run(&engine, "reset", Value::Null, &ctx).await;
    assert_eq!((report.handled, report.skipped), (1, 0));
    assert_eq!(ctx.lookup(NamespaceKind::State, "form"), json!({}));
    let report = run(&engine, "reset", Value::Null, &ctx).await;
    assert_eq!((report.handled, report.skipped), (0, 1));

    assert_eq!(engine.unmount(&schema), 2);
    let report = run(&engine, "submit", json!({"email": "x"}), &ctx).await;
    assert_eq!(report.handled, 0);
}

#[tokio::test]
async fn test_on_success_runs_before_next_sibling() {
    let engine = RenderEngine::default();
    engine.executor().register(
        "form",
        EventHandler::new(
            "save",
            vec![
                mark("a").on_success(vec![mark("b").on_success(vec![mark("c")])]),
                mark("d"),
            ],
        ),
    );

    let ctx = RenderContext::new();
    let report = run(&engine, "save", Value::Null, &ctx).await;
    assert!(report.is_success());
    assert_eq!(ctx.lookup(NamespaceKind::State, "trail"), json!("abcd"));
}

#[tokio::test]
async fn test_on_error_swallows_the_fault() {
    let engine = RenderEngine::default();
    engine.executor().register(
        "form",
        EventHandler::new(
            "save",
            vec![
                mark("a"),
                Action::new(ActionKind::Navigate, json!({}))
                    .on_error(vec![set_state("lastError", json!("{{ eventData.error }}"))])
                    .on_success(vec![mark("never")]),
                mark("b"),
            ],
        ),
    );

    let ctx = RenderContext::new();
    let report = run(&engine, "save", json!({"id": 1}), &ctx).await;
    assert!(report.is_success());
    assert_eq!(ctx.lookup(NamespaceKind::State, "trail"), json!("ab"));
    assert_eq!(
        ctx.lookup(NamespaceKind::State, "lastError"),
        json!("navigate action requires `url`")
    );
}

#[tokio::test]
async fn test_failure_without_on_error_stops_only_that_handler() {
    let engine = RenderEngine::default();
    let (_, mut errors) = engine.event_bus().subscribe();
    let failing = EventHandler::new(
        "save",
        vec![
            Action::new(ActionKind::ExecuteCode, json!({"code": "1 +"})),
            set_state("unreachable", json!(true)),
        ],
    );
    engine.executor().register("a", failing);
    engine.executor().register(
        "b",
        EventHandler::new("save", vec![set_state("sibling", json!(true))]),
    );

    let ctx = RenderContext::new();
    let report = run(&engine, "save", Value::Null, &ctx).await;
    assert_eq!(report.handled, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].node_id, "a");
    assert_eq!(ctx.lookup(NamespaceKind::State, "unreachable"), Value::Null);
    assert_eq!(ctx.lookup(NamespaceKind::State, "sibling"), json!(true));

    let error = errors.recv().await.unwrap();
    assert_eq!(error.error_type, "HandlerFailed");
    assert_eq!(error.parameters["nodeId"], json!("a"));
    assert_eq!(error.parameters["executionId"], json!(report.execution_id));
}

#[tokio::test]
async fn test_trigger_event_and_variables() {
    let engine = RenderEngine::default();
    engine.executor().register(
        "list",
        EventHandler::new(
            "select",
            vec![
                Action::new(
                    ActionKind::SetVariable,
                    json!({"key": "selected", "value": "{{ eventData.row }}"}),
                ),
                Action::new(
                    ActionKind::TriggerEvent,
                    json!({"event": "selected", "data": {"row": "{{ eventData.row }}"}}),
                ),
            ],
        ),
    );
    engine.executor().register(
        "detail",
        EventHandler::new(
            "selected",
            vec![Action::new(
                ActionKind::OpenModal,
                json!({"modalId": "detail-{{ eventData.row }}"}),
            )],
        ),
    );
    let (mut events, _) = engine.event_bus().subscribe();

    let ctx = RenderContext::new();
    let report = run(&engine, "select", json!({"row": 3}), &ctx).await;
    assert!(report.is_success());
    assert_eq!(ctx.lookup(NamespaceKind::Variables, "selected"), json!(3));

    let mut opened = None;
    while let Some(event) = events.try_recv() {
        if event.event_type == EventType::OpenModal {
            opened = Some(event.parameter("modalId"));
        }
    }
    assert_eq!(opened, Some(json!("detail-3")));
}
