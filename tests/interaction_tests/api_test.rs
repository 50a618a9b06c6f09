use std::sync::Arc;

use lowcoder_runtime::context::NamespaceKind;
use lowcoder_runtime::event::{ApiClient, ApiRequest, EventType, HttpApiClient, MockApiClient, NetworkError};
use lowcoder_runtime::schema::{Action, ActionKind, EventHandler};
use lowcoder_runtime::{EngineConfig, RenderContext, RenderEngine};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tracing::debug;

use super::set_state;
use crate::should_run_external_api_tests;

fn save_user() -> Action {
    Action::new(
        ActionKind::CallApi,
        json!({
            "url": "https://api.example.com/users/{{ eventData.id }}",
            "method": "PUT",
            "headers": {"X-Tenant": "{{ state.tenant }}"},
            "body": {"name": "{{ state.name }}", "age": "{{ eventData.age }}"},
            "resultKey": "saved"
        }),
    )
}

#[tokio::test]
async fn test_call_api_templates_request_and_stores_result() {
    let mut api = MockApiClient::new();
    api.expect_call()
        .withf(|request: &ApiRequest| {
            request.url == "https://api.example.com/users/42"
                && request.method == "PUT"
                && request.headers.get("X-Tenant").map(String::as_str) == Some("acme")
                && request.body == Some(json!({"name": "Ada", "age": 36}))
        })
        .times(1)
        .returning(|_| Ok(json!({"id": 42, "ok": true})));

    let engine = RenderEngine::builder(EngineConfig::default())
        .api_client(Arc::new(api))
        .build();
    engine.executor().register(
        "profile",
        EventHandler::new(
            "save",
            vec![save_user().on_success(vec![set_state("status", json!("saved {{ state.saved.id }}"))])],
        ),
    );
    let (mut events, _) = engine.event_bus().subscribe();

    let ctx = RenderContext::new().with_state(json!({"tenant": "acme", "name": "Ada"}));
    let report = engine.dispatch("save", json!({"id": 42, "age": 36}), &ctx).await;
    assert!(report.is_success());
    assert_eq!(ctx.lookup(NamespaceKind::State, "saved.ok"), json!(true));
    assert_eq!(ctx.lookup(NamespaceKind::State, "status"), json!("saved 42"));

    let mut called = Vec::new();
    while let Some(event) = events.try_recv() {
        if event.event_type == EventType::ApiCalled {
            called.push(event.parameter("url"));
        }
    }
    assert_eq!(called, vec![json!("https://api.example.com/users/42")]);
}

#[tokio::test]
async fn test_failed_call_runs_on_error_with_payload() {
    let mut api = MockApiClient::new();
    api.expect_call().times(1).returning(|request| {
        Err(NetworkError::Status {
            url: request.url,
            status: 503,
        })
    });

    let engine = RenderEngine::builder(EngineConfig::default())
        .api_client(Arc::new(api))
        .build();
    engine.executor().register(
        "profile",
        EventHandler::new(
            "save",
            vec![
                save_user().on_error(vec![
                    set_state("error", json!("{{ eventData.error }}")),
                    set_state("retryId", json!("{{ eventData.originalEventData.id }}")),
                ]),
                set_state("finished", json!(true)),
            ],
        ),
    );

    let ctx = RenderContext::new();
    let report = engine.dispatch("save", json!({"id": 7}), &ctx).await;
    assert!(report.is_success());
    assert_eq!(
        ctx.lookup(NamespaceKind::State, "error"),
        json!("https://api.example.com/users/7 answered 503")
    );
    assert_eq!(ctx.lookup(NamespaceKind::State, "retryId"), json!(7));
    assert_eq!(ctx.lookup(NamespaceKind::State, "saved"), Value::Null);
    assert_eq!(ctx.lookup(NamespaceKind::State, "finished"), json!(true));
}

#[tokio::test]
async fn test_http_client_round_trip() {
    if !should_run_external_api_tests() {
        return;
    }

    let client = HttpApiClient::new();
    let mut request = ApiRequest::get("https://httpbin.org/anything");
    request.method = "POST".to_string();
    request.headers.insert("X-Probe".to_string(), "lowcoder".to_string());
    request.body = Some(json!({"hello": "world"}));

    let response = client.call(request).await.unwrap();
    debug!("httpbin answered: {}", response);
    assert_eq!(response["json"], json!({"hello": "world"}));
    assert_eq!(response["headers"]["X-Probe"], json!("lowcoder"));

    let missing = client
        .call(ApiRequest::get("https://httpbin.org/status/404"))
        .await;
    assert!(matches!(missing, Err(NetworkError::Status { status: 404, .. })));
}
