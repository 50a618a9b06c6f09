use std::sync::{Arc, Mutex};
use std::time::Duration;

use lowcoder_runtime::event::EventExecutor;
use lowcoder_runtime::schema::{Action, ActionKind, EventHandler};
use lowcoder_runtime::RenderContext;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};

type Calls = Arc<Mutex<Vec<(Duration, Value)>>>;

/// An executor whose `record` function logs the elapsed time and payload of
/// every call.
fn recording_executor(start: Instant) -> (EventExecutor, Calls) {
    let executor = EventExecutor::default();
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    executor.register_function("record", move |_args, data| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push((start.elapsed(), data));
            Ok::<_, String>(Value::Null)
        }
    });
    (executor, calls)
}

fn recording_handler() -> EventHandler {
    EventHandler::new(
        "input",
        vec![Action::new(ActionKind::CallFunction, json!({"function": "record"}))],
    )
}

#[tokio::test(start_paused = true)]
async fn test_debounce_fires_only_the_trailing_call() {
    let start = Instant::now();
    let (executor, calls) = recording_executor(start);
    let mut handler = recording_handler();
    handler.debounce = Some(100);
    executor.register("search", handler);
    let ctx = RenderContext::new();

    let report = executor.execute("input", json!({"t": 0}), &ctx).await;
    assert_eq!((report.handled, report.scheduled), (0, 1));
    sleep(Duration::from_millis(50)).await;
    executor.execute("input", json!({"t": 50}), &ctx).await;
    sleep(Duration::from_millis(30)).await;
    executor.execute("input", json!({"t": 80}), &ctx).await;

    sleep(Duration::from_millis(90)).await;
    assert!(calls.lock().unwrap().is_empty());

    sleep(Duration::from_millis(100)).await;
    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    let (at, payload) = &calls[0];
    assert!(*at >= Duration::from_millis(180), "fired at {:?}", at);
    assert_eq!(payload, &json!({"t": 80}));
}

#[tokio::test(start_paused = true)]
async fn test_throttle_allows_one_call_per_window() {
    let start = Instant::now();
    let (executor, calls) = recording_executor(start);
    let mut handler = recording_handler();
    handler.throttle = Some(100);
    executor.register("scroll", handler);
    let ctx = RenderContext::new();

    let first = executor.execute("input", json!(1), &ctx).await;
    assert_eq!((first.handled, first.suppressed), (1, 0));
    sleep(Duration::from_millis(40)).await;
    let second = executor.execute("input", json!(2), &ctx).await;
    assert_eq!((second.handled, second.suppressed), (0, 1));
    sleep(Duration::from_millis(70)).await;
    let third = executor.execute("input", json!(3), &ctx).await;
    assert_eq!((third.handled, third.suppressed), (1, 0));

    let payloads: Vec<Value> = calls.lock().unwrap().iter().map(|(_, p)| p.clone()).collect();
    assert_eq!(payloads, vec![json!(1), json!(3)]);
}

#[tokio::test(start_paused = true)]
async fn test_unregister_cancels_pending_debounce() {
    let (executor, calls) = recording_executor(Instant::now());
    let mut handler = recording_handler();
    handler.debounce = Some(100);
    executor.register("search", handler);
    let ctx = RenderContext::new();

    executor.execute("input", json!({"t": 0}), &ctx).await;
    assert_eq!(executor.unregister("search", Some("input")), 1);
    sleep(Duration::from_millis(200)).await;
    assert!(calls.lock().unwrap().is_empty());
}
