mod api_test;
mod chain_test;
mod coalesce_test;

use lowcoder_runtime::schema::{Action, ActionKind};
use serde_json::{json, Value};

pub fn set_state(key: &str, value: Value) -> Action {
    Action::new(ActionKind::SetState, json!({"key": key, "value": value}))
}

/// Appends `mark` to `state.trail`, so tests can read back execution order.
pub fn mark(mark: &str) -> Action {
    Action::new(
        ActionKind::ExecuteCode,
        json!({"code": format!("(state.trail || '') + '{}'", mark), "resultKey": "trail"}),
    )
}
