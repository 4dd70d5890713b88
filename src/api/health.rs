use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Liveness check with process uptime.
pub fn health_handler(state: &AppState) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.uptime_secs(),
    }))
}
