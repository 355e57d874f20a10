use axum::{Json, extract::State};
use serde_json::{Value as JsonValue, json};

use crate::state::AppState;

pub(crate) async fn index_handler(State(state): State<AppState>) -> Json<JsonValue> {
    Json(json!({
        "name": "quillpad-server",
        "version": env!("CARGO_PKG_VERSION"),
        "serverId": state.server_id,
    }))
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> Json<JsonValue> {
    Json(json!({
        "status": "ok",
        "connections": state.metrics.connections(),
    }))
}
