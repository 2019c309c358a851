//! Health check endpoint.

use crate::AppState;
use axum::{extract::State, Json};
use pastebin_core::constants::HEALTH_CHECK_KEY;
use serde_json::{json, Value};

/// Report whether the store answers a trivial read within the health timeout.
///
/// Always 200; the body says `{"ok": true}` or `{"ok": false}`.
pub async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let ok = state
        .service
        .kv()
        .ping(HEALTH_CHECK_KEY, state.config.health_timeout)
        .await;
    Json(json!({ "ok": ok }))
}
