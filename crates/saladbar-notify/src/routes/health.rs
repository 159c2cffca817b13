use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let stats = state.broker.stats();
    Json(json!({
        "status": "healthy",
        "service": "saladbar-notify",
        "version": env!("CARGO_PKG_VERSION"),
        "subscribers": {
            "active": stats.active,
            "max": stats.max,
        }
    }))
}
