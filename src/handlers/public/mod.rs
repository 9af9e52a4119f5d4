// handlers/public/mod.rs - Public handlers (no credential required)

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET / - Service banner
pub async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Workspace Gate",
            "version": version,
            "description": "Workspace-scoped user and group API",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "search": "/api/users/search?query= (session)",
                "migrate": "/api/workspaces/:ws_id/migrate/users, /api/workspaces/:ws_id/users/groups/indicators/migrate",
                "v1": "/api/v1/workspaces/:ws_id/* (session or API_KEY header)",
            }
        }
    }))
}

/// GET /health - Liveness plus a store round trip
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "database": "unavailable"
                    }
                })),
            )
        }
    }
}
