use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use crate::config::SecurityConfig;
use crate::handlers::{protected, public, v1};
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let config = state.config.clone();

    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        // Credentialed
        .merge(protected_routes())
        .merge(v1_routes())
        // Global middleware
        .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes))
        .layer(cors_layer(&config.security))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users/search", get(protected::users_search))
        .route("/api/workspaces/:ws_id/migrate/users", post(protected::migrate_users))
        .route(
            "/api/workspaces/:ws_id/users/groups/indicators/migrate",
            put(protected::migrate_indicators),
        )
}

fn v1_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/workspaces/:ws_id/users", get(v1::users_list))
        .route("/api/v1/workspaces/:ws_id/user-groups/:group_id/count", get(v1::group_count))
        .route("/api/v1/workspaces/:ws_id/inventory/units/count", get(v1::inventory_units_count))
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if !security.enable_cors {
        return CorsLayer::new();
    }
    if security.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Bind `0.0.0.0:port` and serve until the process exits
pub async fn serve(state: AppState, port: u16) -> std::io::Result<()> {
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Workspace gate listening on http://{}", bind_addr);

    axum::serve(listener, app(state)).await
}

/// Install the fmt subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("workspace_gate=info,tower_http=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
