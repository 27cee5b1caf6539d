use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::get,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::db::store::{Directory, TrackingStore};
use crate::server::config::ServerConfig;
use crate::server::hub::HubHandle;
use crate::tracking::ingestion::IngestionService;
use crate::tracking::rate_limiter::RateLimiter;
use crate::tracking::shift_manager::ShiftManager;
use crate::web::{
    handlers::websocket_handler,
    middleware::auth,
    routes::{manager_routes, tracking_routes},
};

pub use crate::web::error::AppError;

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn TrackingStore>,
    pub directory: Arc<dyn Directory>,
    pub shifts: Arc<ShiftManager>,
    pub ingestion: Arc<IngestionService>,
    pub hub: HubHandle,
}

impl AppState {
    pub fn new<S>(
        config: Arc<ServerConfig>,
        store: Arc<S>,
        directory: Arc<dyn Directory>,
        hub: HubHandle,
    ) -> Self
    where
        S: TrackingStore + 'static,
    {
        let shifts = Arc::new(ShiftManager::new(store.clone(), store.clone()));
        let ingestion = Arc::new(IngestionService::new(
            RateLimiter::new(Duration::from_secs(config.ping_rate_limit_seconds)),
            shifts.clone(),
            store.clone(),
            directory.clone(),
            hub.clone(),
        ));
        Self {
            config,
            store,
            directory,
            shifts,
            ingestion,
            hub,
        }
    }
}

async fn health_check_handler(State(app_state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let ws_clients = app_state.hub.client_count(None).await.ok();
    Json(serde_json::json!({ "status": "ok", "ws_clients": ws_clients }))
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origin = match HeaderValue::from_str(&config.frontend_url) {
        Ok(value) => AllowOrigin::exact(value),
        Err(e) => {
            warn!(frontend_url = %config.frontend_url, error = %e, "Invalid frontend URL, allowing any origin.");
            AllowOrigin::from(Any)
        }
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(vec![Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub fn create_axum_router(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(&app_state.config);

    Router::new()
        .route("/api/health", get(health_check_handler))
        .nest(
            "/api/v1/manager",
            manager_routes::create_manager_router()
                .route_layer(axum_middleware::from_fn(auth::require_manager))
                .route_layer(axum_middleware::from_fn_with_state(app_state.clone(), auth::auth)),
        )
        .nest(
            "/api/v1",
            tracking_routes::create_driver_router()
                .route_layer(axum_middleware::from_fn(auth::require_driver))
                .route_layer(axum_middleware::from_fn_with_state(app_state.clone(), auth::auth)),
        )
        .route("/ws/tracking/live", get(websocket_handler::live_websocket_handler))
        .route("/ws/alerts", get(websocket_handler::live_websocket_handler))
        .with_state(app_state)
        .layer(cors)
}
