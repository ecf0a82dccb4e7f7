use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::state::AppState;

/// Build the admin HTTP API router: stream CRUD plus a health check.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/streams", get(handlers::list_streams))
        .route("/streams/:name", get(handlers::get_stream))
        .route("/streams/:name", put(handlers::put_stream))
        .route("/streams/:name", delete(handlers::delete_stream))
        .route("/streams/:name/play", post(handlers::play_stream));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
