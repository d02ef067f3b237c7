use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::ApiState;

pub fn create_router(state: Arc<ApiState>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    Router::new()
        .route("/api/admit", post(handlers::admit))
        .route("/api/usage", post(handlers::record_usage))
        .route("/api/usage/:user_id", get(handlers::get_usage))
        .route("/api/usage/:user_id/events", get(handlers::get_events))
        .route(
            "/api/tier/:user_id",
            get(handlers::get_tier).put(handlers::set_tier),
        )
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(middleware)
}
