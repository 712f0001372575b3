use axum::{Router, routing::get};
use postscan_core::api_routes::v1;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handlers::health_handler, infra::app_state::AppState, routes};

pub fn create_app(state: AppState) -> Router {
    let dev_mode = state.config().dev_mode;

    let router = Router::new()
        .route(v1::HEALTH, get(health_handler))
        .merge(routes::create_api_router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    // Permissive CORS only for local development against a browser client.
    let router = if dev_mode {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };

    router.with_state(state)
}
