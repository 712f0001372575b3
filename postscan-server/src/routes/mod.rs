pub mod v1;

use crate::infra::app_state::AppState;
use axum::Router;

/// Create the API router. Scan routes are mounted at the root, matching the
/// paths in `postscan_core::api_routes`.
pub fn create_api_router() -> Router<AppState> {
    Router::new().merge(v1::create_v1_router())
}
