use axum::{
    Router,
    routing::{get, post},
};
use postscan_core::api_routes::v1;

use crate::handlers::{
    cancel_scan_handler, list_scans_handler, scan_status_handler, start_scan_handler,
};
use crate::infra::app_state::AppState;

pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route(v1::posts_scan::START, post(start_scan_handler))
        .route(v1::posts_scan::STATUS, get(scan_status_handler))
        .route(v1::posts_scan::LIST, get(list_scans_handler))
        .route(v1::posts_scan::CANCEL, post(cancel_scan_handler))
}
