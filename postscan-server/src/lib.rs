//! # postscan-server
//!
//! HTTP front end for resumable posts-maintenance scans. The server owns
//! the job store, content host and deferred scheduler, re-arms unfinished
//! scans at startup and triggers a maintenance scan once per interval.
//!
//! Routes:
//!
//! - `POST /posts-scan/start`
//! - `GET /posts-scan/status?scan_id=...`
//! - `GET /posts-scan/list`
//! - `POST /posts-scan/cancel`
//! - `GET /health`

pub mod app;
pub mod handlers;
pub mod infra;
pub mod routes;

pub use app::create_app;
pub use infra::app_state::AppState;
