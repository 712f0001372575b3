//! HTTP request handlers organized by functionality

pub mod health;
pub mod scan;

pub use health::health_handler;
pub use scan::{
    cancel_scan_handler, list_scans_handler, scan_status_handler, start_scan_handler,
};
