pub mod handle_scan;

pub use handle_scan::{
    cancel_scan_handler, list_scans_handler, scan_status_handler, start_scan_handler,
};
