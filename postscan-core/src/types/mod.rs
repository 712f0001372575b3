pub mod ids;

pub use ids::{ContentItemId, LeaseId, ScanId};
