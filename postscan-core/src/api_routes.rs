/// HTTP routes exposed by the scan service.
pub mod v1 {
    pub const HEALTH: &str = "/health";

    pub mod posts_scan {
        pub const START: &str = "/posts-scan/start";
        pub const STATUS: &str = "/posts-scan/status";
        pub const LIST: &str = "/posts-scan/list";
        pub const CANCEL: &str = "/posts-scan/cancel";
    }
}
