use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Smallest page a scan may request.
pub const MIN_PAGE_SIZE: u32 = 1;
/// Largest page a scan may request; larger requests are clamped.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Global knobs that tune scan orchestration.
///
/// All fields carry defaults so deployments can supply a partial payload and
/// inherit the rest.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Content kinds scanned when a start request names none.
    pub default_kinds: Vec<String>,
    /// Page size used when a start request omits `batch_size`.
    pub default_page_size: u32,
    /// Delay between arming a batch and its earliest execution (ms).
    pub rearm_delay_ms: u64,
    /// Number of history entries kept, most recent first.
    pub history_capacity: usize,
    /// Per-scan mutual exclusion while a batch runs.
    pub lease: LeaseConfig,
    /// Retry policy for content host failures inside a batch.
    pub retry: RetryConfig,
    /// A queued/running scan with no batch activity for
    /// `stall_multiplier * rearm_delay_ms` is reported as stalled.
    pub stall_multiplier: u32,
    /// Recurring maintenance scan with default arguments.
    pub maintenance: MaintenanceConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            default_kinds: vec!["post".to_string(), "page".to_string()],
            default_page_size: 50,
            rearm_delay_ms: 1_000,
            history_capacity: 10,
            lease: LeaseConfig::default(),
            retry: RetryConfig::default(),
            stall_multiplier: 30,
            maintenance: MaintenanceConfig::default(),
        }
    }
}

impl ScanConfig {
    pub fn rearm_delay(&self) -> Duration {
        Duration::from_millis(self.rearm_delay_ms)
    }

    pub fn stall_after(&self) -> chrono::Duration {
        let millis = self
            .rearm_delay_ms
            .saturating_mul(u64::from(self.stall_multiplier.max(1)));
        i64::try_from(millis)
            .ok()
            .and_then(chrono::TimeDelta::try_milliseconds)
            .unwrap_or(chrono::TimeDelta::MAX)
    }

    /// Clamp the magnitude of a requested page size into
    /// `[MIN_PAGE_SIZE, MAX_PAGE_SIZE]`; the sign is dropped. Missing
    /// requests fall back to `default_page_size`.
    pub fn clamp_page_size(&self, requested: Option<i64>) -> u32 {
        let requested = requested
            .map(i64::unsigned_abs)
            .unwrap_or(u64::from(self.default_page_size));
        requested.clamp(u64::from(MIN_PAGE_SIZE), u64::from(MAX_PAGE_SIZE)) as u32
    }
}

/// Lease tuning for batch execution.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// TTL for a batch lease (seconds). A crashed batch blocks its scan for
    /// at most this long.
    pub lease_ttl_secs: i64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self { lease_ttl_secs: 30 }
    }
}

impl LeaseConfig {
    /// At least one second. Values beyond chrono's range saturate.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::TimeDelta::try_seconds(self.lease_ttl_secs.max(1))
            .unwrap_or(chrono::TimeDelta::MAX)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per page before the scan is marked failed.
    pub max_attempts: u16,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 2_000,
            backoff_max_ms: 60_000,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff for the given (1-based) failed attempt.
    pub fn backoff_for(&self, attempt: u16) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = u32::from(attempt.saturating_sub(1)).min(20);
        let scaled = self.backoff_base_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(scaled.min(self.backoff_max_ms))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    /// Interval between maintenance scans (seconds).
    pub interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 24 * 60 * 60,
        }
    }
}

impl MaintenanceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}
