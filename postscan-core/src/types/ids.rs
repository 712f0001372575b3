use std::fmt;

use chrono::{DateTime, Utc};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ScanError};

const SCAN_ID_PREFIX: &str = "scan_";
const SCAN_ID_SUFFIX_LEN: usize = 6;

/// Opaque scan identifier, stable for the lifetime of a scan.
///
/// Generated ids look like `scan_1718000000_a1B2c3`: creation time in unix
/// seconds plus a short random suffix. Uniqueness is probabilistic.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ScanId(String);

impl ScanId {
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(SCAN_ID_SUFFIX_LEN)
            .map(char::from)
            .collect();
        Self(format!("{SCAN_ID_PREFIX}{}_{suffix}", now.timestamp()))
    }

    /// Accept a caller supplied id. Only emptiness is rejected; ids are
    /// opaque and older formats stay addressable.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ScanError::InvalidArgument("scan_id is required".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ScanId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct LeaseId(pub Uuid);

impl Default for LeaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaseId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single content item (post, page, ...) on the host.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ContentItemId(pub i64);

impl fmt::Display for ContentItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
