//! Wire payloads of the scan HTTP API, shared by the server and `postscanctl`.

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::scan::{ScanHistoryEntry, ScanState, ScanStatus, StartScanRequest};
use crate::types::ScanId;

/// Body of `POST /posts-scan/start`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartScanBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_types: Option<Vec<String>>,
    /// A JSON number or a numeric string; fractions are truncated.
    #[serde(
        default,
        deserialize_with = "numeric_batch_size",
        skip_serializing_if = "Option::is_none"
    )]
    pub batch_size: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumericValue {
    Int(i64),
    Float(f64),
    Text(String),
}

fn truncate_float<E: de::Error>(value: f64) -> Result<i64, E> {
    if value.is_finite() {
        Ok(value.trunc() as i64)
    } else {
        Err(E::custom("batch_size must be a finite number"))
    }
}

fn numeric_batch_size<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<NumericValue>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let value = match raw {
        NumericValue::Int(value) => value,
        NumericValue::Float(value) => truncate_float(value)?,
        NumericValue::Text(text) => {
            let text = text.trim();
            match text.parse::<i64>() {
                Ok(value) => value,
                Err(_) => text
                    .parse::<f64>()
                    .map_err(|_| {
                        <D::Error as de::Error>::custom(format!(
                            "batch_size {text:?} is not numeric"
                        ))
                    })
                    .and_then(truncate_float)?,
            }
        }
    };
    Ok(Some(value))
}

impl From<StartScanBody> for StartScanRequest {
    fn from(body: StartScanBody) -> Self {
        Self {
            kinds: body.post_types,
            page_size: body.batch_size,
        }
    }
}

/// Returned by start and cancel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanAck {
    pub success: bool,
    pub scan_id: ScanId,
}

impl ScanAck {
    pub fn ok(scan_id: ScanId) -> Self {
        Self {
            success: true,
            scan_id,
        }
    }
}

/// Query of `GET /posts-scan/status`. The id is optional here so a missing
/// one surfaces as a 400 from the orchestrator instead of an extractor error.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScanStatusQuery {
    #[serde(default)]
    pub scan_id: Option<String>,
}

/// The stored scan record with the derived `stalled` flag alongside.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanStatusResponse {
    #[serde(flatten)]
    pub state: ScanState,
    #[serde(default)]
    pub stalled: bool,
}

impl From<ScanStatus> for ScanStatusResponse {
    fn from(status: ScanStatus) -> Self {
        Self {
            state: status.state,
            stalled: status.stalled,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanHistoryResponse {
    pub success: bool,
    pub history: Vec<ScanHistoryEntry>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CancelScanBody {
    #[serde(default)]
    pub scan_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error envelope returned by every route.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    pub status: u16,
}
