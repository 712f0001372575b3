use axum::{
    body::Bytes,
    extract::{Query, State},
    response::Json,
};
use postscan_core::api_types::{
    CancelScanBody, ScanAck, ScanHistoryResponse, ScanStatusQuery, ScanStatusResponse,
    StartScanBody,
};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

/// Bodies are optional on the POST routes; an empty body means "all
/// defaults" rather than a JSON error.
fn parse_body<T>(body: &Bytes) -> AppResult<T>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| AppError::bad_request(format!("Invalid request body: {err}")))
}

pub async fn start_scan_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<ScanAck>> {
    let request: StartScanBody = parse_body(&body)?;
    let scan_id = state.orchestrator().start(request.into()).await?;
    info!(%scan_id, "scan requested over HTTP");
    Ok(Json(ScanAck::ok(scan_id)))
}

pub async fn scan_status_handler(
    State(state): State<AppState>,
    Query(query): Query<ScanStatusQuery>,
) -> AppResult<Json<ScanStatusResponse>> {
    let scan_id = query.scan_id.unwrap_or_default();
    let status = state.orchestrator().status(&scan_id).await?;
    Ok(Json(status.into()))
}

pub async fn list_scans_handler(
    State(state): State<AppState>,
) -> AppResult<Json<ScanHistoryResponse>> {
    let history = state.orchestrator().list().await?;
    Ok(Json(ScanHistoryResponse {
        success: true,
        history,
    }))
}

pub async fn cancel_scan_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<ScanAck>> {
    let request: CancelScanBody = parse_body(&body)?;
    let scan_id = state.orchestrator().cancel(&request.scan_id).await?;
    Ok(Json(ScanAck::ok(scan_id)))
}
