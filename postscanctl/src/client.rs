use postscan_core::{
    api_routes::v1,
    api_types::{
        CancelScanBody, ErrorResponse, HealthResponse, ScanAck, ScanHistoryResponse,
        ScanStatusResponse, StartScanBody,
    },
    scan::ScanHistoryEntry,
    types::ScanId,
};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with an error envelope.
    #[error("{message} (HTTP {status})")]
    Api { status: StatusCode, message: String },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Thin typed wrapper over the scan routes.
#[derive(Debug, Clone)]
pub struct ScanClient {
    http: reqwest::Client,
    base_url: String,
}

impl ScanClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let url = self.url(v1::HEALTH);
        let response = self.http.get(&url).send().await;
        decode(url, response).await
    }

    pub async fn start(&self, body: &StartScanBody) -> Result<ScanId, ClientError> {
        let url = self.url(v1::posts_scan::START);
        let response = self.http.post(&url).json(body).send().await;
        let ack: ScanAck = decode(url, response).await?;
        Ok(ack.scan_id)
    }

    pub async fn status(&self, scan_id: &ScanId) -> Result<ScanStatusResponse, ClientError> {
        let url = self.url(v1::posts_scan::STATUS);
        let response = self
            .http
            .get(&url)
            .query(&[("scan_id", scan_id.as_str())])
            .send()
            .await;
        decode(url, response).await
    }

    pub async fn list(&self) -> Result<Vec<ScanHistoryEntry>, ClientError> {
        let url = self.url(v1::posts_scan::LIST);
        let response = self.http.get(&url).send().await;
        let body: ScanHistoryResponse = decode(url, response).await?;
        Ok(body.history)
    }

    pub async fn cancel(&self, scan_id: &ScanId) -> Result<ScanId, ClientError> {
        let url = self.url(v1::posts_scan::CANCEL);
        let body = CancelScanBody {
            scan_id: scan_id.to_string(),
        };
        let response = self.http.post(&url).json(&body).send().await;
        let ack: ScanAck = decode(url, response).await?;
        Ok(ack.scan_id)
    }
}

async fn decode<T: DeserializeOwned>(
    url: String,
    response: reqwest::Result<Response>,
) -> Result<T, ClientError> {
    let response = match response {
        Ok(response) => response,
        Err(source) => return Err(ClientError::Transport { url, source }),
    };
    let status = response.status();
    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(source) => return Err(ClientError::Transport { url, source }),
    };

    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorResponse>(&bytes)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).trim().to_string());
        return Err(ClientError::Api { status, message });
    }

    serde_json::from_slice(&bytes).map_err(|err| ClientError::Decode {
        url,
        message: err.to_string(),
    })
}
