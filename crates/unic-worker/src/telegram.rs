//! Telegram Bot API transport.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::MIB;
use crate::transport::{Transport, TransportError};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Upload ceiling for bot uploads, below the 50 MB API limit.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 49 * MIB;

/// Fallback wait when a 429 carries no `retry_after`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Transport sending to one Telegram chat.
#[derive(Debug, Clone)]
pub struct TelegramTransport {
    http: Client,
    base_url: String,
    token: String,
    chat_id: i64,
    max_upload_bytes: u64,
}

impl TelegramTransport {
    pub fn new(token: impl Into<String>, chat_id: i64) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| TransportError::api(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: DEFAULT_API_BASE.to_string(),
            token: token.into(),
            chat_id,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call(&self, method: &str, request: reqwest::RequestBuilder) -> Result<(), TransportError> {
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::api(format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(method, status = status.as_u16(), "Telegram response");
        classify_response(status, &body)
    }
}

/// Map an HTTP status and Bot API body to a transport result.
pub fn classify_response(status: StatusCode, body: &str) -> Result<(), TransportError> {
    let parsed: Option<ApiResponse> = serde_json::from_str(body).ok();

    if status.is_success() && parsed.as_ref().map_or(true, |r| r.ok) {
        return Ok(());
    }

    let description = parsed
        .as_ref()
        .and_then(|r| r.description.clone())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    let retry_after = parsed
        .as_ref()
        .and_then(|r| r.parameters.as_ref())
        .and_then(|p| p.retry_after);

    if status == StatusCode::TOO_MANY_REQUESTS || retry_after.is_some() {
        return Err(TransportError::rate_limited(
            retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        ));
    }

    if status == StatusCode::PAYLOAD_TOO_LARGE || description.to_lowercase().contains("too large") {
        return Err(TransportError::EntityTooLarge);
    }

    Err(TransportError::Api(description))
}

#[async_trait]
impl Transport for TelegramTransport {
    fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    async fn send_video(&self, path: &Path, caption: &str) -> Result<(), TransportError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| TransportError::api(format!("Failed to open {}: {}", path.display(), e)))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| TransportError::api(format!("Failed to stat {}: {}", path.display(), e)))?
            .len();

        if len > self.max_upload_bytes {
            warn!(size = len, limit = self.max_upload_bytes, "Uploading file above the configured limit");
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "video.mp4".to_string());
        let video = Part::stream_with_length(reqwest::Body::from(file), len)
            .file_name(file_name)
            .mime_str("video/mp4")
            .map_err(|e| TransportError::api(e.to_string()))?;

        let form = Form::new()
            .text("chat_id", self.chat_id.to_string())
            .text("caption", caption.to_string())
            .text("supports_streaming", "true")
            .part("video", video);

        let request = self.http.post(self.method_url("sendVideo")).multipart(form);
        self.call("sendVideo", request).await
    }

    async fn send_message(&self, text: &str) -> Result<(), TransportError> {
        let payload = serde_json::json!({ "chat_id": self.chat_id, "text": text });
        let request = self.http.post(self.method_url("sendMessage")).json(&payload);
        self.call("sendMessage", request).await
    }
}
