//! Cloudflare REST API client
//!
//! Thin wrapper over `reqwest` that adds bearer authentication and unwraps
//! the `{success, result, errors}` envelope every v4 endpoint returns.

use crate::error::{CloudflareError, Result};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Cloudflare API client
#[derive(Clone)]
pub struct CloudflareClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for CloudflareClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CloudflareClient {
    pub fn new() -> Self {
        Self::with_base_url(CLOUDFLARE_API_BASE)
    }

    /// Client against another API root
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request and return the unwrapped `result`
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        token: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Option<T>> {
        let url = self.url(path);
        tracing::debug!("{} {}", method, url);

        let mut builder = self.client.request(method, &url).bearer_auth(token);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        unwrap_envelope(status, &text)
    }

    /// GET that maps 404 to `None`
    pub async fn get_optional<T: DeserializeOwned>(&self, path: &str, token: &str) -> Result<Option<T>> {
        match self.request(Method::GET, path, token, None).await {
            Err(CloudflareError::ApiError { status: 404, .. }) => Ok(None),
            other => other,
        }
    }

    /// DELETE that treats 404 as already deleted
    pub async fn delete(&self, path: &str, token: &str) -> Result<()> {
        deleted(
            self.request::<serde_json::Value>(Method::DELETE, path, token, None)
                .await,
            path,
        )
    }

    /// Request whose `result` must be present
    pub async fn request_result<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        token: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        self.request(method, path, token, body).await?.ok_or_else(|| {
            CloudflareError::UnexpectedResponse(format!("{} returned no result", path))
        })
    }
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    message: String,
}

fn error_message(errors: &[ApiError]) -> String {
    if errors.is_empty() {
        return "Unknown error".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{} (code {})", e.message, e.code))
        .collect::<Vec<_>>()
        .join("; ")
}

fn deleted(result: Result<Option<serde_json::Value>>, path: &str) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(CloudflareError::ApiError { status: 404, .. }) => {
            tracing::debug!("{} was already deleted", path);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Check the HTTP status and the envelope's `success` flag
fn unwrap_envelope<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<Option<T>> {
    let parsed: std::result::Result<ApiResponse<T>, _> = serde_json::from_str(body);

    match parsed {
        Ok(envelope) if status.is_success() && envelope.success => Ok(envelope.result),
        Ok(envelope) => Err(CloudflareError::ApiError {
            status: status.as_u16(),
            message: error_message(&envelope.errors),
        }),
        Err(_) if !status.is_success() => Err(CloudflareError::ApiError {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string(),
        }),
        Err(e) => Err(CloudflareError::JsonError(e)),
    }
}
