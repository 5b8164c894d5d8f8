//! Cloudflare backend error types

use stackflow_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudflareError {
    #[error("Environment variable not set: {0}")]
    MissingEnvVar(String),

    #[error("Cloudflare API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Permission group not found: {0}")]
    PermissionGroupNotFound(String),

    #[error("{kind} requires input '{field}'")]
    MissingInput { kind: String, field: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unexpected API response: {0}")]
    UnexpectedResponse(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CloudflareError {
    /// Rate limiting, server-side failures and connection problems
    pub fn is_transient(&self) -> bool {
        match self {
            CloudflareError::ApiError { status, .. } => *status == 429 || *status >= 500,
            CloudflareError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

impl From<CloudflareError> for CloudError {
    fn from(e: CloudflareError) -> Self {
        match &e {
            CloudflareError::ApiError { status: 401 | 403, .. } => {
                CloudError::AuthenticationFailed(e.to_string())
            }
            CloudflareError::MissingEnvVar(_) | CloudflareError::InvalidConfig(_) => {
                CloudError::InvalidConfig(e.to_string())
            }
            _ if e.is_transient() => CloudError::transient(e.to_string()),
            _ => CloudError::permanent(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudflareError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> CloudflareError {
        CloudflareError::ApiError {
            status,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_transient_statuses() {
        assert!(api(429).is_transient());
        assert!(api(500).is_transient());
        assert!(api(503).is_transient());
        assert!(!api(400).is_transient());
        assert!(!api(404).is_transient());
    }

    #[test]
    fn test_conversion_to_cloud_error() {
        assert!(CloudError::from(api(503)).is_transient());
        assert!(matches!(
            CloudError::from(api(403)),
            CloudError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            CloudError::from(CloudflareError::MissingEnvVar("CLOUDFLARE_API_TOKEN".into())),
            CloudError::InvalidConfig(_)
        ));
        assert!(!CloudError::from(api(409)).is_transient());
    }
}
