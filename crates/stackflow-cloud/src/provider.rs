//! Provider backend contract

use crate::error::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use stackflow_core::LiveState;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Concrete inputs handed to a backend
pub type Inputs = IndexMap<String, serde_json::Value>;

/// Resource backend abstraction
///
/// Every provider (Cloudflare, the in-memory backend, ...) implements this
/// trait for the resource kinds it supports. The engine decides which call to
/// make; a backend only performs it.
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    /// Returns the provider name (e.g., "cloudflare", "memory")
    fn name(&self) -> &str;

    /// Whether this backend manages the given resource kind
    fn supports(&self, kind: &str) -> bool;

    /// Whether changing `field` on an existing resource requires replacing it
    fn requires_replace(&self, kind: &str, field: &str) -> bool;

    /// Check if the backend is properly configured and authenticated
    async fn check_auth(&self, ctx: &ProviderContext) -> Result<AuthStatus>;

    /// Create a resource; the live state carries generated fields
    async fn create(&self, kind: &str, inputs: &Inputs, ctx: &ProviderContext) -> Result<LiveState>;

    /// Read an existing resource by id; `None` when it does not exist
    async fn read(&self, kind: &str, id: &str, ctx: &ProviderContext) -> Result<Option<LiveState>>;

    /// Update a resource in place with the changed inputs
    async fn update(
        &self,
        kind: &str,
        id: &str,
        diff: &InputDiff,
        ctx: &ProviderContext,
    ) -> Result<LiveState>;

    /// Delete a resource. Never called for protected or imported resources.
    async fn delete(&self, kind: &str, id: &str, ctx: &ProviderContext) -> Result<()>;
}

/// Account and credential context passed through to every backend call
#[derive(Clone, Default)]
pub struct ProviderContext {
    /// Account identifier
    pub account_id: Option<String>,

    /// API credential
    pub api_token: Option<String>,

    /// Provider-specific settings
    pub settings: HashMap<String, String>,
}

impl ProviderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_token(mut self, api_token: impl Into<String>) -> Self {
        self.api_token = Some(api_token.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}

impl fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("account_id", &self.account_id)
            .field("api_token", &self.api_token.as_ref().map(|_| "[secret]"))
            .field("settings", &self.settings)
            .finish()
    }
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Changed inputs of an existing resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputDiff {
    /// Fields whose value changed or that were added
    pub changed: Inputs,

    /// Fields that were removed from the declaration
    pub removed: Vec<String>,

    /// Full desired inputs after the change
    pub desired: Inputs,
}

impl InputDiff {
    /// Compare the inputs recorded at the last apply with the desired ones
    pub fn between(previous: &Inputs, desired: &Inputs) -> Self {
        let changed = desired
            .iter()
            .filter(|(k, v)| previous.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let removed = previous
            .keys()
            .filter(|k| !desired.contains_key(*k))
            .cloned()
            .collect();

        Self {
            changed,
            removed,
            desired: desired.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }

    /// Names of every changed or removed field
    pub fn fields(&self) -> Vec<String> {
        self.changed
            .keys()
            .chain(self.removed.iter())
            .cloned()
            .collect()
    }
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let secs = (self.initial_delay.as_secs_f64() * factor)
            .min(self.max_delay.as_secs_f64())
            .max(0.0);
        Duration::from_secs_f64(secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_diff() {
        let previous: Inputs = [
            ("name".to_string(), json!("docx")),
            ("location".to_string(), json!("WEUR")),
            ("old".to_string(), json!(1)),
        ]
        .into_iter()
        .collect();
        let desired: Inputs = [
            ("name".to_string(), json!("docx")),
            ("location".to_string(), json!("ENAM")),
            ("new".to_string(), json!(true)),
        ]
        .into_iter()
        .collect();

        let diff = InputDiff::between(&previous, &desired);
        assert_eq!(diff.changed.keys().collect::<Vec<_>>(), vec!["location", "new"]);
        assert_eq!(diff.removed, vec!["old".to_string()]);
        assert_eq!(diff.fields(), vec!["location", "new", "old"]);
        assert!(InputDiff::between(&desired, &desired).is_empty());
    }

    #[test]
    fn test_retry_backoff() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for(1), Duration::from_secs(1));
        assert_eq!(retry.delay_for(2), Duration::from_secs(2));
        assert_eq!(retry.delay_for(3), Duration::from_secs(4));
        assert_eq!(retry.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn test_context_debug_hides_token() {
        let ctx = ProviderContext::new()
            .with_account("acct")
            .with_token("super-secret-token");
        let printed = format!("{:?}", ctx);
        assert!(printed.contains("acct"));
        assert!(!printed.contains("super-secret-token"));
    }
}
