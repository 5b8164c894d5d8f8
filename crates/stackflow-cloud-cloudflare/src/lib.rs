//! Cloudflare backend for StackFlow
//!
//! Implements `ResourceBackend` for Cloudflare over the v4 REST API,
//! authenticated with a bearer token.
//!
//! # Resource kinds
//!
//! - `r2-bucket`: R2 storage bucket (id = bucket name)
//! - `kv-namespace`: Workers KV namespace
//! - `d1-database`: D1 database, including read replication settings
//! - `api-token`: account-scoped API token; its `value` is a secret attribute
//!
//! # Requirements
//!
//! - `CLOUDFLARE_ACCOUNT_ID` and `CLOUDFLARE_API_TOKEN`, passed through
//!   `ProviderContext`
//!
//! # Example
//!
//! ```ignore
//! use stackflow_cloud::{ProviderContext, ResourceBackend};
//! use stackflow_cloud_cloudflare::CloudflareBackend;
//!
//! let backend = CloudflareBackend::new();
//! let ctx = ProviderContext::new()
//!     .with_account("account-id")
//!     .with_token("api-token");
//!
//! let auth = backend.check_auth(&ctx).await?;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//! ```

pub mod api;
pub mod error;
pub mod provider;

pub use api::{CLOUDFLARE_API_BASE, CloudflareClient};
pub use error::{CloudflareError, Result};
pub use provider::{
    API_TOKEN, CloudflareBackend, D1_DATABASE, KV_NAMESPACE, R2_BUCKET, SUPPORTED_KINDS,
};
