//! Cloudflare backend implementation

use crate::api::CloudflareClient;
use crate::error::{CloudflareError, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use stackflow_cloud::{AuthStatus, InputDiff, Inputs, ProviderContext, ResourceBackend};
use stackflow_core::LiveState;

pub const R2_BUCKET: &str = "r2-bucket";
pub const KV_NAMESPACE: &str = "kv-namespace";
pub const D1_DATABASE: &str = "d1-database";
pub const API_TOKEN: &str = "api-token";

/// Resource kinds managed by this backend
pub const SUPPORTED_KINDS: &[&str] = &[R2_BUCKET, KV_NAMESPACE, D1_DATABASE, API_TOKEN];

/// Cloudflare backend over the REST API
#[derive(Clone, Default)]
pub struct CloudflareBackend {
    client: CloudflareClient,
}

impl CloudflareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: CloudflareClient) -> Self {
        Self { client }
    }

    async fn create_resource(&self, kind: &str, inputs: &Inputs, ctx: &ProviderContext) -> Result<LiveState> {
        let token = api_token(ctx)?;
        match kind {
            R2_BUCKET => {
                let account = account_id(ctx)?;
                let body = r2_bucket_body(inputs)?;
                let bucket: R2Bucket = self
                    .client
                    .request_result(Method::POST, &format!("accounts/{}/r2/buckets", account), token, Some(&body))
                    .await?;
                Ok(bucket.into_live())
            }
            KV_NAMESPACE => {
                let account = account_id(ctx)?;
                let body = json!({ "title": required_str(inputs, kind, "title")? });
                let namespace: KvNamespace = self
                    .client
                    .request_result(
                        Method::POST,
                        &format!("accounts/{}/storage/kv/namespaces", account),
                        token,
                        Some(&body),
                    )
                    .await?;
                Ok(namespace.into_live())
            }
            D1_DATABASE => {
                let account = account_id(ctx)?;
                let mut body = json!({ "name": required_str(inputs, kind, "name")? });
                if let Some(hint) = inputs.get("primary_location_hint") {
                    body["primary_location_hint"] = hint.clone();
                }
                let created: D1Database = self
                    .client
                    .request_result(Method::POST, &format!("accounts/{}/d1/database", account), token, Some(&body))
                    .await?;

                // the create endpoint takes no replication mode; a declared
                // one is set with a follow-up PATCH inside the same create
                match inputs.get("read_replication") {
                    Some(replication) => self.patch_d1(account, &created.uuid, replication, token).await,
                    None => Ok(created.into_live()),
                }
            }
            API_TOKEN => {
                let account = account_id(ctx)?;
                let body = self.token_body(inputs, account, token).await?;
                let created: ApiToken = self
                    .client
                    .request_result(Method::POST, "user/tokens", token, Some(&body))
                    .await?;
                Ok(created.into_live())
            }
            other => Err(unsupported(other)),
        }
    }

    async fn read_resource(&self, kind: &str, id: &str, ctx: &ProviderContext) -> Result<Option<LiveState>> {
        let token = api_token(ctx)?;
        let live = match kind {
            R2_BUCKET => {
                let path = format!("accounts/{}/r2/buckets/{}", account_id(ctx)?, id);
                self.client
                    .get_optional::<R2Bucket>(&path, token)
                    .await?
                    .map(R2Bucket::into_live)
            }
            KV_NAMESPACE => {
                let path = format!("accounts/{}/storage/kv/namespaces/{}", account_id(ctx)?, id);
                self.client
                    .get_optional::<KvNamespace>(&path, token)
                    .await?
                    .map(KvNamespace::into_live)
            }
            D1_DATABASE => {
                let path = format!("accounts/{}/d1/database/{}", account_id(ctx)?, id);
                self.client
                    .get_optional::<D1Database>(&path, token)
                    .await?
                    .map(D1Database::into_live)
            }
            API_TOKEN => self
                .client
                .get_optional::<ApiToken>(&format!("user/tokens/{}", id), token)
                .await?
                .map(ApiToken::into_live),
            other => return Err(unsupported(other)),
        };
        Ok(live)
    }

    async fn update_resource(
        &self,
        kind: &str,
        id: &str,
        diff: &InputDiff,
        ctx: &ProviderContext,
    ) -> Result<LiveState> {
        let token = api_token(ctx)?;
        match kind {
            R2_BUCKET => Err(CloudflareError::InvalidConfig(format!(
                "R2 bucket {} cannot change {:?} in place",
                id,
                diff.fields()
            ))),
            KV_NAMESPACE => {
                let account = account_id(ctx)?;
                let title = required_str(&diff.desired, kind, "title")?;
                let body = json!({ "title": title });
                self.client
                    .request::<Value>(
                        Method::PUT,
                        &format!("accounts/{}/storage/kv/namespaces/{}", account, id),
                        token,
                        Some(&body),
                    )
                    .await?;
                Ok(KvNamespace {
                    id: id.to_string(),
                    title: title.to_string(),
                }
                .into_live())
            }
            D1_DATABASE => {
                let account = account_id(ctx)?;
                match d1_replication_change(diff)? {
                    Some(replication) => self.patch_d1(account, id, replication, token).await,
                    // dropped from the declaration: the live mode is left as is
                    None => self
                        .read_resource(kind, id, ctx)
                        .await?
                        .ok_or_else(|| not_found(kind, id)),
                }
            }
            API_TOKEN => {
                let account = account_id(ctx)?;
                let body = self.token_body(&diff.desired, account, token).await?;
                let updated: ApiToken = self
                    .client
                    .request_result(Method::PUT, &format!("user/tokens/{}", id), token, Some(&body))
                    .await?;
                Ok(updated.into_live())
            }
            other => Err(unsupported(other)),
        }
    }

    async fn delete_resource(&self, kind: &str, id: &str, ctx: &ProviderContext) -> Result<()> {
        let token = api_token(ctx)?;
        let path = match kind {
            R2_BUCKET => format!("accounts/{}/r2/buckets/{}", account_id(ctx)?, id),
            KV_NAMESPACE => format!("accounts/{}/storage/kv/namespaces/{}", account_id(ctx)?, id),
            D1_DATABASE => format!("accounts/{}/d1/database/{}", account_id(ctx)?, id),
            API_TOKEN => format!("user/tokens/{}", id),
            other => return Err(unsupported(other)),
        };
        self.client.delete(&path, token).await
    }

    async fn patch_d1(&self, account: &str, id: &str, replication: &Value, token: &str) -> Result<LiveState> {
        let body = json!({ "read_replication": replication });
        let database: D1Database = self
            .client
            .request_result(
                Method::PATCH,
                &format!("accounts/{}/d1/database/{}", account, id),
                token,
                Some(&body),
            )
            .await?;
        Ok(database.into_live())
    }

    /// Request body for creating or updating a token, with permission
    /// group names resolved to ids
    async fn token_body(&self, inputs: &Inputs, account: &str, token: &str) -> Result<Value> {
        let name = required_str(inputs, API_TOKEN, "name")?;
        let wanted = permission_names(inputs)?;
        let groups: Vec<PermissionGroup> = self
            .client
            .request_result(Method::GET, "user/tokens/permission_groups", token, None)
            .await?;
        let ids = resolve_permission_groups(&groups, &wanted)?;
        Ok(token_request(name, &ids, account))
    }
}

#[async_trait]
impl ResourceBackend for CloudflareBackend {
    fn name(&self) -> &str {
        "cloudflare"
    }

    fn supports(&self, kind: &str) -> bool {
        SUPPORTED_KINDS.contains(&kind)
    }

    fn requires_replace(&self, kind: &str, field: &str) -> bool {
        // R2 has no update endpoint at all
        matches!(
            (kind, field),
            (R2_BUCKET, _) | (D1_DATABASE, "name" | "primary_location_hint")
        )
    }

    async fn check_auth(&self, ctx: &ProviderContext) -> stackflow_cloud::Result<AuthStatus> {
        let token = match api_token(ctx) {
            Ok(token) => token,
            Err(e) => return Ok(AuthStatus::failed(e.to_string())),
        };

        let verified: Result<TokenStatus> = self
            .client
            .request_result(Method::GET, "user/tokens/verify", token, None)
            .await;
        match verified {
            Ok(status) if status.status == "active" => Ok(AuthStatus::ok(format!(
                "token {} ({})",
                status.id,
                ctx.account_id.as_deref().unwrap_or("no account")
            ))),
            Ok(status) => Ok(AuthStatus::failed(format!("token is {}", status.status))),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn create(&self, kind: &str, inputs: &Inputs, ctx: &ProviderContext) -> stackflow_cloud::Result<LiveState> {
        Ok(self.create_resource(kind, inputs, ctx).await?)
    }

    async fn read(&self, kind: &str, id: &str, ctx: &ProviderContext) -> stackflow_cloud::Result<Option<LiveState>> {
        Ok(self.read_resource(kind, id, ctx).await?)
    }

    async fn update(
        &self,
        kind: &str,
        id: &str,
        diff: &InputDiff,
        ctx: &ProviderContext,
    ) -> stackflow_cloud::Result<LiveState> {
        Ok(self.update_resource(kind, id, diff, ctx).await?)
    }

    async fn delete(&self, kind: &str, id: &str, ctx: &ProviderContext) -> stackflow_cloud::Result<()> {
        Ok(self.delete_resource(kind, id, ctx).await?)
    }
}

// ============ Helpers ============

fn account_id(ctx: &ProviderContext) -> Result<&str> {
    ctx.account_id
        .as_deref()
        .ok_or_else(|| CloudflareError::MissingEnvVar("CLOUDFLARE_ACCOUNT_ID".to_string()))
}

fn api_token(ctx: &ProviderContext) -> Result<&str> {
    ctx.api_token
        .as_deref()
        .ok_or_else(|| CloudflareError::MissingEnvVar("CLOUDFLARE_API_TOKEN".to_string()))
}

fn unsupported(kind: &str) -> CloudflareError {
    CloudflareError::InvalidConfig(format!("unsupported resource kind: {}", kind))
}

fn not_found(kind: &str, id: &str) -> CloudflareError {
    CloudflareError::ApiError {
        status: 404,
        message: format!("{} {} not found", kind, id),
    }
}

fn required_str<'a>(inputs: &'a Inputs, kind: &str, field: &str) -> Result<&'a str> {
    inputs
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| CloudflareError::MissingInput {
            kind: kind.to_string(),
            field: field.to_string(),
        })
}

/// R2 create body; locations are sent as lowercase hints
fn r2_bucket_body(inputs: &Inputs) -> Result<Value> {
    let mut body = json!({ "name": required_str(inputs, R2_BUCKET, "name")? });
    if let Some(location) = inputs.get("location").and_then(Value::as_str) {
        body["locationHint"] = json!(location.to_lowercase());
    }
    if let Some(class) = inputs.get("storage_class").and_then(Value::as_str) {
        body["storageClass"] = json!(class);
    }
    Ok(body)
}

/// The replication mode to PATCH, if the diff changes it. Other D1 fields
/// cannot change in place.
fn d1_replication_change(diff: &InputDiff) -> Result<Option<&Value>> {
    let fixed: Vec<&str> = diff
        .changed
        .keys()
        .map(String::as_str)
        .filter(|field| *field != "read_replication")
        .collect();
    if !fixed.is_empty() {
        return Err(CloudflareError::InvalidConfig(format!(
            "D1 database cannot change {:?} in place",
            fixed
        )));
    }
    Ok(diff.changed.get("read_replication"))
}

/// Permission group names of a token: a list of names or a single name
fn permission_names(inputs: &Inputs) -> Result<Vec<String>> {
    let missing = || CloudflareError::MissingInput {
        kind: API_TOKEN.to_string(),
        field: "permission_groups".to_string(),
    };
    match inputs.get("permission_groups").ok_or_else(missing)? {
        Value::String(name) => Ok(vec![name.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(missing))
            .collect(),
        _ => Err(missing()),
    }
}

fn resolve_permission_groups(groups: &[PermissionGroup], wanted: &[String]) -> Result<Vec<String>> {
    wanted
        .iter()
        .map(|name| {
            groups
                .iter()
                .find(|g| &g.name == name)
                .map(|g| g.id.clone())
                .ok_or_else(|| CloudflareError::PermissionGroupNotFound(name.clone()))
        })
        .collect()
}

/// Token policy allowing the permission groups on the whole account
fn token_request(name: &str, group_ids: &[String], account: &str) -> Value {
    let groups: Vec<Value> = group_ids.iter().map(|id| json!({ "id": id })).collect();
    json!({
        "name": name,
        "policies": [{
            "effect": "allow",
            "permission_groups": groups,
            "resources": { (format!("com.cloudflare.api.account.{}", account)): "*" }
        }]
    })
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
struct R2Bucket {
    name: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    creation_date: Option<String>,
}

impl R2Bucket {
    fn into_live(self) -> LiveState {
        let mut live = LiveState::new(self.name.clone()).with_attribute("name", json!(self.name));
        if let Some(location) = self.location {
            live = live.with_attribute("location", json!(location.to_uppercase()));
        }
        if let Some(created) = self.creation_date {
            live = live.with_attribute("creation_date", json!(created));
        }
        live
    }
}

#[derive(Debug, Deserialize)]
struct KvNamespace {
    id: String,
    title: String,
}

impl KvNamespace {
    fn into_live(self) -> LiveState {
        LiveState::new(self.id).with_attribute("title", json!(self.title))
    }
}

#[derive(Debug, Deserialize)]
struct D1Database {
    uuid: String,
    name: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    read_replication: Option<Value>,
}

impl D1Database {
    fn into_live(self) -> LiveState {
        let mut live = LiveState::new(self.uuid).with_attribute("name", json!(self.name));
        if let Some(created) = self.created_at {
            live = live.with_attribute("created_at", json!(created));
        }
        if let Some(replication) = self.read_replication {
            live = live.with_attribute("read_replication", replication);
        }
        live
    }
}

#[derive(Deserialize)]
struct ApiToken {
    id: String,
    name: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

impl ApiToken {
    fn into_live(self) -> LiveState {
        let mut live = LiveState::new(self.id).with_attribute("name", json!(self.name));
        if let Some(status) = self.status {
            live = live.with_attribute("status", json!(status));
        }
        // only present in the create response
        if let Some(value) = self.value {
            live = live.with_secret_attribute("value", json!(value));
        }
        live
    }
}

#[derive(Debug, Deserialize)]
struct PermissionGroup {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TokenStatus {
    id: String,
    status: String,
}
