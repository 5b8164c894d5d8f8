//! In-memory backend
//!
//! Keeps resources in a map and counts every call. Used by the `--backend
//! memory` dry-run mode of the CLI and throughout the tests, where failures,
//! latency and pre-existing resources can be injected.

use crate::error::{CloudError, Result};
use crate::provider::{AuthStatus, InputDiff, Inputs, ProviderContext, ResourceBackend};
use async_trait::async_trait;
use stackflow_core::LiveState;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Attributes generated on create, marked secret
const SECRET_OUTPUTS: &[(&str, &str)] = &[("api-token", "value")];

/// Number of calls per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create: usize,
    pub read: usize,
    pub update: usize,
    pub delete: usize,
}

impl CallCounts {
    /// Calls that change backend state
    pub fn mutations(&self) -> usize {
        self.create + self.update + self.delete
    }
}

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Create { kind: String, inputs: Inputs },
    Read { kind: String, id: String },
    Update { kind: String, id: String, fields: Vec<String> },
    Delete { kind: String, id: String },
}

impl BackendCall {
    pub fn operation(&self) -> &'static str {
        match self {
            BackendCall::Create { .. } => "create",
            BackendCall::Read { .. } => "read",
            BackendCall::Update { .. } => "update",
            BackendCall::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct InjectedFailure {
    transient: bool,
    remaining: usize,
    /// Only calls of this operation fail; any call when unset
    operation: Option<&'static str>,
}

#[derive(Default)]
struct Counters {
    create: AtomicUsize,
    read: AtomicUsize,
    update: AtomicUsize,
    delete: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Backend that stores resources in memory
#[derive(Default)]
pub struct MemoryBackend {
    resources: Mutex<HashMap<String, (String, LiveState)>>,
    log: Mutex<Vec<BackendCall>>,
    next_ids: Mutex<VecDeque<String>>,
    failures: Mutex<HashMap<String, InjectedFailure>>,
    replace_fields: HashMap<String, HashSet<String>>,
    immutable: HashSet<String>,
    kinds: Option<HashSet<String>>,
    latency: Option<Duration>,
    sequence: AtomicUsize,
    counters: Counters,
}

impl MemoryBackend {
    /// Backend accepting every kind
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the supported kinds
    pub fn with_kinds(mut self, kinds: &[&str]) -> Self {
        self.kinds = Some(kinds.iter().map(|k| k.to_string()).collect());
        self
    }

    /// Fields of `kind` that cannot change in place
    pub fn with_replace_fields(mut self, kind: &str, fields: &[&str]) -> Self {
        self.replace_fields
            .insert(kind.to_string(), fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Kinds with no in-place update: every changed field replaces
    pub fn with_immutable_kind(mut self, kind: &str) -> Self {
        self.immutable.insert(kind.to_string());
        self
    }

    /// Delay every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Ids handed out by the next creates, in order
    pub async fn push_next_id(&self, id: impl Into<String>) {
        self.next_ids.lock().await.push_back(id.into());
    }

    /// Make the next `times` calls touching `kind` fail
    pub async fn fail_next(&self, kind: &str, transient: bool, times: usize) {
        self.inject(kind, transient, times, None).await;
    }

    /// Make the next `times` calls of `operation` ("create", "read",
    /// "update" or "delete") on `kind` fail
    pub async fn fail_next_on(&self, operation: &'static str, kind: &str, transient: bool, times: usize) {
        self.inject(kind, transient, times, Some(operation)).await;
    }

    async fn inject(&self, kind: &str, transient: bool, times: usize, operation: Option<&'static str>) {
        self.failures.lock().await.insert(
            kind.to_string(),
            InjectedFailure {
                transient,
                remaining: times,
                operation,
            },
        );
    }

    /// Seed a resource that exists outside the engine
    pub async fn insert_existing(&self, kind: &str, live: LiveState) {
        self.resources
            .lock()
            .await
            .insert(live.id.clone(), (kind.to_string(), live));
    }

    /// Snapshot of the call counters
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            create: self.counters.create.load(Ordering::SeqCst),
            read: self.counters.read.load(Ordering::SeqCst),
            update: self.counters.update.load(Ordering::SeqCst),
            delete: self.counters.delete.load(Ordering::SeqCst),
        }
    }

    /// Highest number of calls observed running at once
    pub fn max_concurrency(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every call in the order it was made
    pub async fn log(&self) -> Vec<BackendCall> {
        self.log.lock().await.clone()
    }

    /// Inputs of each create, in order
    pub async fn create_log(&self) -> Vec<(String, Inputs)> {
        self.log
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                BackendCall::Create { kind, inputs } => Some((kind.clone(), inputs.clone())),
                _ => None,
            })
            .collect()
    }

    /// Currently stored resource
    pub async fn get(&self, id: &str) -> Option<LiveState> {
        self.resources.lock().await.get(id).map(|(_, live)| live.clone())
    }

    /// Number of stored resources
    pub async fn len(&self) -> usize {
        self.resources.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Common prologue of every call: record, count, wait, maybe fail
    async fn enter(&self, counter: &AtomicUsize, kind: &str, call: BackendCall) -> Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        let operation = call.operation();
        self.log.lock().await.push(call);

        let in_flight = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters
            .max_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut failures = self.failures.lock().await;
        if let Some(failure) = failures.get_mut(kind) {
            if failure.remaining > 0 && failure.operation.is_none_or(|op| op == operation) {
                failure.remaining -= 1;
                let message = format!("injected failure for {}", kind);
                return Err(if failure.transient {
                    CloudError::transient(message)
                } else {
                    CloudError::permanent(message)
                });
            }
        }
        Ok(())
    }

    async fn next_id(&self, kind: &str) -> String {
        match self.next_ids.lock().await.pop_front() {
            Some(id) => id,
            None => format!("{}-{}", kind, self.sequence.fetch_add(1, Ordering::SeqCst) + 1),
        }
    }

    fn live_from_inputs(id: &str, kind: &str, inputs: &Inputs) -> LiveState {
        let mut live = LiveState::new(id);
        for (key, value) in inputs {
            live.attributes.insert(key.clone(), value.clone());
        }
        for (secret_kind, attribute) in SECRET_OUTPUTS {
            if *secret_kind == kind {
                live = live.with_secret_attribute(*attribute, format!("secret-{}", id).into());
            }
        }
        live
    }
}

#[async_trait]
impl ResourceBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn supports(&self, kind: &str) -> bool {
        self.kinds.as_ref().is_none_or(|kinds| kinds.contains(kind))
    }

    fn requires_replace(&self, kind: &str, field: &str) -> bool {
        self.immutable.contains(kind)
            || self
                .replace_fields
                .get(kind)
                .is_some_and(|fields| fields.contains(field))
    }

    async fn check_auth(&self, _ctx: &ProviderContext) -> Result<AuthStatus> {
        Ok(AuthStatus::ok("in-memory backend"))
    }

    async fn create(&self, kind: &str, inputs: &Inputs, _ctx: &ProviderContext) -> Result<LiveState> {
        self.enter(
            &self.counters.create,
            kind,
            BackendCall::Create {
                kind: kind.to_string(),
                inputs: inputs.clone(),
            },
        )
        .await?;

        let id = self.next_id(kind).await;
        let live = Self::live_from_inputs(&id, kind, inputs);
        self.resources
            .lock()
            .await
            .insert(id, (kind.to_string(), live.clone()));
        Ok(live)
    }

    async fn read(&self, kind: &str, id: &str, _ctx: &ProviderContext) -> Result<Option<LiveState>> {
        self.enter(
            &self.counters.read,
            kind,
            BackendCall::Read {
                kind: kind.to_string(),
                id: id.to_string(),
            },
        )
        .await?;

        Ok(self
            .resources
            .lock()
            .await
            .get(id)
            .filter(|(stored_kind, _)| stored_kind == kind)
            .map(|(_, live)| live.clone()))
    }

    async fn update(
        &self,
        kind: &str,
        id: &str,
        diff: &InputDiff,
        _ctx: &ProviderContext,
    ) -> Result<LiveState> {
        self.enter(
            &self.counters.update,
            kind,
            BackendCall::Update {
                kind: kind.to_string(),
                id: id.to_string(),
                fields: diff.fields(),
            },
        )
        .await?;

        let mut resources = self.resources.lock().await;
        let (_, live) = resources
            .get_mut(id)
            .ok_or_else(|| CloudError::permanent(format!("{} {} not found", kind, id)))?;
        for (key, value) in &diff.changed {
            live.attributes.insert(key.clone(), value.clone());
        }
        for key in &diff.removed {
            live.attributes.shift_remove(key);
        }
        Ok(live.clone())
    }

    async fn delete(&self, kind: &str, id: &str, _ctx: &ProviderContext) -> Result<()> {
        self.enter(
            &self.counters.delete,
            kind,
            BackendCall::Delete {
                kind: kind.to_string(),
                id: id.to_string(),
            },
        )
        .await?;

        self.resources.lock().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_read_delete() {
        let backend = MemoryBackend::new();
        let ctx = ProviderContext::new();
        let inputs: Inputs = [("title".to_string(), json!("SESSION"))].into_iter().collect();

        let live = backend.create("kv-namespace", &inputs, &ctx).await.unwrap();
        assert_eq!(live.id, "kv-namespace-1");
        assert_eq!(live.attributes["title"], json!("SESSION"));

        let read = backend.read("kv-namespace", &live.id, &ctx).await.unwrap();
        assert!(read.is_some());
        assert!(backend.read("d1-database", &live.id, &ctx).await.unwrap().is_none());

        backend.delete("kv-namespace", &live.id, &ctx).await.unwrap();
        assert!(backend.is_empty().await);
        assert_eq!(
            backend.calls(),
            CallCounts {
                create: 1,
                read: 2,
                update: 0,
                delete: 1
            }
        );
    }

    #[tokio::test]
    async fn test_token_value_is_secret() {
        let backend = MemoryBackend::new();
        backend.push_next_id("tok-1").await;

        let live = backend
            .create("api-token", &Inputs::new(), &ProviderContext::new())
            .await
            .unwrap();
        assert_eq!(live.id, "tok-1");
        assert!(live.is_secret("value"));
        assert!(!format!("{:?}", live).contains("secret-tok-1"));
    }

    #[tokio::test]
    async fn test_injected_failures_run_out() {
        let backend = MemoryBackend::new();
        backend.fail_next("r2-bucket", false, 1).await;
        let ctx = ProviderContext::new();

        assert!(backend.create("r2-bucket", &Inputs::new(), &ctx).await.is_err());
        assert!(backend.create("r2-bucket", &Inputs::new(), &ctx).await.is_ok());
        assert_eq!(backend.calls().create, 2);
    }

    #[tokio::test]
    async fn test_failure_limited_to_operation() {
        let backend = MemoryBackend::new();
        let ctx = ProviderContext::new();
        let live = backend.create("r2-bucket", &Inputs::new(), &ctx).await.unwrap();
        backend.fail_next_on("create", "r2-bucket", false, 1).await;

        backend.delete("r2-bucket", &live.id, &ctx).await.unwrap();
        assert!(backend.create("r2-bucket", &Inputs::new(), &ctx).await.is_err());
        assert!(backend.create("r2-bucket", &Inputs::new(), &ctx).await.is_ok());
    }

    #[test]
    fn test_immutable_kind() {
        let backend = MemoryBackend::new().with_immutable_kind("r2-bucket");
        assert!(backend.requires_replace("r2-bucket", "storage_class"));
        assert!(!backend.requires_replace("kv-namespace", "title"));
    }

    #[test]
    fn test_kind_support() {
        let backend = MemoryBackend::new()
            .with_kinds(&["r2-bucket"])
            .with_replace_fields("r2-bucket", &["name"]);
        assert!(backend.supports("r2-bucket"));
        assert!(!backend.supports("queue"));
        assert!(backend.requires_replace("r2-bucket", "name"));
        assert!(!backend.requires_replace("r2-bucket", "cors"));
    }
}
