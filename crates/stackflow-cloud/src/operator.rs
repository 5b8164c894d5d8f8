//! Resource operator
//!
//! Decides, per resource, between import, create, update, replace or no-op,
//! and performs the chosen backend calls with timeout and retry.

use crate::action::ActionType;
use crate::error::{CloudError, Result};
use crate::provider::{InputDiff, Inputs, ProviderContext, ResourceBackend, RetryConfig};
use crate::state::{ResourceState, ResourceStatus};
use stackflow_core::{LiveState, Policy, ResourceDescriptor};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on a single backend call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// What to do with one resource
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Adopt the existing resource with this id
    Import(String),
    Create,
    NoOp,
    Update(InputDiff),
    Replace(InputDiff),
    /// Replacement required on a protected resource
    Blocked(Vec<String>),
}

impl Decision {
    pub fn action_type(&self) -> ActionType {
        match self {
            Decision::Import(_) => ActionType::Import,
            Decision::Create => ActionType::Create,
            Decision::NoOp => ActionType::NoOp,
            Decision::Update(_) => ActionType::Update,
            Decision::Replace(_) => ActionType::Replace,
            Decision::Blocked(_) => ActionType::Blocked,
        }
    }

    /// Input fields involved in the change
    pub fn fields(&self) -> Vec<String> {
        match self {
            Decision::Update(diff) | Decision::Replace(diff) => diff.fields(),
            Decision::Blocked(fields) => fields.clone(),
            _ => Vec::new(),
        }
    }
}

/// Result of applying one resource
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub action: ActionType,
    pub live: LiveState,
    pub state: ResourceState,
}

/// Applies resources through a backend
pub struct Operator {
    backend: Arc<dyn ResourceBackend>,
    ctx: ProviderContext,
    retry: RetryConfig,
    timeout: Duration,
}

impl Operator {
    pub fn new(backend: Arc<dyn ResourceBackend>, ctx: ProviderContext) -> Self {
        Self {
            backend,
            ctx,
            retry: RetryConfig::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backend(&self) -> &dyn ResourceBackend {
        self.backend.as_ref()
    }

    pub fn context(&self) -> &ProviderContext {
        &self.ctx
    }

    /// Decide what to do with a resource. Pure: no backend call.
    pub fn decide(
        &self,
        descriptor: &ResourceDescriptor,
        inputs: &Inputs,
        prior: Option<&ResourceState>,
    ) -> Decision {
        let Some(prior) = prior else {
            return match descriptor.policy.import_id() {
                Some(id) => Decision::Import(id.to_string()),
                None => Decision::Create,
            };
        };

        let diff = InputDiff::between(&prior.inputs, inputs);
        if diff.is_empty() {
            return Decision::NoOp;
        }

        let replace_fields: Vec<String> = diff
            .fields()
            .into_iter()
            .filter(|f| self.backend.requires_replace(&descriptor.kind, f))
            .collect();

        if replace_fields.is_empty() {
            Decision::Update(diff)
        } else if descriptor.policy.is_protected() || prior.policy.is_protected() {
            Decision::Blocked(replace_fields)
        } else {
            Decision::Replace(diff)
        }
    }

    /// Carry out a decision. Exactly one backend read (import) or one
    /// mutation (create/update) happens; replacement is delete then create.
    pub async fn execute(
        &self,
        descriptor: &ResourceDescriptor,
        inputs: Inputs,
        prior: Option<ResourceState>,
        decision: Decision,
    ) -> Result<NodeOutcome> {
        let kind = descriptor.kind.as_str();
        let name = descriptor.name.as_str();
        let action = decision.action_type();

        let (live, state) = match (decision, prior) {
            (Decision::Import(id), _) => {
                tracing::info!("Importing {} ({}) from id {}", name, kind, id);
                let live = self
                    .call("read", kind, || self.backend.read(kind, &id, &self.ctx))
                    .await?
                    .ok_or_else(|| CloudError::ImportTargetNotFound {
                        kind: kind.to_string(),
                        id: id.clone(),
                    })?;
                let baseline = import_baseline(&inputs, &live);
                let state = ResourceState::new(kind, live.clone(), baseline)
                    .with_status(ResourceStatus::Imported);
                (live, state)
            }
            (Decision::Create, _) => {
                tracing::info!("Creating {} ({})", name, kind);
                let live = self
                    .call("create", kind, || self.backend.create(kind, &inputs, &self.ctx))
                    .await?;
                (live.clone(), ResourceState::new(kind, live, inputs))
            }
            (Decision::NoOp, Some(prior)) => {
                tracing::debug!("{} is up to date", name);
                (prior.live_state(), prior)
            }
            (Decision::Update(diff), Some(prior)) => {
                tracing::info!("Updating {} ({}): {:?}", name, kind, diff.fields());
                let live = self
                    .call("update", kind, || {
                        self.backend.update(kind, &prior.id, &diff, &self.ctx)
                    })
                    .await?;
                (live.clone(), prior.updated(live, inputs))
            }
            (Decision::Replace(diff), Some(prior)) => {
                tracing::info!("Replacing {} ({}): {:?}", name, kind, diff.fields());
                self.call("delete", kind, || self.backend.delete(kind, &prior.id, &self.ctx))
                    .await?;
                // the old resource is gone from here on
                let live = self
                    .call("create", kind, || self.backend.create(kind, &inputs, &self.ctx))
                    .await
                    .map_err(|e| CloudError::ReplacementIncomplete {
                        name: name.to_string(),
                        source: Box::new(e),
                    })?;
                (live.clone(), ResourceState::new(kind, live, inputs))
            }
            (Decision::Blocked(fields), _) => {
                return Err(CloudError::ProtectedResource {
                    name: name.to_string(),
                    fields,
                });
            }
            (decision, None) => {
                return Err(CloudError::StateError(format!(
                    "{} of {} requires recorded state",
                    decision.action_type(),
                    name
                )));
            }
        };

        Ok(NodeOutcome {
            action,
            live,
            state: state.with_policy(descriptor.policy.clone()),
        })
    }

    /// Delete a managed resource. Protected and imported resources are
    /// retained without any backend call.
    pub async fn destroy(
        &self,
        descriptor: &ResourceDescriptor,
        prior: Option<&ResourceState>,
    ) -> Result<ActionType> {
        let Some(prior) = prior else {
            return Ok(ActionType::Absent);
        };

        if descriptor.policy.is_protected()
            || prior.policy.is_protected()
            || prior.status == ResourceStatus::Imported
        {
            tracing::info!("Retaining {} ({})", descriptor.name, policy_label(&prior.policy, &descriptor.policy));
            return Ok(ActionType::Retain);
        }

        let kind = prior.kind.as_str();
        tracing::info!("Deleting {} ({})", descriptor.name, kind);
        self.call("delete", kind, || self.backend.delete(kind, &prior.id, &self.ctx))
            .await?;
        Ok(ActionType::Delete)
    }

    /// Run a backend call bounded by the timeout, retrying transient failures
    async fn call<T, F, Fut>(&self, operation: &str, kind: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(CloudError::Timeout(format!(
                    "{} {} exceeded {:?}",
                    operation, kind, self.timeout
                ))),
            };

            match result {
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        "{} {} failed (attempt {}/{}): {}. Retrying in {:?}",
                        operation,
                        kind,
                        attempt,
                        self.retry.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Inputs recorded for a freshly imported resource: the backend's view of
/// each declared field where it reports one, so the next run diffs the
/// declaration against what actually exists
fn import_baseline(desired: &Inputs, live: &LiveState) -> Inputs {
    desired
        .iter()
        .map(|(k, v)| {
            let observed = live.attributes.get(k).cloned().unwrap_or_else(|| v.clone());
            (k.clone(), observed)
        })
        .collect()
}

fn policy_label(recorded: &Policy, declared: &Policy) -> String {
    if declared.is_protected() {
        declared.to_string()
    } else {
        recorded.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use serde_json::json;

    fn inputs(pairs: &[(&str, serde_json::Value)]) -> Inputs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn operator(backend: Arc<MemoryBackend>) -> Operator {
        Operator::new(backend, ProviderContext::new()).with_retry(RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        })
    }

    fn prior(kind: &str, values: Inputs, policy: Policy) -> ResourceState {
        ResourceState::new(kind, LiveState::new("r-1"), values).with_policy(policy)
    }

    #[test]
    fn test_decide() {
        let backend =
            Arc::new(MemoryBackend::new().with_replace_fields("r2-bucket", &["name", "location"]));
        let op = operator(backend);
        let bucket = ResourceDescriptor::new("bucket", "r2-bucket");
        let current = inputs(&[("name", json!("docx")), ("location", json!("WEUR"))]);

        assert_eq!(op.decide(&bucket, &current, None), Decision::Create);

        let recorded = prior("r2-bucket", current.clone(), Policy::Fresh);
        assert_eq!(op.decide(&bucket, &current, Some(&recorded)), Decision::NoOp);

        let moved = inputs(&[("name", json!("docx")), ("location", json!("ENAM"))]);
        assert!(matches!(
            op.decide(&bucket, &moved, Some(&recorded)),
            Decision::Replace(_)
        ));

        let tagged = inputs(&[
            ("name", json!("docx")),
            ("location", json!("WEUR")),
            ("cors", json!([])),
        ]);
        assert!(matches!(
            op.decide(&bucket, &tagged, Some(&recorded)),
            Decision::Update(_)
        ));

        let protected = bucket.clone().with_policy(Policy::Protected);
        assert_eq!(
            op.decide(&protected, &moved, Some(&recorded)),
            Decision::Blocked(vec!["location".to_string()])
        );

        let imported = ResourceDescriptor::new("db", "d1-database").with_policy(Policy::ImportOnly {
            id: "609c".to_string(),
        });
        assert_eq!(
            op.decide(&imported, &current, None),
            Decision::Import("609c".to_string())
        );
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next("kv-namespace", true, 2).await;
        let op = operator(backend.clone());

        let kv = ResourceDescriptor::new("kv", "kv-namespace");
        let outcome = op
            .execute(&kv, inputs(&[("title", json!("SESSION"))]), None, Decision::Create)
            .await
            .unwrap();

        assert_eq!(outcome.action, ActionType::Create);
        assert_eq!(backend.calls().create, 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next("kv-namespace", true, 5).await;
        let op = operator(backend.clone());

        let kv = ResourceDescriptor::new("kv", "kv-namespace");
        let err = op
            .execute(&kv, Inputs::new(), None, Decision::Create)
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(backend.calls().create, 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next("kv-namespace", false, 1).await;
        let op = operator(backend.clone());

        let kv = ResourceDescriptor::new("kv", "kv-namespace");
        let err = op
            .execute(&kv, Inputs::new(), None, Decision::Create)
            .await
            .unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(backend.calls().create, 1);
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let backend = Arc::new(MemoryBackend::new().with_latency(Duration::from_millis(200)));
        let op = Operator::new(backend.clone(), ProviderContext::new())
            .with_retry(RetryConfig::none())
            .with_timeout(Duration::from_millis(20));

        let kv = ResourceDescriptor::new("kv", "kv-namespace");
        let err = op
            .execute(&kv, Inputs::new(), None, Decision::Create)
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_import_reads_once_and_records_baseline() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .insert_existing(
                "kv-namespace",
                LiveState::new("ab2f").with_attribute("title", json!("SESSION")),
            )
            .await;
        let op = operator(backend.clone());

        let kv = ResourceDescriptor::new("session", "kv-namespace").with_policy(Policy::ImportOnly {
            id: "ab2f".to_string(),
        });
        let desired = inputs(&[("title", json!("SESSIONS")), ("extra", json!(1))]);
        let decision = op.decide(&kv, &desired, None);
        let outcome = op.execute(&kv, desired, None, decision).await.unwrap();

        assert_eq!(outcome.action, ActionType::Import);
        assert_eq!(outcome.live.id, "ab2f");
        assert_eq!(outcome.state.status, ResourceStatus::Imported);
        assert_eq!(outcome.state.inputs["title"], json!("SESSION"));
        assert_eq!(outcome.state.inputs["extra"], json!(1));

        let calls = backend.calls();
        assert_eq!((calls.read, calls.create, calls.update), (1, 0, 0));
    }

    #[tokio::test]
    async fn test_import_missing_target() {
        let backend = Arc::new(MemoryBackend::new());
        let op = operator(backend);

        let db = ResourceDescriptor::new("db", "d1-database").with_policy(Policy::ImportOnly {
            id: "missing".to_string(),
        });
        let err = op
            .execute(&db, Inputs::new(), None, Decision::Import("missing".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::ImportTargetNotFound { .. }));
    }

    #[tokio::test]
    async fn test_destroy_retains_protected() {
        let backend = Arc::new(MemoryBackend::new());
        let op = operator(backend.clone());

        let db = ResourceDescriptor::new("db", "d1-database").with_policy(Policy::Protected);
        let recorded = prior("d1-database", Inputs::new(), Policy::Protected);
        assert_eq!(op.destroy(&db, Some(&recorded)).await.unwrap(), ActionType::Retain);

        // declaration no longer protects it, the recorded policy still does
        let unprotected = ResourceDescriptor::new("db", "d1-database");
        assert_eq!(
            op.destroy(&unprotected, Some(&recorded)).await.unwrap(),
            ActionType::Retain
        );
        assert_eq!(op.destroy(&unprotected, None).await.unwrap(), ActionType::Absent);
        assert_eq!(backend.calls().delete, 0);
    }
}
