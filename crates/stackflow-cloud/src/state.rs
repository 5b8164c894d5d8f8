//! State management for managed resources
//!
//! Manages the `.stackflow/state.json` file which records, per logical name,
//! the backend id, the inputs applied last time and the live attributes.
//! The recorded inputs are what makes a repeated apply a no-op.

use crate::error::{CloudError, Result};
use crate::provider::Inputs;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use stackflow_core::{LiveState, Policy};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".stackflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";

/// State of every managed resource of one stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Resources indexed by logical name
    pub resources: IndexMap<String, ResourceState>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: IndexMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update a resource
    pub fn set_resource(&mut self, name: impl Into<String>, state: ResourceState) {
        self.resources.insert(name.into(), state);
        self.updated_at = Utc::now();
    }

    /// Remove a resource
    pub fn remove_resource(&mut self, name: &str) -> Option<ResourceState> {
        let result = self.resources.shift_remove(name);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    /// Get a resource by logical name
    pub fn get_resource(&self, name: &str) -> Option<&ResourceState> {
        self.resources.get(name)
    }
}

/// Recorded state of a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Provider-specific resource ID
    pub id: String,

    /// Resource kind
    pub kind: String,

    /// How the resource came under management
    pub status: ResourceStatus,

    /// Policy at the last apply
    #[serde(default)]
    pub policy: Policy,

    /// Resolved inputs at the last apply
    #[serde(default)]
    pub inputs: Inputs,

    /// Live attributes reported by the backend
    #[serde(default)]
    pub attributes: IndexMap<String, serde_json::Value>,

    /// Secret-bearing attribute names
    #[serde(default)]
    pub secrets: BTreeSet<String>,

    /// When the resource came under management
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(kind: impl Into<String>, live: LiveState, inputs: Inputs) -> Self {
        let now = Utc::now();
        Self {
            id: live.id,
            kind: kind.into(),
            status: ResourceStatus::Managed,
            policy: Policy::Fresh,
            inputs,
            attributes: live.attributes,
            secrets: live.secrets,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Record a new live state and inputs, keeping the creation timestamp.
    ///
    /// Attributes the backend only reports at creation (a token value, say)
    /// are carried over when the update response omits them.
    pub fn updated(mut self, live: LiveState, inputs: Inputs) -> Self {
        let mut attributes = live.attributes;
        let mut secrets = live.secrets;
        for (key, value) in std::mem::take(&mut self.attributes) {
            if !attributes.contains_key(&key) {
                if self.secrets.contains(&key) {
                    secrets.insert(key.clone());
                }
                attributes.insert(key, value);
            }
        }

        self.id = live.id;
        self.attributes = attributes;
        self.secrets = secrets;
        self.inputs = inputs;
        self.updated_at = Utc::now();
        self
    }

    /// Live state as last seen
    pub fn live_state(&self) -> LiveState {
        LiveState {
            id: self.id.clone(),
            attributes: self.attributes.clone(),
            secrets: self.secrets.clone(),
        }
    }
}

/// How a resource came under management
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Created by the engine
    Managed,
    /// Adopted from an existing backend resource
    Imported,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Managed => write!(f, "managed"),
            ResourceStatus::Imported => write!(f, "imported"),
        }
    }
}

/// State manager for reading/writing state files
pub struct StateManager {
    state_dir: PathBuf,
}

impl StateManager {
    /// State under `<project_root>/.stackflow`
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self::in_dir(project_root.as_ref().join(STATE_DIR))
    }

    /// State directly under `state_dir`
    pub fn in_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// Get the state directory path
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone()
    }

    /// Get the state file path
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    /// Get the backup file path
    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    /// Ensure the state directory exists
    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(GlobalState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: GlobalState = serde_json::from_str(&content)?;

        // Version check
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} resources", state.resources.len());
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        // secret attributes are stored in the state file
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        tracing::debug!("Saved state with {} resources", state.resources.len());
        Ok(())
    }
}
