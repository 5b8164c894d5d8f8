//! Planned actions and run reports

use serde::{Deserialize, Serialize};
use stackflow_core::{ExportSet, NodeStatus};

/// What the engine does (or would do) with one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Adopt an existing resource by id
    Import,
    /// Update an existing resource in place
    Update,
    /// Delete and re-create
    Replace,
    /// Delete a resource
    Delete,
    /// Change refused: the resource is protected
    Blocked,
    /// Left in place on destroy (protected or imported)
    Retain,
    /// Nothing recorded to act on
    Absent,
    /// No changes needed
    NoOp,
}

impl ActionType {
    /// Whether the action calls a mutating backend API
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ActionType::Create | ActionType::Update | ActionType::Replace | ActionType::Delete
        )
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Import => write!(f, "import"),
            ActionType::Update => write!(f, "update"),
            ActionType::Replace => write!(f, "replace"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::Blocked => write!(f, "blocked"),
            ActionType::Retain => write!(f, "retain"),
            ActionType::Absent => write!(f, "absent"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Represents a planned action for a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Logical name of the resource
    pub resource: String,

    /// Resource kind
    pub kind: String,

    /// Type of action to perform
    pub action_type: ActionType,

    /// Input fields involved in the change
    pub fields: Vec<String>,

    /// Whether some inputs are only known after dependencies apply
    pub pending_inputs: bool,
}

/// Plan containing all actions, in apply order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// List of actions to perform
    pub actions: Vec<Action>,

    /// Whether the plan has any changes
    pub has_changes: bool,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        let has_changes = actions
            .iter()
            .any(|a| !matches!(a.action_type, ActionType::NoOp | ActionType::Absent));
        Self {
            actions,
            has_changes,
        }
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Action planned for a resource
    pub fn action_for(&self, resource: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.resource == resource)
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            import: self.actions_by_type(ActionType::Import).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            replace: self.actions_by_type(ActionType::Replace).len(),
            blocked: self.actions_by_type(ActionType::Blocked).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub import: usize,
    pub update: usize,
    pub replace: usize,
    pub blocked: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to import, {} to update, {} to replace, {} blocked, {} unchanged",
            self.create, self.import, self.update, self.replace, self.blocked, self.no_change
        )
    }
}

/// Outcome of one resource within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeReport {
    /// Logical name
    pub name: String,

    /// Final status
    pub status: NodeStatus,

    /// Action taken, if the node was attempted
    pub action: Option<ActionType>,

    /// Error message if failed
    pub error: Option<String>,
}

/// Result of an apply or destroy run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// Per-resource outcomes, in apply order
    pub nodes: Vec<NodeReport>,

    /// Exports, when every source resolved
    #[serde(skip)]
    pub exports: Option<ExportSet>,

    /// Why exports could not be materialized
    pub export_error: Option<String>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when every node succeeded and exports (if any were computed) resolved
    pub fn is_success(&self) -> bool {
        self.nodes
            .iter()
            .all(|n| !matches!(n.status, NodeStatus::Failed | NodeStatus::Skipped))
            && self.export_error.is_none()
    }

    pub fn add_success(&mut self, name: impl Into<String>, action: ActionType) {
        self.nodes.push(NodeReport {
            name: name.into(),
            status: NodeStatus::Applied,
            action: Some(action),
            error: None,
        });
    }

    pub fn add_failure(&mut self, name: impl Into<String>, action: Option<ActionType>, error: String) {
        self.nodes.push(NodeReport {
            name: name.into(),
            status: NodeStatus::Failed,
            action,
            error: Some(error),
        });
    }

    pub fn add_skipped(&mut self, name: impl Into<String>) {
        self.nodes.push(NodeReport {
            name: name.into(),
            status: NodeStatus::Skipped,
            action: None,
            error: None,
        });
    }

    pub fn node(&self, name: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Names with the given status
    pub fn with_status(&self, status: NodeStatus) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.status == status)
            .map(|n| n.name.as_str())
            .collect()
    }
}
