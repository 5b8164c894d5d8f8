//! Engine error types

use stackflow_core::{ExportError, GraphError, ResolveError};
use thiserror::Error;

/// Errors raised by the engine and by backends.
///
/// Messages carry resource names, kinds and attribute names only; values
/// never end up in an error.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource '{name}' is protected; changing {fields:?} would require replacement")]
    ProtectedResource { name: String, fields: Vec<String> },

    #[error("Backend error: {message}")]
    Backend { message: String, transient: bool },

    #[error("Resource '{name}' was deleted for replacement but not recreated: {source}")]
    ReplacementIncomplete {
        name: String,
        source: Box<CloudError>,
    },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Import target not found: {kind} {id}")]
    ImportTargetNotFound { kind: String, id: String },

    #[error("Unsupported resource kind: {0}")]
    UnsupportedKind(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// A backend failure worth retrying
    pub fn transient(message: impl Into<String>) -> Self {
        CloudError::Backend {
            message: message.into(),
            transient: true,
        }
    }

    /// A backend failure that retrying will not fix
    pub fn permanent(message: impl Into<String>) -> Self {
        CloudError::Backend {
            message: message.into(),
            transient: false,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CloudError::Backend {
                transient: true,
                ..
            } | CloudError::Timeout(_)
        )
    }
}

impl CloudError {
    /// The recorded resource no longer exists in the backend
    pub fn resource_gone(&self) -> bool {
        matches!(self, CloudError::ReplacementIncomplete { .. })
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
