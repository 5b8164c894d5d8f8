use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading a declaration or building its graph.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("cyclic dependency between resources: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("duplicate resource name: {0}")]
    DuplicateResource(String),

    #[error("resource name '{0}' is reserved")]
    ReservedName(String),

    #[error("resource '{source_name}' references unknown resource '{target}'")]
    UnknownReference { source_name: String, target: String },

    #[error("'{owner}' uses undefined variable '{name}'")]
    UnknownVariable { owner: String, name: String },

    #[error("resource '{0}' already has a live state")]
    AlreadyApplied(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),
}

/// Errors raised while substituting references with live values.
///
/// Messages name resources and attribute paths only, never the values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("reference to '{0}' resolved before it was applied")]
    UnresolvedReference(String),

    #[error("resource '{target}' has no attribute '{path}'")]
    MissingAttribute { target: String, path: String },

    #[error("undefined variable '{0}'")]
    UnknownVariable(String),

    #[error("unknown derived output '{0}'")]
    UnknownDerived(String),

    #[error("unknown resource '{0}'")]
    UnknownResource(String),
}

/// Errors raised by derived functions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeriveError {
    #[error("{function} expects {expected} argument(s), got {actual}")]
    Arity {
        function: String,
        expected: usize,
        actual: usize,
    },
}

/// Errors raised while materializing derived outputs and exports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("export '{export}' depends on '{source_name}', which was never applied")]
    UnresolvedExport { export: String, source_name: String },

    #[error("derived output '{name}' failed: {source}")]
    Derivation { name: String, source: DeriveError },

    #[error("'{name}' could not be resolved: {source}")]
    Resolve { name: String, source: ResolveError },
}

/// Errors raised while reading a declaration document.
#[derive(Error, Debug)]
pub enum DeclarationError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid YAML declaration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON declaration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid reference '{0}': expected <resource>.<attribute>")]
    InvalidReference(String),

    #[error("invalid variable override '{0}': expected key=value")]
    InvalidOverride(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub type Result<T> = std::result::Result<T, GraphError>;
