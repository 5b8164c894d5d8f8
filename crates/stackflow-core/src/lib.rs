//! StackFlow Core
//!
//! Backend-independent part of the provisioning engine:
//!
//! - **Model**: resource descriptors, input values, references, policies
//! - **Graph**: dependency graph keyed by logical name, cycle detection
//! - **Scheduler**: layered topological order with a stable tie-break
//! - **Resolve**: lazy substitution of references with live attributes
//! - **Derive**: pure derived-value functions with secret propagation
//! - **Export**: the final named output set, with redaction
//!
//! # Flow
//!
//! ```text
//! Declaration ──▶ DependencyGraph ──▶ Schedule (layers)
//!                        │
//!                        ▼ (operators apply each layer)
//!                 applied graph ──▶ DerivedValues ──▶ ExportSet
//! ```
//!
//! Nothing in this crate performs backend I/O; see `stackflow-cloud` for the
//! engine that drives providers.

pub mod derive;
pub mod error;
pub mod export;
pub mod graph;
pub mod live;
pub mod model;
pub mod resolve;
pub mod scheduler;

// Re-exports
pub use derive::{DerivedScope, DerivedValues, VariableScope, compute_derived, sha256_hex};
pub use error::{DeclarationError, DeriveError, ExportError, GraphError, ResolveError, Result};
pub use export::{ExportSet, REDACTED, export, materialize};
pub use graph::{DependencyGraph, NodeStatus, ResourceNode};
pub use live::LiveState;
pub use model::{
    Declaration, DeriveFn, DerivedOutput, ExportDef, Policy, Reference, ResourceDescriptor, Value,
    Variables,
};
pub use resolve::{GraphScope, Resolved, ResolvedInputs, Scope, resolve_inputs, resolve_value};
pub use scheduler::{Schedule, schedule};
