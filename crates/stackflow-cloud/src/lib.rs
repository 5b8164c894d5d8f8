//! StackFlow Cloud
//!
//! Apply engine and provider abstraction. The engine walks the schedule
//! produced by `stackflow-core`, hands each resource to the operator and
//! records what the backend reports in `.stackflow/state.json`.
//!
//! # Backends
//!
//! - **memory**: in-process store for dry runs and tests
//! - **cloudflare**: R2, KV, D1 and API tokens (see `stackflow-cloud-cloudflare`)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  StackFlow CLI                   │
//! │               (stack plan/up/down)               │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                stackflow-cloud                   │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │    Engine    │─▶│   Operator   │ retry/timeout│
//! │  └──────┬───────┘  └──────┬───────┘             │
//! │  ┌──────▼───────┐  ┌──────▼──────────────────┐  │
//! │  │  State Mgmt  │  │ trait ResourceBackend   │  │
//! │  └──────────────┘  └─────────────────────────┘  │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │    memory     │ │  cloudflare   │
//! │    backend    │ │   backend     │
//! └───────────────┘ └───────────────┘
//! ```

pub mod action;
pub mod engine;
pub mod error;
pub mod memory;
pub mod operator;
pub mod provider;
pub mod state;

// Re-exports
pub use action::{Action, ActionType, NodeReport, Plan, PlanSummary, RunReport};
pub use engine::Engine;
pub use error::{CloudError, Result};
pub use memory::{BackendCall, CallCounts, MemoryBackend};
pub use operator::{DEFAULT_TIMEOUT, Decision, NodeOutcome, Operator};
pub use provider::{AuthStatus, InputDiff, Inputs, ProviderContext, ResourceBackend, RetryConfig};
pub use state::{GlobalState, ResourceState, ResourceStatus, StateManager};
