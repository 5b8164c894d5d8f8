//! Declaration data model
//!
//! Resources, input values, derived outputs and exports as read from a
//! declaration document. Everything here is immutable once a graph is built.

mod declaration;
mod resource;
mod value;

// Re-exports
pub use declaration::*;
pub use resource::*;
pub use value::*;
