//! Policy subsystem.
//!
//! # Data Flow
//! ```text
//! Declared fragments (config file, code)
//!     → aggregate.rs (defensive copy, one writer at a time)
//!     → compiler.rs (dedupe, link parents, drop invalid subtrees, inherit)
//!     → tree.rs (immutable CompiledTree, published atomically)
//!     → gate filters resolve per request
//! ```
//!
//! CSRF fragments (csrf.rs) go through the same aggregation but compile to a
//! flat matcher instead of a tree.

pub mod aggregate;
pub mod compiler;
pub mod csrf;
pub mod fragment;
pub mod tree;

pub use aggregate::{Aggregate, AggregatedConfiguration, ChangeListener, CorsConfiguration};
pub use compiler::compile;
pub use csrf::{CsrfConfiguration, CsrfFragment, CsrfPolicy};
pub use fragment::{CorsSettings, PolicyFragment, ROOT_NAME};
pub use tree::{CompiledNode, CompiledTree, NodeId};
