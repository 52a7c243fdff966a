//! Gate filter subsystem.
//!
//! # Data Flow
//! ```text
//! Request
//!     → filter.rs (lazy init from the policy source, enabled?)
//!         enabled  → Protection::protect (csrf.rs / cors.rs)
//!         disabled → next handler, untouched
//! ```
//!
//! # Design Decisions
//! - The filter is generic over its policy source and protection, so the
//!   lifecycle is written once for CORS and CSRF
//! - A broken policy degrades the gate to pass-through; it never fails
//!   the request path

pub mod cors;
pub mod csrf;
pub mod filter;
pub mod protection;
pub mod session;

pub use cors::{CorsProtection, CorsRules};
pub use csrf::CsrfProtection;
pub use filter::{gate_middleware, GateFilter, PolicySource};
pub use protection::Protection;
pub use session::{Session, SessionStore};

/// Gate filter enforcing the CSRF policy.
pub type CsrfGate = GateFilter<crate::policy::CsrfConfiguration, CsrfProtection>;

/// Gate filter enforcing the CORS policy tree.
pub type CorsGate = GateFilter<crate::policy::CorsConfiguration, CorsProtection>;
