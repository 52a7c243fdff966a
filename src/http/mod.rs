//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup)
//!     → TraceLayer → TimeoutLayer
//!     → CORS gate (gate::cors)
//!     → CSRF gate (gate::csrf, attaches the session token)
//!     → token endpoint or application routes
//! ```

pub mod server;

pub use server::{HttpServer, Policies};
