//! Policy gate library.
//!
//! CORS and CSRF request policies declared as trees of named, inheritable
//! fragments, compiled into immutable snapshots, hot-swapped at runtime and
//! enforced by lazily re-initializing gate filters. Also ships the client
//! side of the CSRF token protocol.

// Policy model
pub mod matcher;
pub mod policy;

// Enforcement
pub mod gate;
pub mod token;

// Client side
pub mod client;

// Serving
pub mod config;
pub mod http;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::PolicyGateConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
