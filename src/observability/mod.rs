//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Policy compilation, gate filters, HTTP layer produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by EnvFilter)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every policy diagnostic
//! - Metrics are cheap (atomic increments); recording without an installed
//!   recorder is a no-op, so library users pay nothing

pub mod logging;
pub mod metrics;
