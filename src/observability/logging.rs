//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for the binaries
//! - Resolve the log filter from the environment, then config
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - Library code only emits events; it never installs a subscriber

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor the config names one.
pub const DEFAULT_FILTER: &str = "policy_gate=debug,tower_http=debug";

/// Build the filter directive for a configured log level.
///
/// A bare level (`"info"`) is scoped to this crate and `tower_http`; anything
/// else is taken as a full directive string.
pub fn filter_directive(log_level: &str) -> String {
    let level = log_level.trim();
    match level {
        "" => DEFAULT_FILTER.to_string(),
        "trace" | "debug" | "info" | "warn" | "error" => {
            format!("policy_gate={},tower_http={}", level, level)
        }
        other => other.to_string(),
    }
}

/// Install the global subscriber. Call once, from `main`.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
