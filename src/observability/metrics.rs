//! Metrics collection and exposition.
//!
//! # Metrics
//! - `policy_compilations_total` (counter): compilations by `kind`
//!   (`cors`, `csrf`) and `outcome` (`enabled`, `disabled`)
//! - `policy_gate_decisions_total` (counter): requests seen by a gate filter,
//!   by `gate` and `decision` (`protected`, `bypassed`)
//!
//! # Design Decisions
//! - Free functions over the `metrics` facade; the exporter is optional
//! - Label values are static strings

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter, serving scrapes on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one policy compilation.
pub fn record_compilation(kind: &'static str, enabled: bool) {
    let outcome = if enabled { "enabled" } else { "disabled" };
    metrics::counter!("policy_compilations_total", "kind" => kind, "outcome" => outcome)
        .increment(1);
}

/// Record whether a gate filter handed a request to its protection.
pub fn record_gate_decision(gate: &'static str, protected: bool) {
    let decision = if protected { "protected" } else { "bypassed" };
    metrics::counter!("policy_gate_decisions_total", "gate" => gate, "decision" => decision)
        .increment(1);
}
