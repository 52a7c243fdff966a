//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the CORS and CSRF gate filters over the configured policies
//! - Mount the CSRF token endpoint next to the application routes
//! - Wire up middleware (tracing, timeout, CORS gate, CSRF gate)
//! - Apply reloaded policy while serving
//! - Drain and stop on shutdown
//!
//! # Design Decisions
//! - CORS runs outside CSRF so preflights are answered before any token check
//! - Reloads only touch policy; listener and header names need a restart
//! - A policy section that fails to convert disables that gate (fail-open for
//!   the policy layer) instead of keeping a policy the file no longer states

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::policy::{cors_fragments, csrf_fragments};
use crate::config::PolicyGateConfig;
use crate::gate::{
    gate_middleware, CorsGate, CorsProtection, CsrfGate, CsrfProtection, GateFilter,
};
use crate::lifecycle::shutdown::{wait as shutdown_signal, Shutdown};
use crate::policy::{CorsConfiguration, CsrfConfiguration};
use crate::token::token_handler;

/// The live policy configurations the gates read from.
#[derive(Clone, Default)]
pub struct Policies {
    pub cors: Arc<CorsConfiguration>,
    pub csrf: Arc<CsrfConfiguration>,
}

impl Policies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Policies as declared by `config`.
    pub fn from_config(config: &PolicyGateConfig) -> Self {
        let policies = Self::new();
        policies.apply(config);
        policies
    }

    /// Replace both policies with the ones `config` declares.
    pub fn apply(&self, config: &PolicyGateConfig) {
        match cors_fragments(config) {
            Ok(fragments) => self.cors.apply(Some(fragments), config.cors.enabled),
            Err(e) => {
                tracing::error!(error = %e, "Invalid CORS policy. Assuming CORS disabled.");
                self.cors.apply(None, config.cors.enabled);
            }
        }

        match csrf_fragments(config) {
            Ok(fragments) => self.csrf.apply(fragments, config.csrf.enabled),
            Err(e) => {
                tracing::error!(error = %e, "Invalid CSRF policy. Assuming CSRF disabled.");
                self.csrf.apply(Some(Vec::new()), config.csrf.enabled);
            }
        }
    }
}

/// HTTP server putting the policy gates in front of an application router.
pub struct HttpServer {
    router: Router,
    config: PolicyGateConfig,
    policies: Policies,
}

impl HttpServer {
    /// Wrap `app` with the gates and the token endpoint.
    pub fn new(config: PolicyGateConfig, app: Router) -> Self {
        let policies = Policies::from_config(&config);
        let router = Self::build_router(&config, &policies, app);
        Self {
            router,
            config,
            policies,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &PolicyGateConfig, policies: &Policies, app: Router) -> Router {
        let csrf_gate: Arc<CsrfGate> = Arc::new(GateFilter::new(
            "csrf",
            policies.csrf.clone(),
            CsrfProtection::from_config(&config.csrf),
        ));
        csrf_gate.init();

        let cors_gate: Arc<CorsGate> = Arc::new(GateFilter::new(
            "cors",
            policies.cors.clone(),
            CorsProtection::new(policies.cors.clone()),
        ));
        cors_gate.init();

        app.route(&config.csrf.token_path, get(token_handler))
            .layer(middleware::from_fn_with_state(
                csrf_gate,
                gate_middleware::<CsrfConfiguration, CsrfProtection>,
            ))
            .layer(middleware::from_fn_with_state(
                cors_gate,
                gate_middleware::<CorsConfiguration, CorsProtection>,
            ))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// The fully layered router, for embedding or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn policies(&self) -> &Policies {
        &self.policies
    }

    pub fn config(&self) -> &PolicyGateConfig {
        &self.config
    }

    /// Serve until `shutdown` fires, applying every configuration received
    /// on `config_updates`.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<PolicyGateConfig>,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            token_path = %self.config.csrf.token_path,
            "HTTP server starting"
        );

        let policies = self.policies.clone();
        let mut stop_reloads = shutdown.subscribe();
        let reloader = tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(config) => {
                            tracing::info!("Applying reloaded policy");
                            policies.apply(&config);
                        }
                        None => break,
                    },
                    _ = stop_reloads.recv() => break,
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal(shutdown.subscribe()))
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
