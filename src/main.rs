//! Policy gate server.
//!
//! Serves a small demonstration application behind the CORS and CSRF gates.
//!
//! ```text
//!     Client ──▶ TraceLayer ──▶ Timeout ──▶ CORS gate ──▶ CSRF gate ──▶ /csrf/token
//!                                                                  └──▶ /health, echo
//!
//!     policy file ──notify──▶ ConfigWatcher ──mpsc──▶ Policies::apply ──▶ gates reset
//! ```

use std::path::PathBuf;

use axum::{
    body::Body,
    http::Request,
    routing::get,
    Json, Router,
};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use policy_gate::config::{load_config, watcher::ConfigWatcher, PolicyGateConfig};
use policy_gate::lifecycle::{signals::shutdown_on_signal, Shutdown};
use policy_gate::observability::{logging, metrics};
use policy_gate::HttpServer;

#[derive(Parser)]
#[command(name = "policy-gate")]
#[command(about = "CORS and CSRF policy gate", long_about = None)]
struct Args {
    /// Policy file (TOML). Watched for changes; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => PolicyGateConfig::default(),
    };

    logging::init(&config.observability.log_level);

    tracing::info!("policy-gate v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        cors_fragments = config.cors_fragments.len(),
        csrf_fragments = ?config.csrf_fragments.as_ref().map(Vec::len),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher alive for the lifetime of the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::start(path)?;
            (Some(watcher), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .fallback(echo);

    HttpServer::new(config, app)
        .run(listener, config_updates, shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn echo(req: Request<Body>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "method": req.method().as_str(),
        "path": req.uri().path(),
        "query": req.uri().query(),
    }))
}
