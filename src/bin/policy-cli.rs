use std::path::PathBuf;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Method, Request};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use url::Url;

use policy_gate::client::{CsrfTokenClient, OutboundRequest, ReqwestTransport, TokenServiceClient};
use policy_gate::config::load_config;
use policy_gate::http::Policies;
use policy_gate::policy::{CompiledNode, CompiledTree};

#[derive(Parser)]
#[command(name = "policy-cli")]
#[command(about = "Client and inspection CLI for the policy gate", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the CSRF token for a protected URL
    Token {
        /// Token endpoint
        #[arg(short, long, default_value = "http://localhost:8080/csrf/token")]
        service: Url,
        /// Protected URL the token is for
        url: Url,
    },
    /// Call a protected URL with the CSRF token attached
    Call {
        #[arg(short, long, default_value = "http://localhost:8080/csrf/token")]
        service: Url,
        #[arg(short = 'X', long, default_value = "POST")]
        method: Method,
        /// Extra request header, `Name: value`
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Request body
        #[arg(short, long)]
        data: Option<String>,
        url: Url,
    },
    /// Compile a policy file and print the CORS tree and CSRF matcher
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show which policies apply to a request
    Resolve {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short = 'X', long, default_value = "GET")]
        method: Method,
        /// Path and optional query, e.g. `/api/v1?x=1`
        target: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Token { service, url } => {
            let client = TokenServiceClient::new(service, ReqwestTransport::new()?);
            match client.get_token(&url).await? {
                Some(token) => println!("{}", serde_json::to_string_pretty(&token)?),
                None => println!("No token required (CSRF disabled for {})", url),
            }
        }
        Commands::Call {
            service,
            method,
            headers,
            data,
            url,
        } => {
            let mut request = OutboundRequest::new(method, url);
            for header in &headers {
                let (name, value) = header
                    .split_once(':')
                    .ok_or_else(|| format!("header {:?} is not `Name: value`", header))?;
                request.headers.append(
                    HeaderName::try_from(name.trim())?,
                    HeaderValue::from_str(value.trim())?,
                );
            }
            if let Some(data) = data {
                request = request.with_body(data);
            }

            let mut client = CsrfTokenClient::new(service, ReqwestTransport::new()?);
            let response = client.execute(&request).await?;

            println!("{}", response.status);
            println!("{}", String::from_utf8_lossy(&response.body));
        }
        Commands::Check { config } => {
            let policies = Policies::from_config(&load_config(&config)?);
            let csrf = policies.csrf.snapshot();
            let report = json!({
                "cors": tree_json(&policies.cors.snapshot()),
                "csrf": {
                    "enabled": csrf.is_enabled(),
                    "matcher": format!("{:?}", csrf.matcher()),
                },
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Resolve {
            config,
            method,
            target,
        } => {
            let policies = Policies::from_config(&load_config(&config)?);
            let request = Request::builder()
                .method(method)
                .uri(target)
                .body(Body::empty())?;

            let report = json!({
                "cors": policies.cors.effective_for(&request).as_ref().map(node_json),
                "csrf_protected": policies.csrf.is_enabled_for(&request),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn tree_json(tree: &CompiledTree) -> Value {
    json!({
        "enabled": tree.is_enabled(),
        "nodes": tree.iter().map(node_json).collect::<Vec<_>>(),
    })
}

fn node_json(node: &CompiledNode) -> Value {
    json!({
        "name": node.name(),
        "parent": node.parent_name(),
        "enabled": node.is_enabled(),
        "abstract": node.is_abstract(),
        "matcher": format!("{:?}", node.matcher()),
        "settings": node.settings(),
    })
}
