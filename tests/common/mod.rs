//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use policy_gate::client::{ClientError, InboundResponse, OutboundRequest, Transport};
use policy_gate::config::{parse_config, PolicyGateConfig};
use policy_gate::http::{HttpServer, Policies};
use policy_gate::lifecycle::Shutdown;
use policy_gate::token::{RESPONSE_HEADER_HEADER, RESPONSE_HEADER_PARAM, RESPONSE_HEADER_TOKEN};

/// In-memory transport replaying canned responses and recording requests.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    responses: Arc<Mutex<VecDeque<InboundResponse>>>,
    sent: Arc<Mutex<Vec<OutboundRequest>>>,
}

impl ScriptedTransport {
    pub fn new<I: IntoIterator<Item = InboundResponse>>(responses: I) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().collect())),
            sent: Arc::default(),
        }
    }

    pub fn push(&self, response: InboundResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, request: OutboundRequest) -> Result<InboundResponse, ClientError> {
        self.sent.lock().unwrap().push(request);
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("transport ran out of scripted responses");
        Ok(response)
    }
}

pub fn response(status: u16) -> InboundResponse {
    InboundResponse {
        status: StatusCode::from_u16(status).unwrap(),
        headers: HeaderMap::new(),
        body: Bytes::from_static(b""),
    }
}

pub fn body_response(status: u16, body: &'static str) -> InboundResponse {
    InboundResponse {
        body: Bytes::from_static(body.as_bytes()),
        ..response(status)
    }
}

/// A `204` token endpoint answer carrying `token`.
pub fn token_response(token: &str) -> InboundResponse {
    let mut headers = HeaderMap::new();
    headers.insert(RESPONSE_HEADER_HEADER, HeaderValue::from_static("X-CSRF-TOKEN"));
    headers.insert(RESPONSE_HEADER_PARAM, HeaderValue::from_static("_csrf"));
    headers.insert(RESPONSE_HEADER_TOKEN, HeaderValue::from_str(token).unwrap());
    InboundResponse {
        headers,
        ..response(204)
    }
}

pub fn config(toml: &str) -> PolicyGateConfig {
    parse_config(toml).unwrap()
}

/// Application routes placed behind the gates.
pub fn app() -> Router {
    Router::new()
        .route("/public/{*rest}", get(|| async { "public" }))
        .route("/api/{*rest}", get(|| async { "read" }).post(|| async { "written" }))
}

pub fn request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder().method(method).uri(uri)
}

pub fn empty(builder: axum::http::request::Builder) -> Request<Body> {
    builder.body(Body::empty()).unwrap()
}

/// Serve `config` on an ephemeral port.
pub async fn start_server(
    config: PolicyGateConfig,
) -> (SocketAddr, Shutdown, Policies, mpsc::UnboundedSender<PolicyGateConfig>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(config, app());
    let policies = server.policies().clone();
    let shutdown = Shutdown::new();
    let (tx, rx) = mpsc::unbounded_channel();

    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        server.run(listener, rx, server_shutdown).await.unwrap();
    });

    (addr, shutdown, policies, tx)
}
