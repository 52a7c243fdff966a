//! Outbound HTTP transport.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use reqwest::cookie::Jar;
use url::Url;

use crate::client::error::ClientError;

/// Request property holding a per-request timeout, in milliseconds.
pub const PROPERTY_TIMEOUT_MS: &str = "timeout_ms";

/// A request as the caller built it. Cloned, never mutated, by the client.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// Transport-level settings that travel with the request.
    pub properties: BTreeMap<String, String>,
    pub body: Bytes,
}

impl OutboundRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            properties: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct InboundResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Sends one request and returns its response.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: OutboundRequest,
    ) -> impl Future<Output = Result<InboundResponse, ClientError>> + Send;
}

/// `reqwest` transport keeping session cookies between calls.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    cookies: Arc<Jar>,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, ClientError> {
        Self::with_jar(Arc::new(Jar::default()))
    }

    /// Share `cookies` with other transports or code.
    pub fn with_jar(cookies: Arc<Jar>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .build()?;
        Ok(Self { client, cookies })
    }

    pub fn cookies(&self) -> &Arc<Jar> {
        &self.cookies
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<InboundResponse, ClientError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body);

        if let Some(timeout) = request
            .properties
            .get(PROPERTY_TIMEOUT_MS)
            .and_then(|ms| ms.parse::<u64>().ok())
        {
            builder = builder.timeout(Duration::from_millis(timeout));
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(InboundResponse {
            status,
            headers,
            body,
        })
    }
}
