//! Built-in CORS protection.
//!
//! # Data Flow
//! ```text
//! Request
//!     → CorsConfiguration::effective_for (most specific node)
//!     → none / disabled / abstract node, no Origin, or same origin → pass through
//!     → origin not allowed → 403
//!     → preflight (OPTIONS + Access-Control-Request-Method) → answered here
//!     → actual request → handler, then allow-origin headers added
//! ```
//!
//! # Design Decisions
//! - Unset settings fall back to methods `{GET, HEAD}`, no credentials and
//!   a max-age of 5 seconds
//! - An abstract node only layers settings for its descendants; when it is
//!   the resolved answer the request gets no CORS treatment

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, uri::Authority, HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use url::Url;

use crate::gate::protection::Protection;
use crate::matcher::RequestMatcher;
use crate::policy::{CorsConfiguration, CorsSettings};

pub const DEFAULT_MAX_AGE_SECS: u64 = 5;
const DEFAULT_METHODS: [&str; 2] = ["GET", "HEAD"];
const WILDCARD: &str = "*";

/// Effective CORS settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsRules {
    pub allowed_origins: BTreeSet<String>,
    pub allowed_methods: BTreeSet<String>,
    pub allowed_headers: BTreeSet<String>,
    pub exposed_headers: BTreeSet<String>,
    pub allow_credentials: bool,
    pub max_age: u64,
}

impl From<&CorsSettings> for CorsRules {
    fn from(settings: &CorsSettings) -> Self {
        Self {
            allowed_origins: settings.allowed_origins.clone().unwrap_or_default(),
            allowed_methods: settings
                .allowed_methods
                .clone()
                .unwrap_or_else(|| DEFAULT_METHODS.iter().map(|m| m.to_string()).collect()),
            allowed_headers: settings.allowed_headers.clone().unwrap_or_default(),
            exposed_headers: settings.exposed_headers.clone().unwrap_or_default(),
            allow_credentials: settings.allow_credentials.unwrap_or(false),
            max_age: settings.max_age.unwrap_or(DEFAULT_MAX_AGE_SECS),
        }
    }
}

impl CorsRules {
    pub fn allows_origin(&self, origin: &str) -> bool {
        self.allowed_origins.contains(WILDCARD) || self.allowed_origins.contains(origin)
    }

    pub fn allows_method(&self, method: &str) -> bool {
        self.allowed_methods.contains(WILDCARD) || self.allowed_methods.contains(method)
    }

    /// Headers named in a preflight, if every one of them is allowed.
    pub fn allows_headers<'a>(&self, requested: &'a str) -> Option<Vec<&'a str>> {
        let requested: Vec<&str> = requested
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .collect();

        if self.allowed_headers.contains(WILDCARD) {
            return Some(requested);
        }

        requested
            .iter()
            .all(|h| self.allowed_headers.iter().any(|a| a.eq_ignore_ascii_case(h)))
            .then_some(requested)
    }

    /// Value for `Access-Control-Allow-Origin`.
    fn allow_origin<'a>(&self, origin: &'a str) -> &'a str {
        if self.allowed_origins.contains(WILDCARD) && !self.allow_credentials {
            WILDCARD
        } else {
            origin
        }
    }
}

/// Origin and method checks plus header injection, per resolved node.
pub struct CorsProtection {
    config: Arc<CorsConfiguration>,
}

impl CorsProtection {
    pub fn new(config: Arc<CorsConfiguration>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Arc<CorsConfiguration> {
        &self.config
    }
}

impl Protection for CorsProtection {
    async fn protect(&self, _matcher: &RequestMatcher, req: Request<Body>, next: Next) -> Response {
        let rules = match self.config.effective_for(&req) {
            Some(node) if node.is_enabled() && !node.is_abstract() => CorsRules::from(node.settings()),
            _ => return next.run(req).await,
        };

        let Some(origin) = header_str(req.headers(), &header::ORIGIN).map(str::to_string) else {
            return next.run(req).await;
        };

        if is_same_origin(&req, &origin) {
            return next.run(req).await;
        }

        if !rules.allows_origin(&origin) {
            return reject(&req, &origin, "origin not allowed");
        }

        if let Some(requested) = preflight_method(&req) {
            return preflight(&req, &rules, &origin, &requested);
        }

        if !rules.allows_method(req.method().as_str()) {
            return reject(&req, &origin, "method not allowed");
        }

        let mut response = next.run(req).await;
        let headers = response.headers_mut();
        insert(headers, header::ACCESS_CONTROL_ALLOW_ORIGIN, rules.allow_origin(&origin));
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
        if rules.allow_credentials {
            headers.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        if !rules.exposed_headers.is_empty() {
            insert(headers, header::ACCESS_CONTROL_EXPOSE_HEADERS, &join(&rules.exposed_headers));
        }
        response
    }
}

/// Whether `origin` names the scheme, host and port the request was sent to.
fn is_same_origin<B>(req: &Request<B>, origin: &str) -> bool {
    let Ok(origin) = Url::parse(origin) else {
        return false;
    };

    let authority = match header_str(req.headers(), &header::HOST) {
        Some(host) => host.parse::<Authority>().ok(),
        None => req.uri().authority().cloned(),
    };
    let Some(authority) = authority else {
        return false;
    };

    let scheme = req.uri().scheme_str().unwrap_or("http");
    let port = authority.port_u16().or(match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    });

    origin.scheme() == scheme
        && origin
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(authority.host()))
        && origin.port_or_known_default() == port
}

fn preflight_method<B>(req: &Request<B>) -> Option<String> {
    if req.method() != Method::OPTIONS {
        return None;
    }
    header_str(req.headers(), &header::ACCESS_CONTROL_REQUEST_METHOD).map(str::to_string)
}

fn preflight<B>(req: &Request<B>, rules: &CorsRules, origin: &str, requested: &str) -> Response {
    if !rules.allows_method(requested) {
        return reject(req, origin, "preflight method not allowed");
    }

    let requested_headers = header_str(req.headers(), &header::ACCESS_CONTROL_REQUEST_HEADERS).unwrap_or("");
    let Some(allowed_headers) = rules.allows_headers(requested_headers) else {
        return reject(req, origin, "preflight headers not allowed");
    };

    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    insert(headers, header::ACCESS_CONTROL_ALLOW_ORIGIN, rules.allow_origin(origin));
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
    insert(headers, header::ACCESS_CONTROL_ALLOW_METHODS, &join(&rules.allowed_methods));
    if !allowed_headers.is_empty() {
        insert(headers, header::ACCESS_CONTROL_ALLOW_HEADERS, &allowed_headers.join(", "));
    }
    if rules.allow_credentials {
        headers.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    }
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(rules.max_age));
    response
}

fn reject<B>(req: &Request<B>, origin: &str, reason: &'static str) -> Response {
    tracing::warn!(
        origin = %origin,
        method = %req.method(),
        path = %req.uri().path(),
        reason,
        "Rejected CORS request"
    );
    (StatusCode::FORBIDDEN, "Invalid CORS request").into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn insert(headers: &mut HeaderMap, name: header::HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

fn join(values: &BTreeSet<String>) -> String {
    values.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
