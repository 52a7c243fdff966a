//! Built-in CSRF protection.
//!
//! # Responsibilities
//! - Resolve (or start) the caller's session and its token
//! - Attach the token to every request so the token endpoint can publish it
//! - Reject matched requests that do not echo the token back
//!
//! # Design Decisions
//! - The token travels in a request header; the query parameter is accepted
//!   as a fallback
//! - Comparison does not short-circuit on the first differing byte
//! - The token endpoint itself is never enforced, or no client could ever
//!   obtain a token

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::schema::CsrfConfig;
use crate::gate::protection::Protection;
use crate::gate::session::{Session, SessionStore};
use crate::matcher::RequestMatcher;
use crate::token::CsrfToken;

/// Session-keyed synchronizer token protection.
#[derive(Debug)]
pub struct CsrfProtection {
    sessions: SessionStore,
    header_name: String,
    parameter_name: String,
    token_path: Option<String>,
}

impl CsrfProtection {
    pub fn new(
        header_name: impl Into<String>,
        parameter_name: impl Into<String>,
        cookie_name: impl Into<String>,
    ) -> Self {
        Self {
            sessions: SessionStore::new(cookie_name),
            header_name: header_name.into(),
            parameter_name: parameter_name.into(),
            token_path: None,
        }
    }

    /// Exempt the token endpoint at `path` from enforcement.
    pub fn with_token_path(mut self, path: impl Into<String>) -> Self {
        self.token_path = Some(path.into());
        self
    }

    pub fn from_config(config: &CsrfConfig) -> Self {
        Self::new(
            config.header_name.as_str(),
            config.parameter_name.as_str(),
            config.cookie_name.as_str(),
        )
        .with_token_path(config.token_path.as_str())
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    fn requires_token<B>(&self, matcher: &RequestMatcher, req: &Request<B>) -> bool {
        self.token_path.as_deref() != Some(req.uri().path()) && matcher.matches(req)
    }

    fn carries_token<B>(&self, req: &Request<B>, expected: &str) -> bool {
        let from_header = req
            .headers()
            .get(self.header_name.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let presented = from_header.or_else(|| {
            req.uri().query().and_then(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .find(|(name, _)| name == self.parameter_name.as_str())
                    .map(|(_, value)| value.into_owned())
            })
        });

        presented.is_some_and(|presented| constant_time_eq(presented.as_bytes(), expected.as_bytes()))
    }

    fn set_cookie(&self, response: &mut Response, session: &Session) {
        if !session.is_new {
            return;
        }
        match HeaderValue::from_str(&self.sessions.cookie(session)) {
            Ok(cookie) => {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
            Err(e) => {
                tracing::error!(error = %e, cookie = %self.sessions.cookie_name(), "Invalid session cookie");
            }
        }
    }
}

impl Protection for CsrfProtection {
    async fn protect(&self, matcher: &RequestMatcher, mut req: Request<Body>, next: Next) -> Response {
        let session = self.sessions.load_or_create(&req);

        if self.requires_token(matcher, &req) && !self.carries_token(&req, &session.token) {
            tracing::warn!(
                method = %req.method(),
                path = %req.uri().path(),
                "Rejected request without a valid CSRF token"
            );
            let mut response = (StatusCode::FORBIDDEN, "Invalid or missing CSRF token").into_response();
            self.set_cookie(&mut response, &session);
            return response;
        }

        req.extensions_mut().insert(CsrfToken {
            header_name: self.header_name.clone(),
            parameter_name: self.parameter_name.clone(),
            value: session.token.clone(),
        });

        let mut response = next.run(req).await;
        self.set_cookie(&mut response, &session);
        response
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[test]
    fn test_token_from_header_or_param() {
        let protection = CsrfProtection::new("X-CSRF-TOKEN", "_csrf", "S");

        let header = Request::builder()
            .uri("/x")
            .header("x-csrf-token", "t1")
            .body(())
            .unwrap();
        assert!(protection.carries_token(&header, "t1"));
        assert!(!protection.carries_token(&header, "t2"));

        let param = Request::builder().uri("/x?a=1&_csrf=t1").body(()).unwrap();
        assert!(protection.carries_token(&param, "t1"));

        let missing = Request::builder().uri("/x").body(()).unwrap();
        assert!(!protection.carries_token(&missing, "t1"));
    }

    #[test]
    fn test_token_endpoint_is_exempt() {
        let protection = CsrfProtection::from_config(&CsrfConfig::default());
        let token = Request::builder().uri("/csrf/token?url=/x").body(()).unwrap();
        let other = Request::builder().uri("/x").body(()).unwrap();

        assert!(!protection.requires_token(&RequestMatcher::All, &token));
        assert!(protection.requires_token(&RequestMatcher::All, &other));
        assert!(!protection.requires_token(&RequestMatcher::None, &other));
    }
}
