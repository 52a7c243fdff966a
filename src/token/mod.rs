//! CSRF token endpoint.
//!
//! # Protocol
//! ```text
//! GET <token-path>?url=<protected-url>
//!     → 204 No Content, empty body
//!       X-CSRF-HEADER: <request header carrying the token>
//!       X-CSRF-PARAM:  <request parameter carrying the token>
//!       X-CSRF-TOKEN:  <token value>
//! ```
//! No token headers means CSRF is disabled for the URL. The `url` parameter
//! is informational; the token comes from the session.

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Default mount point of the token endpoint.
pub const DEFAULT_TOKEN_PATH: &str = "/csrf/token";

/// Query parameter naming the protected URL.
pub const QUERY_PARAM_URL: &str = "url";

pub const RESPONSE_HEADER_HEADER: HeaderName = HeaderName::from_static("x-csrf-header");
pub const RESPONSE_HEADER_PARAM: HeaderName = HeaderName::from_static("x-csrf-param");
pub const RESPONSE_HEADER_TOKEN: HeaderName = HeaderName::from_static("x-csrf-token");

const EXPOSED_HEADERS: &str = "X-CSRF-HEADER, X-CSRF-PARAM, X-CSRF-TOKEN";

/// A CSRF token and where a request must carry it.
///
/// Attached to requests as an extension by the CSRF protection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsrfToken {
    pub header_name: String,
    pub parameter_name: String,
    pub value: String,
}

/// `GET` handler publishing the request's CSRF token.
pub async fn token_handler(req: Request<Body>) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(EXPOSED_HEADERS),
    );

    let Some(token) = req.extensions().get::<CsrfToken>() else {
        return response;
    };

    let values = (
        HeaderValue::from_str(&token.header_name),
        HeaderValue::from_str(&token.parameter_name),
        HeaderValue::from_str(&token.value),
    );

    match values {
        (Ok(header_name), Ok(parameter_name), Ok(value)) => {
            headers.insert(RESPONSE_HEADER_HEADER, header_name);
            headers.insert(RESPONSE_HEADER_PARAM, parameter_name);
            headers.insert(RESPONSE_HEADER_TOKEN, value);
            response
        }
        _ => {
            tracing::error!(
                header_name = %token.header_name,
                parameter_name = %token.parameter_name,
                "CSRF token cannot be represented as response headers"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CsrfToken {
        CsrfToken {
            header_name: "X-CSRF-TOKEN".into(),
            parameter_name: "_csrf".into(),
            value: "abc123".into(),
        }
    }

    #[tokio::test]
    async fn test_publishes_attached_token() {
        let mut req = Request::builder()
            .uri("/csrf/token?url=http://svc/api")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(token());

        let response = token_handler(req).await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers[RESPONSE_HEADER_HEADER], "X-CSRF-TOKEN");
        assert_eq!(headers[RESPONSE_HEADER_PARAM], "_csrf");
        assert_eq!(headers[RESPONSE_HEADER_TOKEN], "abc123");
        assert_eq!(headers[header::ACCESS_CONTROL_EXPOSE_HEADERS], EXPOSED_HEADERS);
    }

    #[tokio::test]
    async fn test_no_token_means_disabled() {
        let req = Request::builder().uri("/csrf/token").body(Body::empty()).unwrap();

        let response = token_handler(req).await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(RESPONSE_HEADER_TOKEN).is_none());
    }
}
