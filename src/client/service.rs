//! Token endpoint client.

use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode};
use url::Url;

use crate::client::error::ClientError;
use crate::client::transport::{OutboundRequest, Transport};
use crate::token::{
    CsrfToken, QUERY_PARAM_URL, RESPONSE_HEADER_HEADER, RESPONSE_HEADER_PARAM,
    RESPONSE_HEADER_TOKEN,
};

/// Talks to the CSRF token endpoint.
#[derive(Debug, Clone)]
pub struct TokenServiceClient<T> {
    service_url: Url,
    transport: T,
}

impl<T: Transport> TokenServiceClient<T> {
    pub fn new(service_url: Url, transport: T) -> Self {
        Self {
            service_url,
            transport,
        }
    }

    pub fn service_url(&self) -> &Url {
        &self.service_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The token fetch for `protected`, carrying over the caller's
    /// properties and headers. Body headers are dropped with the body.
    pub fn token_request(&self, protected: &OutboundRequest) -> OutboundRequest {
        let mut url = self.service_url.clone();
        url.query_pairs_mut()
            .append_pair(QUERY_PARAM_URL, protected.url.as_str());

        let mut headers = protected.headers.clone();
        headers.remove(header::CONTENT_TYPE);
        headers.remove(header::CONTENT_LENGTH);

        OutboundRequest {
            method: Method::GET,
            url,
            headers,
            properties: protected.properties.clone(),
            body: Default::default(),
        }
    }

    /// Fetch the token for a protected URL.
    ///
    /// Accepts `204` and the legacy `200`. Any other status, or a response
    /// without a token value, yields `None`: no token is required.
    pub async fn get_token(&self, protected_url: &Url) -> Result<Option<CsrfToken>, ClientError> {
        let request = self.token_request(&OutboundRequest::get(protected_url.clone()));
        let response = self.transport.send(request).await?;

        if response.status != StatusCode::NO_CONTENT && response.status != StatusCode::OK {
            tracing::debug!(status = %response.status, "Token endpoint refused the request");
            return Ok(None);
        }

        Ok(parse_token(&response.headers))
    }
}

/// Read the token protocol headers. Missing or empty value means no token.
pub fn parse_token(headers: &HeaderMap) -> Option<CsrfToken> {
    let get = |name: &HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let value = get(&RESPONSE_HEADER_TOKEN).filter(|v| !v.is_empty())?;

    Some(CsrfToken {
        header_name: get(&RESPONSE_HEADER_HEADER).unwrap_or_default(),
        parameter_name: get(&RESPONSE_HEADER_PARAM).unwrap_or_default(),
        value,
    })
}
