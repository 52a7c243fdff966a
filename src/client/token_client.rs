//! Token acquisition automaton.
//!
//! ```text
//! NoToken ──fetch 204──▶ HaveToken ──403 with token──▶ NoToken (once per call)
//!    │
//!    └──fetch not 204──▶ failed fetch response returned to the caller
//! ```

use axum::http::{HeaderName, HeaderValue, StatusCode};
use url::Url;

use crate::client::error::ClientError;
use crate::client::service::{parse_token, TokenServiceClient};
use crate::client::transport::{InboundResponse, OutboundRequest, Transport};
use crate::token::CsrfToken;

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenState {
    NoToken,
    /// `None` when the server requires no token.
    HaveToken(Option<CsrfToken>),
}

enum Fetched {
    Token(Option<CsrfToken>),
    Failed(InboundResponse),
}

/// Attaches a cached CSRF token to outbound requests.
pub struct CsrfTokenClient<T> {
    service: TokenServiceClient<T>,
    state: TokenState,
}

impl<T: Transport> CsrfTokenClient<T> {
    pub fn new(token_service: Url, transport: T) -> Self {
        Self {
            service: TokenServiceClient::new(token_service, transport),
            state: TokenState::NoToken,
        }
    }

    /// The cached token, if one is held.
    pub fn token(&self) -> Option<&CsrfToken> {
        match &self.state {
            TokenState::HaveToken(token) => token.as_ref(),
            TokenState::NoToken => None,
        }
    }

    pub fn has_token(&self) -> bool {
        matches!(self.state, TokenState::HaveToken(_))
    }

    /// Forget the cached token; the next call fetches a new one.
    pub fn clear(&mut self) {
        self.state = TokenState::NoToken;
    }

    pub fn service(&self) -> &TokenServiceClient<T> {
        &self.service
    }

    /// Send `request` with the CSRF token attached.
    ///
    /// A failed token fetch is returned as the response. A `403` on a
    /// token-carrying request refreshes the token and retries exactly once.
    pub async fn execute(&mut self, request: &OutboundRequest) -> Result<InboundResponse, ClientError> {
        let mut refreshed = false;

        loop {
            let cached = match &self.state {
                TokenState::HaveToken(token) => Some(token.clone()),
                TokenState::NoToken => None,
            };

            let token = match cached {
                Some(token) => token,
                None => match self.fetch(request).await? {
                    Fetched::Token(token) => {
                        self.state = TokenState::HaveToken(token.clone());
                        token
                    }
                    Fetched::Failed(response) => return Ok(response),
                },
            };

            let outbound = with_token(request, token.as_ref())?;
            let response = self.service.transport().send(outbound).await?;

            if response.status == StatusCode::FORBIDDEN && token.is_some() && !refreshed {
                tracing::debug!(url = %request.url, "CSRF token rejected, refreshing");
                self.state = TokenState::NoToken;
                refreshed = true;
                continue;
            }

            return Ok(response);
        }
    }

    async fn fetch(&self, request: &OutboundRequest) -> Result<Fetched, ClientError> {
        let response = self
            .service
            .transport()
            .send(self.service.token_request(request))
            .await?;

        if response.status != StatusCode::NO_CONTENT {
            tracing::warn!(
                status = %response.status,
                url = %request.url,
                "CSRF token fetch failed"
            );
            return Ok(Fetched::Failed(response));
        }

        Ok(Fetched::Token(parse_token(&response.headers)))
    }
}

/// Copy of `request` carrying `token` in its header.
fn with_token(request: &OutboundRequest, token: Option<&CsrfToken>) -> Result<OutboundRequest, ClientError> {
    let mut outbound = request.clone();
    let Some(token) = token else {
        return Ok(outbound);
    };

    let invalid = |reason: String| ClientError::InvalidHeader {
        name: token.header_name.clone(),
        reason,
    };
    let name = HeaderName::try_from(token.header_name.as_str()).map_err(|e| invalid(e.to_string()))?;
    let value = HeaderValue::from_str(&token.value).map_err(|e| invalid(e.to_string()))?;

    outbound.headers.insert(name, value);
    Ok(outbound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_token_leaves_original_untouched() {
        let request = OutboundRequest::get(Url::parse("http://svc/api").unwrap());
        let token = CsrfToken {
            header_name: "X-CSRF-TOKEN".into(),
            parameter_name: "_csrf".into(),
            value: "t".into(),
        };

        let outbound = with_token(&request, Some(&token)).unwrap();
        assert_eq!(outbound.headers["x-csrf-token"], "t");
        assert!(request.headers.is_empty());
    }

    #[test]
    fn test_with_token_rejects_bad_header_name() {
        let request = OutboundRequest::get(Url::parse("http://svc/api").unwrap());
        let token = CsrfToken {
            header_name: "bad header".into(),
            parameter_name: String::new(),
            value: "t".into(),
        };
        assert!(matches!(
            with_token(&request, Some(&token)),
            Err(ClientError::InvalidHeader { .. })
        ));
    }
}
