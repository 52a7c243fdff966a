//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check names that end up in HTTP headers and cookies
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PolicyGateConfig → Result<(), Vec<ValidationError>>
//! - Policy fragments are not validated here; a bad matcher degrades its
//!   policy to disabled when applied instead of rejecting the whole file

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::PolicyGateConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    #[error("request timeout must be greater than zero")]
    ZeroTimeout,

    #[error("token path {0:?} must start with '/'")]
    InvalidTokenPath(String),

    #[error("invalid CSRF header name {0:?}")]
    InvalidHeaderName(String),

    #[error("CSRF parameter name must not be empty")]
    EmptyParameterName,

    #[error("invalid session cookie name {0:?}")]
    InvalidCookieName(String),

    #[error("invalid metrics address {0:?}")]
    InvalidMetricsAddress(String),
}

pub fn validate_config(config: &PolicyGateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    let csrf = &config.csrf;
    if !csrf.token_path.starts_with('/') {
        errors.push(ValidationError::InvalidTokenPath(csrf.token_path.clone()));
    }
    if HeaderName::from_bytes(csrf.header_name.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidHeaderName(csrf.header_name.clone()));
    }
    if csrf.parameter_name.trim().is_empty() {
        errors.push(ValidationError::EmptyParameterName);
    }
    if !is_cookie_name(&csrf.cookie_name) {
        errors.push(ValidationError::InvalidCookieName(csrf.cookie_name.clone()));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b))
}
