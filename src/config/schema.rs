//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate
//! server. All types derive Serde traits for deserialization from config
//! files; policy fragments are declared as `[[cors_fragments]]` and
//! `[[csrf_fragments]]` tables.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct PolicyGateConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// CSRF gate and token endpoint settings.
    pub csrf: CsrfConfig,

    /// CORS gate settings.
    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// CORS policy tree fragments, in declaration order.
    pub cors_fragments: Vec<CorsFragmentConfig>,

    /// CSRF-protected request sets. Absent means every request is protected.
    pub csrf_fragments: Option<Vec<CsrfFragmentConfig>>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// CSRF settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CsrfConfig {
    /// Global switch for the CSRF gate.
    pub enabled: bool,

    /// Path of the token endpoint.
    pub token_path: String,

    /// Request header carrying the token.
    pub header_name: String,

    /// Request parameter carrying the token (fallback).
    pub parameter_name: String,

    /// Session cookie name.
    pub cookie_name: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_path: crate::token::DEFAULT_TOKEN_PATH.to_string(),
            header_name: "X-CSRF-TOKEN".to_string(),
            parameter_name: "_csrf".to_string(),
            cookie_name: "GATESESSION".to_string(),
        }
    }
}

/// CORS settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CorsConfig {
    /// Global switch for the CORS gate.
    pub enabled: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Request matcher declaration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MatcherConfig {
    /// Matcher type. Only `"regex"` is supported.
    #[serde(rename = "type", default = "default_matcher_type")]
    pub kind: String,

    /// Regular expression over `path[?query]`.
    #[serde(default)]
    pub pattern: String,

    /// HTTP methods separated by commas and/or whitespace. Empty accepts all.
    #[serde(default)]
    pub methods: Option<String>,

    /// Case-insensitive matching.
    #[serde(default)]
    pub insensitive: bool,
}

fn default_matcher_type() -> String {
    "regex".to_string()
}

/// One `[[cors_fragments]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CorsFragmentConfig {
    pub name: Option<String>,

    /// Parent fragment name. Defaults to `"root"`.
    pub parent: Option<String>,

    /// Matched requests. Absent matches every request.
    pub matcher: Option<MatcherConfig>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,

    pub allowed_origins: Option<Vec<String>>,
    pub allowed_methods: Option<Vec<String>>,
    pub allowed_headers: Option<Vec<String>>,
    pub exposed_headers: Option<Vec<String>>,
    pub allow_credentials: Option<bool>,
    pub max_age: Option<u64>,
}

/// One `[[csrf_fragments]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CsrfFragmentConfig {
    pub name: Option<String>,

    /// Matched requests. Absent matches every request.
    pub matcher: Option<MatcherConfig>,
}

fn default_true() -> bool {
    true
}
