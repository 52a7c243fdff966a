//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::PolicyGateConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::matcher::MatcherError;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Invalid request matcher in fragment {fragment}: {source}")]
    Matcher {
        fragment: String,
        #[source]
        source: MatcherError,
    },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<PolicyGateConfig, ConfigError> {
    let config: PolicyGateConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<PolicyGateConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, PolicyGateConfig::default());
        assert!(config.csrf_fragments.is_none());
        assert!(config.cors_fragments.is_empty());
    }

    #[test]
    fn test_parses_fragments() {
        let config = parse_config(
            r#"
            [csrf]
            enabled = true
            header_name = "X-XSRF"

            [[cors_fragments]]
            name = "root"
            allowed_origins = ["http://app.example"]

            [[cors_fragments]]
            name = "api"
            abstract = true
            matcher = { pattern = "/api/.*", methods = "GET, POST" }

            [[csrf_fragments]]
            matcher = { type = "regex", pattern = "/api/.*", methods = "POST PUT", insensitive = true }
            "#,
        )
        .unwrap();

        assert_eq!(config.csrf.header_name, "X-XSRF");
        assert_eq!(config.csrf.parameter_name, "_csrf");
        assert_eq!(config.cors_fragments.len(), 2);
        assert!(config.cors_fragments[0].matcher.is_none());
        assert!(config.cors_fragments[1].is_abstract);
        assert!(config.cors_fragments[1].enabled);

        let matcher = config.cors_fragments[1].matcher.as_ref().unwrap();
        assert_eq!(matcher.kind, "regex");
        assert_eq!(matcher.methods.as_deref(), Some("GET, POST"));

        let csrf = config.csrf_fragments.unwrap();
        assert!(csrf[0].matcher.as_ref().unwrap().insensitive);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(parse_config("[listener"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validation_error() {
        let err = parse_config("[timeouts]\nrequest_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref e) if e.len() == 1));
        assert!(err.to_string().starts_with("Validation failed"));
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[listener]\nbind_address = \"127.0.0.1:9000\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/policy-gate.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
