//! Declarative policy fragments → runtime fragments.
//!
//! # Responsibilities
//! - Build request matchers from `{ type, pattern, methods, insensitive }`
//! - Convert `[[cors_fragments]]` / `[[csrf_fragments]]` entries
//!
//! # Design Decisions
//! - Matcher errors name the fragment they came from
//! - A fragment without a matcher matches every request

use std::collections::BTreeSet;

use crate::config::loader::ConfigError;
use crate::config::schema::{CorsFragmentConfig, CsrfFragmentConfig, MatcherConfig, PolicyGateConfig};
use crate::matcher::{MatcherError, PatternMatcher, RequestMatcher};
use crate::policy::{CorsSettings, CsrfFragment, PolicyFragment};

const REGEX_TYPE: &str = "regex";

/// Build a request matcher from its declaration.
pub fn build_matcher(config: &MatcherConfig) -> Result<RequestMatcher, MatcherError> {
    let kind = config.kind.trim();
    if !kind.is_empty() && kind != REGEX_TYPE {
        return Err(MatcherError::UnknownType(kind.to_string()));
    }

    let methods = config.methods.as_deref().map(split_methods);
    let pattern = PatternMatcher::build(config.pattern.trim(), methods, config.insensitive)?;
    Ok(pattern.into())
}

/// Split a method list on commas and/or whitespace.
fn split_methods(methods: &str) -> Vec<&str> {
    methods
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|m| !m.is_empty())
        .collect()
}

fn fragment_matcher(
    label: impl FnOnce() -> String,
    matcher: Option<&MatcherConfig>,
) -> Result<RequestMatcher, ConfigError> {
    match matcher {
        None => Ok(RequestMatcher::All),
        Some(matcher) => build_matcher(matcher).map_err(|source| ConfigError::Matcher {
            fragment: label(),
            source,
        }),
    }
}

fn label(kind: &str, index: usize, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{} {:?}", kind, name),
        None => format!("{} #{}", kind, index),
    }
}

fn to_set(values: &Option<Vec<String>>) -> Option<BTreeSet<String>> {
    values.as_ref().map(|v| v.iter().cloned().collect())
}

pub fn cors_fragment(index: usize, config: &CorsFragmentConfig) -> Result<PolicyFragment, ConfigError> {
    let matcher = fragment_matcher(
        || label("cors_fragments", index, config.name.as_deref()),
        config.matcher.as_ref(),
    )?;

    Ok(PolicyFragment {
        name: config.name.clone(),
        parent_name: config.parent.clone(),
        matcher,
        enabled: config.enabled,
        is_abstract: config.is_abstract,
        settings: CorsSettings {
            allowed_origins: to_set(&config.allowed_origins),
            allowed_methods: to_set(&config.allowed_methods),
            allowed_headers: to_set(&config.allowed_headers),
            exposed_headers: to_set(&config.exposed_headers),
            allow_credentials: config.allow_credentials,
            max_age: config.max_age,
        },
    })
}

pub fn csrf_fragment(index: usize, config: &CsrfFragmentConfig) -> Result<CsrfFragment, ConfigError> {
    let matcher = fragment_matcher(
        || label("csrf_fragments", index, config.name.as_deref()),
        config.matcher.as_ref(),
    )?;

    Ok(CsrfFragment {
        name: config.name.clone(),
        matcher,
    })
}

/// All declared CORS fragments, failing on the first bad matcher.
pub fn cors_fragments(config: &PolicyGateConfig) -> Result<Vec<PolicyFragment>, ConfigError> {
    config
        .cors_fragments
        .iter()
        .enumerate()
        .map(|(i, f)| cors_fragment(i, f))
        .collect()
}

/// All declared CSRF fragments; `None` when the list is absent.
pub fn csrf_fragments(config: &PolicyGateConfig) -> Result<Option<Vec<CsrfFragment>>, ConfigError> {
    config
        .csrf_fragments
        .as_ref()
        .map(|fragments| {
            fragments
                .iter()
                .enumerate()
                .map(|(i, f)| csrf_fragment(i, f))
                .collect()
        })
        .transpose()
}
