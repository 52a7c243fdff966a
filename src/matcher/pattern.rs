//! Regular expression request matcher.
//!
//! # Responsibilities
//! - Match the request URL (`path`, plus `?query` when present)
//! - Optionally restrict to a set of HTTP methods
//!
//! # Design Decisions
//! - The pattern must match the whole URL, not a substring
//! - Case-sensitive unless built with `case_insensitive`
//! - Unknown method names are rejected at construction, never ignored

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use axum::http::{Method, Request};
use regex::{Regex, RegexBuilder};
use thiserror::Error;

/// Method names a pattern matcher accepts.
const KNOWN_METHODS: [Method; 8] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
    Method::TRACE,
];

/// Errors raised while building a matcher.
#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("the request matcher pattern is empty or unspecified")]
    EmptyPattern,

    #[error("invalid request matcher pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown request matcher type {0:?} (supported: \"regex\")")]
    UnknownType(String),

    #[error("unknown HTTP method {0:?}")]
    UnknownMethod(String),
}

/// Matches requests whose method is accepted and whose URL matches a regex.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    source: String,
    case_insensitive: bool,
    /// `None` accepts every method.
    methods: Option<BTreeSet<String>>,
    regex: Regex,
}

impl PatternMatcher {
    /// Create a case-sensitive matcher accepting every method.
    pub fn new(pattern: &str) -> Result<Self, MatcherError> {
        Self::build(pattern, None::<Vec<String>>, false)
    }

    /// Create a matcher.
    ///
    /// `methods` of `None` (or an empty collection) accepts every method.
    pub fn build<I, S>(
        pattern: &str,
        methods: Option<I>,
        case_insensitive: bool,
    ) -> Result<Self, MatcherError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if pattern.is_empty() {
            return Err(MatcherError::EmptyPattern);
        }

        let regex = RegexBuilder::new(&format!("^(?:{})$", pattern))
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|source| MatcherError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;

        let methods = match methods {
            Some(methods) => parse_methods(methods)?,
            None => None,
        };

        Ok(Self {
            source: pattern.to_string(),
            case_insensitive,
            methods,
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.source
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    pub fn methods(&self) -> Option<&BTreeSet<String>> {
        self.methods.as_ref()
    }

    pub fn matches<B>(&self, req: &Request<B>) -> bool {
        self.matches_method(req.method()) && self.matches_url(req)
    }

    fn matches_method(&self, method: &Method) -> bool {
        match &self.methods {
            Some(methods) => methods.contains(method.as_str()),
            None => true,
        }
    }

    fn matches_url<B>(&self, req: &Request<B>) -> bool {
        let uri = req.uri();
        match uri.query() {
            Some(query) => self.regex.is_match(&format!("{}?{}", uri.path(), query)),
            None => self.regex.is_match(uri.path()),
        }
    }
}

fn parse_methods<I, S>(methods: I) -> Result<Option<BTreeSet<String>>, MatcherError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parsed = BTreeSet::new();
    for method in methods {
        let method = method.as_ref().trim();
        if method.is_empty() {
            continue;
        }
        parsed.insert(parse_method(method)?);
    }

    Ok(if parsed.is_empty() { None } else { Some(parsed) })
}

/// Resolve a method name to its canonical form.
pub fn parse_method(name: &str) -> Result<String, MatcherError> {
    KNOWN_METHODS
        .iter()
        .find(|m| m.as_str() == name)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| MatcherError::UnknownMethod(name.to_string()))
}

impl PartialEq for PatternMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.case_insensitive == other.case_insensitive
            && self.methods == other.methods
    }
}

impl Eq for PatternMatcher {}

impl Hash for PatternMatcher {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.case_insensitive.hash(state);
        self.methods.hash(state);
    }
}
