//! CSRF policy aggregation.
//!
//! CSRF fragments carry no settings: each one only widens the set of
//! protected requests. They compile to a flat `{enabled, matcher}` snapshot.

use axum::http::Request;

use crate::matcher::RequestMatcher;
use crate::policy::aggregate::{Aggregate, AggregatedConfiguration};

/// A declared set of CSRF-protected requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CsrfFragment {
    pub name: Option<String>,
    pub matcher: RequestMatcher,
}

impl CsrfFragment {
    pub fn new(matcher: RequestMatcher) -> Self {
        Self { name: None, matcher }
    }

    pub fn named(name: impl Into<String>, matcher: RequestMatcher) -> Self {
        Self {
            name: Some(name.into()),
            matcher,
        }
    }
}

/// Compiled CSRF policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfPolicy {
    enabled: bool,
    matcher: RequestMatcher,
}

impl CsrfPolicy {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a request must carry a valid token.
    pub fn is_enabled_for<B>(&self, req: &Request<B>) -> bool {
        self.matcher.matches(req)
    }

    pub fn matcher(&self) -> &RequestMatcher {
        &self.matcher
    }
}

impl Aggregate for CsrfFragment {
    type Compiled = CsrfPolicy;

    const KIND: &'static str = "csrf";

    /// Disabled protects nothing; no source list at all protects everything.
    fn compile(fragments: Option<&[Self]>, enabled: bool) -> CsrfPolicy {
        let matcher = match (enabled, fragments) {
            (false, _) => RequestMatcher::None,
            (true, None) => RequestMatcher::All,
            (true, Some(fragments)) => {
                RequestMatcher::any_of(fragments.iter().map(|f| f.matcher.clone()))
            }
        };
        CsrfPolicy { enabled, matcher }
    }

    fn compiled_enabled(compiled: &CsrfPolicy) -> bool {
        compiled.enabled && !compiled.matcher.is_none()
    }

    fn key(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// The CSRF policy configuration.
pub type CsrfConfiguration = AggregatedConfiguration<CsrfFragment>;

impl AggregatedConfiguration<CsrfFragment> {
    pub fn is_enabled_for<B>(&self, req: &Request<B>) -> bool {
        self.snapshot().is_enabled_for(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn post_api() -> CsrfFragment {
        CsrfFragment::named(
            "api",
            crate::matcher::PatternMatcher::build("/api/.*", Some(["POST"]), false)
                .unwrap()
                .into(),
        )
    }

    #[test]
    fn test_no_source_protects_everything() {
        let config = CsrfConfiguration::new();
        assert!(config.is_enabled());
        assert_eq!(config.snapshot().matcher(), &RequestMatcher::All);
        assert!(config.is_enabled_for(&request("GET", "/anything")));
    }

    #[test]
    fn test_empty_source_protects_nothing() {
        let config = CsrfConfiguration::with_fragments(Some(Vec::new()), true);
        assert_eq!(config.snapshot().matcher(), &RequestMatcher::None);
    }

    #[test]
    fn test_fragments_are_or_combined() {
        let config = CsrfConfiguration::with_fragments(
            Some(vec![
                post_api(),
                CsrfFragment::new(RequestMatcher::pattern("/form").unwrap()),
            ]),
            true,
        );
        assert!(config.is_enabled_for(&request("POST", "/api/x")));
        assert!(!config.is_enabled_for(&request("GET", "/api/x")));
        assert!(config.is_enabled_for(&request("GET", "/form")));
        assert!(!config.is_enabled_for(&request("GET", "/other")));
    }

    #[test]
    fn test_disabled_protects_nothing() {
        let config = CsrfConfiguration::with_fragments(Some(vec![post_api()]), true);
        config.set_enabled(false);
        assert!(!config.snapshot().is_enabled());
        assert!(!config.is_enabled_for(&request("POST", "/api/x")));
    }

    #[test]
    fn test_removal_narrows_protection() {
        let config = CsrfConfiguration::with_fragments(Some(vec![post_api()]), true);
        config.fragment_will_be_removed(&post_api());
        assert_eq!(config.snapshot().matcher(), &RequestMatcher::None);
    }

    #[test]
    fn test_fragment_changed_keeps_missing_source() {
        let config = CsrfConfiguration::new();
        assert!(config.is_enabled_for(&request("GET", "/b")));

        config.fragment_changed(&CsrfFragment::new(RequestMatcher::pattern("/a").unwrap()));

        assert!(config.fragments().is_none());
        assert!(config.is_enabled_for(&request("GET", "/b")));
    }

    #[test]
    fn test_fragment_changed_updates_stored_fragment() {
        let config = CsrfConfiguration::with_fragments(Some(vec![post_api()]), true);

        config.fragment_changed(&CsrfFragment::named("api", RequestMatcher::pattern("/v2/.*").unwrap()));

        assert!(!config.is_enabled_for(&request("POST", "/api/x")));
        assert!(config.is_enabled_for(&request("GET", "/v2/x")));
        assert_eq!(config.fragments().unwrap().len(), 1);
    }

    #[test]
    fn test_add_fragment_narrows_missing_source() {
        let config = CsrfConfiguration::new();
        config.add_fragment(post_api());
        assert!(config.is_enabled_for(&request("POST", "/api/x")));
        assert!(!config.is_enabled_for(&request("GET", "/b")));
    }
}
