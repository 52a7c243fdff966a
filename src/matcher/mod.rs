//! Request matching subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, query)
//!     → RequestMatcher::matches
//!         All      → true
//!         None     → false
//!         Pattern  → pattern.rs (method set + anchored regex over path?query)
//!         AnyOf    → first child that matches
//! ```
//!
//! # Design Decisions
//! - Closed set of variants, so policy resolution stays exhaustive
//! - Matchers are immutable values, shared freely between threads
//! - Equality is structural, so a matcher rebuilt from the same source
//!   compares equal to the one already held by a live configuration

pub mod pattern;

use axum::http::Request;

pub use pattern::{MatcherError, PatternMatcher};

/// A predicate over an inbound HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum RequestMatcher {
    /// Matches every request.
    All,
    /// Matches no request.
    #[default]
    None,
    /// Matches by HTTP method and a regular expression over `path[?query]`.
    Pattern(PatternMatcher),
    /// Matches when any member matches. Build it with [`RequestMatcher::any_of`].
    AnyOf(Vec<RequestMatcher>),
}

impl RequestMatcher {
    /// Returns true if the request matches this matcher.
    pub fn matches<B>(&self, req: &Request<B>) -> bool {
        match self {
            RequestMatcher::All => true,
            RequestMatcher::None => false,
            RequestMatcher::Pattern(pattern) => pattern.matches(req),
            RequestMatcher::AnyOf(members) => members.iter().any(|m| m.matches(req)),
        }
    }

    /// Combines matchers with OR semantics.
    ///
    /// Collapses to `All` as soon as any member is `All`, drops `None` members,
    /// collapses to `None` when nothing is left and returns a lone survivor
    /// unwrapped. Nested `AnyOf` members are flattened into the result.
    pub fn any_of<I>(matchers: I) -> Self
    where
        I: IntoIterator<Item = RequestMatcher>,
    {
        let mut filtered = Vec::new();

        for matcher in matchers {
            match matcher {
                RequestMatcher::All => return RequestMatcher::All,
                RequestMatcher::None => {}
                RequestMatcher::AnyOf(members) => filtered.extend(members),
                other => filtered.push(other),
            }
        }

        match filtered.len() {
            0 => RequestMatcher::None,
            1 => filtered.remove(0),
            _ => RequestMatcher::AnyOf(filtered),
        }
    }

    /// Shorthand for a case-sensitive pattern matcher accepting every method.
    pub fn pattern(pattern: &str) -> Result<Self, MatcherError> {
        Ok(RequestMatcher::Pattern(PatternMatcher::new(pattern)?))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, RequestMatcher::None)
    }
}

impl From<PatternMatcher> for RequestMatcher {
    fn from(pattern: PatternMatcher) -> Self {
        RequestMatcher::Pattern(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use proptest::prelude::*;

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_all_and_none() {
        let req = request("GET", "/anything");
        assert!(RequestMatcher::All.matches(&req));
        assert!(!RequestMatcher::None.matches(&req));
    }

    #[test]
    fn test_any_of_empty_is_none() {
        assert_eq!(RequestMatcher::any_of(Vec::new()), RequestMatcher::None);
    }

    #[test]
    fn test_any_of_single_is_unwrapped() {
        let a = RequestMatcher::pattern("/a").unwrap();
        let combined = RequestMatcher::any_of(vec![RequestMatcher::None, a.clone()]);
        assert_eq!(combined, a);
    }

    #[test]
    fn test_any_of_matches_any_member() {
        let combined = RequestMatcher::any_of(vec![
            RequestMatcher::pattern("/a").unwrap(),
            RequestMatcher::pattern("/b").unwrap(),
        ]);
        assert!(matches!(combined, RequestMatcher::AnyOf(ref m) if m.len() == 2));

        assert!(combined.matches(&request("GET", "/a")));
        assert!(combined.matches(&request("GET", "/b")));
        assert!(!combined.matches(&request("GET", "/c")));
    }

    #[test]
    fn test_any_of_flattens_nested() {
        let inner = RequestMatcher::any_of(vec![
            RequestMatcher::pattern("/a").unwrap(),
            RequestMatcher::pattern("/b").unwrap(),
        ]);
        let outer = RequestMatcher::any_of(vec![inner, RequestMatcher::pattern("/c").unwrap()]);
        match outer {
            RequestMatcher::AnyOf(members) => {
                assert_eq!(members.len(), 3);
                assert!(members.iter().all(|m| matches!(m, RequestMatcher::Pattern(_))));
            }
            other => panic!("expected AnyOf, got {:?}", other),
        }
    }

    fn leaf() -> impl Strategy<Value = RequestMatcher> {
        prop_oneof![
            Just(RequestMatcher::All),
            Just(RequestMatcher::None),
            "[a-z]{1,6}".prop_map(|p| RequestMatcher::pattern(&format!("/{}", p)).unwrap()),
        ]
    }

    proptest! {
        #[test]
        fn any_of_with_all_is_all(mut members in prop::collection::vec(leaf(), 0..8), at in 0usize..8) {
            let at = at.min(members.len());
            members.insert(at, RequestMatcher::All);
            prop_assert_eq!(RequestMatcher::any_of(members), RequestMatcher::All);
        }

        #[test]
        fn any_of_only_none_is_none(count in 0usize..8) {
            let members = vec![RequestMatcher::None; count];
            prop_assert_eq!(RequestMatcher::any_of(members), RequestMatcher::None);
        }

        #[test]
        fn any_of_never_keeps_none(members in prop::collection::vec(leaf(), 0..8)) {
            if let RequestMatcher::AnyOf(kept) = RequestMatcher::any_of(members) {
                prop_assert!(kept.len() >= 2);
                prop_assert!(kept.iter().all(|m| !m.is_none() && *m != RequestMatcher::All));
            }
        }
    }
}
