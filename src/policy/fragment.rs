//! Policy fragment definitions.
//!
//! A fragment is one named, optionally parented, matcher-scoped unit of CORS
//! settings. Fragments are plain values: the compiler copies them, never
//! mutates them.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::matcher::RequestMatcher;

/// Name of the distinguished fragment every tree hangs from.
pub const ROOT_NAME: &str = "root";

/// CORS settings carried by a fragment.
///
/// Each field is optional. Unset set-valued fields inherit the parent's
/// effective set; set ones are unioned with it. Unset scalars inherit, set
/// scalars override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct CorsSettings {
    pub allowed_origins: Option<BTreeSet<String>>,
    pub allowed_methods: Option<BTreeSet<String>>,
    pub allowed_headers: Option<BTreeSet<String>>,
    pub exposed_headers: Option<BTreeSet<String>>,
    pub allow_credentials: Option<bool>,
    /// Pre-flight cache lifetime, in seconds.
    pub max_age: Option<u64>,
}

impl CorsSettings {
    /// Merge the parent's effective settings into these local ones.
    ///
    /// Only `self` is written; sets coming from `parent` are copied.
    pub fn inherit_from(&mut self, parent: &CorsSettings) {
        union_into(&mut self.allowed_origins, &parent.allowed_origins);
        union_into(&mut self.allowed_methods, &parent.allowed_methods);
        union_into(&mut self.allowed_headers, &parent.allowed_headers);
        union_into(&mut self.exposed_headers, &parent.exposed_headers);

        self.allow_credentials = self.allow_credentials.or(parent.allow_credentials);
        self.max_age = self.max_age.or(parent.max_age);
    }
}

fn union_into(local: &mut Option<BTreeSet<String>>, inherited: &Option<BTreeSet<String>>) {
    let Some(inherited) = inherited else {
        return;
    };

    match local {
        Some(local) => local.extend(inherited.iter().cloned()),
        None => *local = Some(inherited.clone()),
    }
}

/// A declared CORS policy fragment.
///
/// Equality is structural over every field, so a fragment rebuilt from the
/// same declaration can be found in, and removed from, a live list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyFragment {
    pub name: Option<String>,
    pub parent_name: Option<String>,
    pub matcher: RequestMatcher,
    pub enabled: bool,
    /// An abstract fragment only layers settings for its descendants.
    pub is_abstract: bool,
    pub settings: CorsSettings,
}

impl Default for PolicyFragment {
    /// An enabled, concrete fragment over an empty set of requests.
    fn default() -> Self {
        Self {
            name: None,
            parent_name: None,
            matcher: RequestMatcher::None,
            enabled: true,
            is_abstract: false,
            settings: CorsSettings::default(),
        }
    }
}

impl PolicyFragment {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// The root fragment, matching every request.
    pub fn root() -> Self {
        Self::named(ROOT_NAME).with_matcher(RequestMatcher::All)
    }

    /// A fragment value that matches nothing and is disabled.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_name = Some(parent.into());
        self
    }

    pub fn with_matcher(mut self, matcher: RequestMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    pub fn with_settings(mut self, settings: CorsSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_allowed_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.allowed_origins = Some(origins.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_allowed_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.allowed_methods = Some(methods.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_allowed_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.allowed_headers = Some(headers.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_exposed_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.exposed_headers = Some(headers.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_allow_credentials(mut self, allow: bool) -> Self {
        self.settings.allow_credentials = Some(allow);
        self
    }

    pub fn with_max_age(mut self, secs: u64) -> Self {
        self.settings.max_age = Some(secs);
        self
    }

    pub fn is_root(&self) -> bool {
        self.name.as_deref() == Some(ROOT_NAME)
    }

    /// The parent this fragment hangs from once compiled.
    ///
    /// The root never has a parent; any other fragment defaults to the root.
    pub fn effective_parent_name(&self) -> Option<&str> {
        if self.is_root() {
            None
        } else {
            Some(self.parent_name.as_deref().unwrap_or(ROOT_NAME))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> Option<BTreeSet<String>> {
        Some(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_parent_name_defaults() {
        assert_eq!(PolicyFragment::named("a").effective_parent_name(), Some(ROOT_NAME));
        assert_eq!(PolicyFragment::default().effective_parent_name(), Some(ROOT_NAME));
        assert_eq!(
            PolicyFragment::named("a").with_parent("b").effective_parent_name(),
            Some("b")
        );
    }

    #[test]
    fn test_root_parent_is_cleared() {
        let root = PolicyFragment::root().with_parent("elsewhere");
        assert_eq!(root.effective_parent_name(), None);
    }

    #[test]
    fn test_sets_are_unioned() {
        let parent = CorsSettings {
            allowed_origins: set(&["o1"]),
            allowed_headers: set(&["h1"]),
            ..Default::default()
        };
        let mut child = CorsSettings {
            allowed_origins: set(&["o2"]),
            ..Default::default()
        };

        child.inherit_from(&parent);

        assert_eq!(child.allowed_origins, set(&["o1", "o2"]));
        assert_eq!(child.allowed_headers, set(&["h1"]));
        assert_eq!(child.exposed_headers, None);
        assert_eq!(parent.allowed_origins, set(&["o1"]));
    }

    #[test]
    fn test_scalars_prefer_local() {
        let parent = CorsSettings {
            allow_credentials: Some(true),
            max_age: Some(60),
            ..Default::default()
        };
        let mut child = CorsSettings {
            max_age: Some(10),
            ..Default::default()
        };

        child.inherit_from(&parent);

        assert_eq!(child.allow_credentials, Some(true));
        assert_eq!(child.max_age, Some(10));
    }

    #[test]
    fn test_structural_equality() {
        let a = PolicyFragment::named("a")
            .with_matcher(RequestMatcher::pattern("/a").unwrap())
            .with_allowed_origins(["o1"]);
        let b = PolicyFragment::named("a")
            .with_matcher(RequestMatcher::pattern("/a").unwrap())
            .with_allowed_origins(["o1"]);
        assert_eq!(a, b);
        assert_ne!(a, b.with_max_age(1));
    }
}
