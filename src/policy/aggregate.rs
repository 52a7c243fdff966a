//! Aggregated, hot-swappable policy configuration.
//!
//! # Data Flow
//! ```text
//! replace / apply / fragment_changed / add_fragment / fragment_will_be_removed / set_enabled
//!     → lock source state (one writer at a time)
//!     → compile a brand-new snapshot off to the side
//!     → ArcSwap::store (single atomic publish)
//!     → unlock, notify change listeners (gate filters)
//!
//! snapshot / effective_for / is_enabled_for
//!     → ArcSwap::load (lock-free, never blocked by writers)
//! ```
//!
//! # Design Decisions
//! - Generic over the fragment kind; CORS and CSRF share the whole surface
//! - The stored source list is a defensive copy; callers keep their values
//! - Listeners run after the lock is released, so a listener may read the
//!   configuration it was notified about
//! - A listener that reports it is finished is removed on the spot

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use axum::http::Request;

use crate::observability::metrics;
use crate::policy::compiler;
use crate::policy::fragment::PolicyFragment;
use crate::policy::tree::{CompiledNode, CompiledTree};

/// Callback invoked after every recompilation. Returns `false` to unsubscribe.
pub type ChangeListener = Arc<dyn Fn() -> bool + Send + Sync>;

/// A fragment kind that can be aggregated into a compiled snapshot.
pub trait Aggregate: Clone + PartialEq + Send + Sync + 'static {
    /// The immutable snapshot readers observe.
    type Compiled: Send + Sync + 'static;

    /// Label used in logs and metrics.
    const KIND: &'static str;

    /// Compile a source list. Never fails.
    fn compile(fragments: Option<&[Self]>, enabled: bool) -> Self::Compiled;

    fn compiled_enabled(compiled: &Self::Compiled) -> bool;

    /// Identity used by [`AggregatedConfiguration::fragment_changed`].
    fn key(&self) -> Option<&str>;
}

impl Aggregate for PolicyFragment {
    type Compiled = CompiledTree;

    const KIND: &'static str = "cors";

    fn compile(fragments: Option<&[Self]>, enabled: bool) -> CompiledTree {
        if !enabled {
            return CompiledTree::disabled();
        }
        compiler::compile(fragments)
    }

    fn compiled_enabled(compiled: &CompiledTree) -> bool {
        compiled.is_enabled()
    }

    fn key(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

struct SourceState<F> {
    fragments: Option<Vec<F>>,
    enabled: bool,
}

/// The live, queryable configuration for one fragment kind.
pub struct AggregatedConfiguration<F: Aggregate> {
    compiled: ArcSwap<F::Compiled>,
    state: Mutex<SourceState<F>>,
    listeners: Mutex<Vec<ChangeListener>>,
}

/// The CORS policy tree configuration.
pub type CorsConfiguration = AggregatedConfiguration<PolicyFragment>;

impl<F: Aggregate> AggregatedConfiguration<F> {
    /// An enabled configuration with no source list.
    pub fn new() -> Self {
        Self::with_fragments(None, true)
    }

    pub fn with_fragments(fragments: Option<Vec<F>>, enabled: bool) -> Self {
        let compiled = F::compile(fragments.as_deref(), enabled);
        Self {
            compiled: ArcSwap::from_pointee(compiled),
            state: Mutex::new(SourceState { fragments, enabled }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<F::Compiled> {
        self.compiled.load_full()
    }

    /// Global enabled flag.
    pub fn is_enabled(&self) -> bool {
        self.lock_state().enabled
    }

    /// Copy of the stored source list.
    pub fn fragments(&self) -> Option<Vec<F>> {
        self.lock_state().fragments.clone()
    }

    /// Store a new source list and recompile.
    pub fn replace(&self, fragments: Option<Vec<F>>) {
        {
            let mut state = self.lock_state();
            state.fragments = fragments;
            self.publish(&state);
        }
        self.notify();
    }

    /// Store a new source list and global flag together.
    ///
    /// Readers and listeners only ever observe the pair as a whole: one
    /// compilation, one publish, one notification.
    pub fn apply(&self, fragments: Option<Vec<F>>, enabled: bool) {
        {
            let mut state = self.lock_state();
            state.fragments = fragments;
            state.enabled = enabled;
            self.publish(&state);
        }
        self.notify();
    }

    /// Recompile after one stored fragment's declaration changed.
    ///
    /// The stored entry with the same name (or, for an unnamed fragment, an
    /// equal one) takes the new value. Fragments that are not stored are not
    /// added; use [`add_fragment`](Self::add_fragment) for that. A missing
    /// source list stays missing.
    pub fn fragment_changed(&self, fragment: &F) {
        {
            let mut state = self.lock_state();
            if let Some(fragments) = state.fragments.as_mut() {
                let position = match fragment.key() {
                    Some(key) => fragments.iter().position(|f| f.key() == Some(key)),
                    None => fragments.iter().position(|f| f == fragment),
                };
                if let Some(i) = position {
                    fragments[i] = fragment.clone();
                }
            }
            self.publish(&state);
        }
        self.notify();
    }

    /// Append a fragment to the stored list and recompile.
    ///
    /// A missing source list becomes a list of just this fragment, which
    /// narrows a CSRF policy from every request to the fragment's requests.
    pub fn add_fragment(&self, fragment: F) {
        {
            let mut state = self.lock_state();
            state.fragments.get_or_insert_with(Vec::new).push(fragment);
            self.publish(&state);
        }
        self.notify();
    }

    /// Drop one structurally equal fragment from the stored list, then
    /// recompile. The recompile happens even when nothing was removed.
    pub fn fragment_will_be_removed(&self, fragment: &F) {
        {
            let mut state = self.lock_state();
            if let Some(fragments) = state.fragments.as_mut() {
                if let Some(i) = fragments.iter().position(|f| f == fragment) {
                    fragments.remove(i);
                }
            }
            self.publish(&state);
        }
        self.notify();
    }

    /// Flip the global flag. Recompiles only when the value changes.
    pub fn set_enabled(&self, enabled: bool) {
        {
            let mut state = self.lock_state();
            if state.enabled == enabled {
                return;
            }
            state.enabled = enabled;
            self.publish(&state);
        }
        self.notify();
    }

    /// Register a callback run after every recompilation.
    ///
    /// The callback is dropped the first time it returns `false`.
    pub fn add_listener(&self, listener: ChangeListener) {
        self.lock_listeners().push(listener);
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.lock_listeners().len()
    }

    fn lock_state(&self) -> MutexGuard<'_, SourceState<F>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Compile and publish. Caller holds the state lock.
    fn publish(&self, state: &SourceState<F>) {
        let compiled = F::compile(state.fragments.as_deref(), state.enabled);
        let enabled = F::compiled_enabled(&compiled);
        self.compiled.store(Arc::new(compiled));

        metrics::record_compilation(F::KIND, enabled);
        tracing::debug!(
            kind = F::KIND,
            fragments = state.fragments.as_ref().map(Vec::len),
            enabled,
            "Policy recompiled"
        );
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<ChangeListener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        let listeners = self.lock_listeners().clone();
        let finished: Vec<ChangeListener> = listeners
            .into_iter()
            .filter(|listener| !listener())
            .collect();

        if !finished.is_empty() {
            self.lock_listeners()
                .retain(|l| !finished.iter().any(|f| Arc::ptr_eq(l, f)));
        }
    }
}

impl<F: Aggregate> Default for AggregatedConfiguration<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregatedConfiguration<PolicyFragment> {
    /// The node whose effective settings apply to a request.
    pub fn effective_for<B>(&self, req: &Request<B>) -> Option<CompiledNode> {
        self.compiled.load().resolve(req).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::RequestMatcher;
    use axum::body::Body;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn fragments() -> Vec<PolicyFragment> {
        vec![
            PolicyFragment::root().with_allowed_origins(["o1"]),
            PolicyFragment::named("a")
                .with_matcher(RequestMatcher::pattern("/a").unwrap())
                .with_allowed_origins(["o2"]),
        ]
    }

    #[test]
    fn test_new_is_disabled_tree() {
        let config = CorsConfiguration::new();
        assert!(config.is_enabled());
        assert!(!config.snapshot().is_enabled());
        assert!(config.effective_for(&request("/a")).is_none());
    }

    #[test]
    fn test_replace_publishes_new_tree() {
        let config = CorsConfiguration::new();
        let before = config.snapshot();

        config.replace(Some(fragments()));

        assert!(!before.is_enabled());
        assert_eq!(config.effective_for(&request("/a")).unwrap().name(), Some("a"));
        assert_eq!(config.effective_for(&request("/b")).unwrap().name(), Some("root"));
    }

    #[test]
    fn test_fragment_changed_replaces_by_name() {
        let config = CorsConfiguration::with_fragments(Some(fragments()), true);

        let changed = PolicyFragment::named("a")
            .with_matcher(RequestMatcher::pattern("/changed").unwrap());
        config.fragment_changed(&changed);

        assert_eq!(config.fragments().unwrap().len(), 2);
        assert_eq!(config.effective_for(&request("/a")).unwrap().name(), Some("root"));
        assert_eq!(config.effective_for(&request("/changed")).unwrap().name(), Some("a"));
    }

    #[test]
    fn test_fragment_changed_ignores_unknown() {
        let config = CorsConfiguration::with_fragments(Some(fragments()), true);
        config.fragment_changed(
            &PolicyFragment::named("b").with_matcher(RequestMatcher::pattern("/b").unwrap()),
        );
        assert_eq!(config.fragments().unwrap().len(), 2);
        assert_eq!(config.effective_for(&request("/b")).unwrap().name(), Some("root"));
    }

    #[test]
    fn test_add_fragment_appends() {
        let config = CorsConfiguration::with_fragments(Some(fragments()), true);
        config.add_fragment(
            PolicyFragment::named("b").with_matcher(RequestMatcher::pattern("/b").unwrap()),
        );
        assert_eq!(config.fragments().unwrap().len(), 3);
        assert_eq!(config.effective_for(&request("/b")).unwrap().name(), Some("b"));
    }

    #[test]
    fn test_fragment_will_be_removed_is_structural() {
        let config = CorsConfiguration::with_fragments(Some(fragments()), true);

        // A separately built, equal value.
        let removed = fragments().remove(1);
        config.fragment_will_be_removed(&removed);

        assert_eq!(config.fragments().unwrap().len(), 1);
        assert_eq!(config.effective_for(&request("/a")).unwrap().name(), Some("root"));
    }

    #[test]
    fn test_removing_unknown_keeps_list_and_recompiles() {
        let config = CorsConfiguration::with_fragments(Some(fragments()), true);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        config.add_listener(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        }));
        let before = config.snapshot();

        config.fragment_will_be_removed(&PolicyFragment::named("ghost"));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(config.fragments().unwrap().len(), 2);
        assert!(!Arc::ptr_eq(&before, &config.snapshot()));
    }

    #[test]
    fn test_global_disable() {
        let config = CorsConfiguration::with_fragments(Some(fragments()), true);
        config.set_enabled(false);
        assert!(!config.snapshot().is_enabled());
        assert!(config.effective_for(&request("/a")).is_none());

        config.set_enabled(true);
        assert!(config.snapshot().is_enabled());
    }

    #[test]
    fn test_listeners_notified_once_per_change() {
        let config = CorsConfiguration::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        config.add_listener(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        }));

        config.replace(Some(fragments()));
        config.set_enabled(true);
        config.set_enabled(false);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_can_read_configuration() {
        let config = Arc::new(CorsConfiguration::new());
        let seen = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&config);
        let out = seen.clone();
        config.add_listener(Arc::new(move || {
            if let Some(config) = weak.upgrade() {
                out.store(config.snapshot().len(), Ordering::SeqCst);
            }
            true
        }));

        config.replace(Some(fragments()));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_apply_publishes_once() {
        let config = CorsConfiguration::with_fragments(None, false);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        config.add_listener(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        }));

        config.apply(Some(fragments()), true);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(config.is_enabled());
        assert_eq!(config.effective_for(&request("/a")).unwrap().name(), Some("a"));
    }

    #[test]
    fn test_apply_never_exposes_mixed_state() {
        let wide = vec![PolicyFragment::root().with_allowed_origins(["wide"])];
        let narrow = fragments();
        let config = Arc::new(CorsConfiguration::with_fragments(Some(wide), false));

        // Every snapshot a listener sees must be one of the two declared states.
        let seen = Arc::new(Mutex::new(Vec::new()));
        let weak = Arc::downgrade(&config);
        let out = seen.clone();
        config.add_listener(Arc::new(move || {
            if let Some(config) = weak.upgrade() {
                let tree = config.snapshot();
                out.lock().unwrap().push((tree.is_enabled(), tree.len()));
            }
            true
        }));

        config.apply(Some(narrow), true);

        assert_eq!(*seen.lock().unwrap(), vec![(true, 2)]);
    }

    #[test]
    fn test_finished_listeners_are_dropped() {
        let config = CorsConfiguration::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        config.add_listener(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        }));
        config.add_listener(Arc::new(|| true));

        config.replace(None);
        config.replace(None);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(config.listener_count(), 1);
    }

    #[test]
    fn test_readers_see_whole_trees() {
        let config = Arc::new(CorsConfiguration::new());
        let writer = {
            let config = config.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    if i % 2 == 0 {
                        config.replace(Some(fragments()));
                    } else {
                        config.replace(None);
                    }
                }
            })
        };

        for _ in 0..2000 {
            let tree = config.snapshot();
            assert!(tree.len() == 1 || tree.len() == 2);
            if tree.is_enabled() {
                assert!(tree.find("a").is_some());
            }
        }

        writer.join().unwrap();
    }
}
