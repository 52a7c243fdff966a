//! Gate filter lifecycle.
//!
//! # Responsibilities
//! - Subscribe to policy changes and fall back to `Uninitialized` on each
//! - Lazily (re)initialize from the current policy on the request path
//! - Hand enabled traffic to the wrapped protection, pass the rest through
//!
//! # Design Decisions
//! - Initialization state is a generation counter: a change notification
//!   bumps the generation, `do_init` records the generation it computed
//!   for. A notification racing an init therefore always forces another one.
//! - The decided `{enabled, matcher}` pair is published through `ArcSwap`,
//!   so `handle` never sees half of an update
//! - `do_init` is serialized per filter; `handle` never waits on it except
//!   when it has to run it itself

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::gate::protection::Protection;
use crate::matcher::RequestMatcher;
use crate::observability::metrics;
use crate::policy::{ChangeListener, CorsConfiguration, CsrfConfiguration};

const NEVER: u64 = u64::MAX;

/// Where a gate filter reads its effective policy from.
pub trait PolicySource: Send + Sync + 'static {
    /// The matcher the gate should enforce, or `None` when the policy is off.
    fn gate_matcher(&self) -> Option<RequestMatcher>;

    fn subscribe(&self, listener: ChangeListener);
}

impl PolicySource for CsrfConfiguration {
    fn gate_matcher(&self) -> Option<RequestMatcher> {
        let policy = self.snapshot();
        if policy.is_enabled() && !policy.matcher().is_none() {
            Some(policy.matcher().clone())
        } else {
            None
        }
    }

    fn subscribe(&self, listener: ChangeListener) {
        self.add_listener(listener);
    }
}

impl PolicySource for CorsConfiguration {
    fn gate_matcher(&self) -> Option<RequestMatcher> {
        let tree = self.snapshot();
        if tree.is_enabled() {
            Some(tree.root().matcher().clone())
        } else {
            None
        }
    }

    fn subscribe(&self, listener: ChangeListener) {
        self.add_listener(listener);
    }
}

#[derive(Debug)]
struct GateState {
    enabled: bool,
    matcher: RequestMatcher,
}

impl GateState {
    fn disabled() -> Self {
        Self {
            enabled: false,
            matcher: RequestMatcher::None,
        }
    }
}

/// Request-path component binding a policy source to a protection.
pub struct GateFilter<S, P> {
    name: &'static str,
    source: Arc<S>,
    protection: P,
    generation: AtomicU64,
    initialized: AtomicU64,
    state: ArcSwap<GateState>,
    init_lock: Mutex<()>,
}

impl<S: PolicySource, P: Protection> GateFilter<S, P> {
    pub fn new(name: &'static str, source: Arc<S>, protection: P) -> Self {
        Self {
            name,
            source,
            protection,
            generation: AtomicU64::new(0),
            initialized: AtomicU64::new(NEVER),
            state: ArcSwap::from_pointee(GateState::disabled()),
            init_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn protection(&self) -> &P {
        &self.protection
    }

    /// Set up the protection, subscribe to policy changes and initialize.
    pub fn init(self: &Arc<Self>) {
        self.protection.init();

        let weak = Arc::downgrade(self);
        self.source.subscribe(Arc::new(move || match weak.upgrade() {
            Some(filter) => {
                filter.reset();
                true
            }
            None => false,
        }));

        self.do_init();
    }

    /// Mark the filter `Uninitialized`; the next request re-reads the policy.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst) == self.generation.load(Ordering::SeqCst)
    }

    /// Last published decision.
    pub fn is_enabled(&self) -> bool {
        self.state.load().enabled
    }

    /// Read the policy and publish a decision, unless already initialized.
    pub fn do_init(&self) {
        let _guard = self.init_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let generation = self.generation.load(Ordering::SeqCst);
        if self.initialized.load(Ordering::SeqCst) == generation {
            return;
        }

        let state = match self.source.gate_matcher() {
            Some(matcher) => GateState {
                enabled: true,
                matcher,
            },
            None => GateState::disabled(),
        };

        if state.enabled {
            tracing::debug!(gate = self.name, matcher = ?state.matcher, "Gate filter enabled");
        } else {
            tracing::info!(gate = self.name, "Gate filter disabled, passing requests through");
        }

        self.state.store(Arc::new(state));
        self.initialized.store(generation, Ordering::SeqCst);
    }

    pub async fn handle(&self, req: Request<Body>, next: Next) -> Response {
        if !self.is_initialized() {
            self.do_init();
        }

        let state = self.state.load_full();
        metrics::record_gate_decision(self.name, state.enabled);

        if state.enabled {
            self.protection.protect(&state.matcher, req, next).await
        } else {
            next.run(req).await
        }
    }
}

/// `axum::middleware::from_fn_with_state` adapter for a shared gate filter.
pub async fn gate_middleware<S: PolicySource, P: Protection>(
    State(filter): State<Arc<GateFilter<S, P>>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    filter.handle(req, next).await
}
