//! The enforcement primitive a gate filter wraps.

use std::future::Future;

use axum::{body::Body, http::Request, middleware::Next, response::Response};

use crate::matcher::RequestMatcher;

/// A request-path security check invoked by an enabled gate filter.
///
/// `matcher` is the gate's current effective matcher. Implementations decide
/// how to use it; they must hand the request to `next` when they let it
/// through.
pub trait Protection: Send + Sync + 'static {
    /// One-time setup, run when the owning gate filter is initialized.
    fn init(&self) {}

    fn protect(
        &self,
        matcher: &RequestMatcher,
        req: Request<Body>,
        next: Next,
    ) -> impl Future<Output = Response> + Send;
}
