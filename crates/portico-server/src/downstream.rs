//! The handler a request reaches after the pipeline lets it through.

use std::future::Future;

use portico_middleware::{BoxFuture, Request, Response};

/// Serves requests the pipeline passed through.
///
/// In a deployment this is the page renderer or an upstream proxy. The
/// request it receives already carries any headers the pipeline added.
pub trait Downstream: Send + Sync + 'static {
    /// Produces the response for a request.
    fn call(&self, request: Request) -> BoxFuture<'static, Response>;
}

/// Adapts an async function into a [`Downstream`].
pub struct FnDownstream<F> {
    f: F,
}

impl<F> FnDownstream<F> {
    /// Wraps `f`.
    pub const fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Downstream for FnDownstream<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, request: Request) -> BoxFuture<'static, Response> {
        Box::pin((self.f)(request))
    }
}

impl<F> std::fmt::Debug for FnDownstream<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnDownstream").finish_non_exhaustive()
    }
}

/// Wraps an async function as a [`Downstream`].
pub const fn downstream_fn<F>(f: F) -> FnDownstream<F> {
    FnDownstream::new(f)
}
