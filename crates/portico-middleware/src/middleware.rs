//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait that every pipeline stage
//! implements, and the [`Next`] continuation a stage uses to hand the request
//! to the rest of the chain.
//!
//! # Example
//!
//! ```
//! use portico_middleware::{BoxFuture, Middleware, MiddlewareResult, Next, Request};
//! use portico_middleware::context::PipelineContext;
//!
//! struct LoggingMiddleware;
//!
//! impl Middleware for LoggingMiddleware {
//!     fn name(&self) -> &'static str {
//!         "logging"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut PipelineContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, MiddlewareResult> {
//!         Box::pin(async move {
//!             tracing::debug!(path = %request.uri().path(), "Request seen");
//!             Ok(next.run(ctx, request).await)
//!         })
//!     }
//! }
//! ```

use crate::context::PipelineContext;
use crate::error::MiddlewareError;
use crate::pipeline::StageEntry;
use crate::types::{Outcome, Request};
use std::future::Future;
use std::pin::Pin;

/// A boxed future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a stage produces: an outcome, or an error for the isolation wrapper.
pub type MiddlewareResult = Result<Outcome, MiddlewareError>;

/// The core middleware trait.
///
/// # Invariants
///
/// - A stage either returns its own [`Outcome`] (short-circuit) or calls
///   `next.run()` exactly once.
/// - Errors returned from `process` (and panics inside it) never escape the
///   pipeline. They are logged and the request passes through.
pub trait Middleware: Send + Sync + 'static {
    /// Returns the default name of this stage.
    ///
    /// Used for registration, logging and metrics.
    fn name(&self) -> &'static str;

    /// Handles the request.
    fn process<'a>(
        &'a self,
        ctx: &'a mut PipelineContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult>;
}

/// Continuation to the rest of the pipeline.
///
/// Consumed on use, so a stage can only continue once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    /// More stages to run.
    Chain {
        stage: &'a StageEntry,
        next: Box<Next<'a>>,
    },
    /// End of chain.
    Terminal,
}

impl<'a> Next<'a> {
    /// Creates a `Next` that runs `stage` and then `next`.
    pub(crate) fn new(stage: &'a StageEntry, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                stage,
                next: Box::new(next),
            },
        }
    }

    /// Creates the terminal `Next`.
    ///
    /// Running it yields a pass-through carrying whatever request headers
    /// the context has accumulated.
    #[must_use]
    pub fn terminal() -> Self {
        Self {
            inner: NextInner::Terminal,
        }
    }

    /// Invokes the next stage, or the terminal handler.
    pub async fn run(self, ctx: &mut PipelineContext, request: Request) -> Outcome {
        match self.inner {
            NextInner::Chain { stage, next } => stage.run(ctx, request, *next).await,
            NextInner::Terminal => Outcome::pass_through_with(ctx.request_headers().cloned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FetchEvent;
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue, Request as HttpRequest};
    use http_body_util::Full;

    fn request() -> Request {
        HttpRequest::builder()
            .uri("/test")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_terminal_without_headers() {
        let mut ctx = PipelineContext::new(FetchEvent::new());
        let outcome = Next::terminal().run(&mut ctx, request()).await;
        assert_eq!(outcome, Outcome::pass_through());
    }

    #[tokio::test]
    async fn test_terminal_propagates_context_headers() {
        let mut ctx = PipelineContext::new(FetchEvent::new());
        let mut headers = HeaderMap::new();
        headers.insert("x-pathname", HeaderValue::from_static("/test"));
        ctx.set_request_headers(headers);

        let outcome = Next::terminal().run(&mut ctx, request()).await;
        assert_eq!(
            outcome.request_headers().unwrap().get("x-pathname").unwrap(),
            "/test"
        );
    }
}
