//! Request header annotation middleware.
//!
//! Copies the incoming request headers, adds `x-pathname` with the request
//! path, and stores the result in the context so later stages (and the
//! downstream renderer) can see which page was requested.
//!
//! Framework action requests, marked by the `next-action` header, leave the
//! pipeline here with a plain pass-through. They are not annotated and the
//! auth stage never sees them.

use crate::context::PipelineContext;
use crate::error::{MiddlewareError, PipelineError};
use crate::middleware::{BoxFuture, Middleware, MiddlewareResult, Next};
use crate::types::{Outcome, Request};
use http::{HeaderName, HeaderValue};

/// Header carrying the resolved request path.
pub const PATHNAME_HEADER: &str = "x-pathname";

/// Header marking a framework action request.
pub const ACTION_HEADER: &str = "next-action";

/// Middleware that annotates request headers.
#[derive(Debug, Clone)]
pub struct RequestHeadersMiddleware {
    pathname_header: HeaderName,
    action_header: HeaderName,
}

impl RequestHeadersMiddleware {
    /// Uses [`PATHNAME_HEADER`] and [`ACTION_HEADER`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            pathname_header: HeaderName::from_static(PATHNAME_HEADER),
            action_header: HeaderName::from_static(ACTION_HEADER),
        }
    }

    /// Uses custom header names.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidHeaderName`] if either name is not a
    /// valid header name.
    pub fn with_header_names(pathname: &str, action: &str) -> Result<Self, PipelineError> {
        let parse = |name: &str| {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| PipelineError::InvalidHeaderName(name.to_string()))
        };
        Ok(Self {
            pathname_header: parse(pathname)?,
            action_header: parse(action)?,
        })
    }

    /// Returns `true` if the request is a framework action.
    #[must_use]
    pub fn is_action(&self, request: &Request) -> bool {
        request.headers().contains_key(&self.action_header)
    }
}

impl Default for RequestHeadersMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for RequestHeadersMiddleware {
    fn name(&self) -> &'static str {
        "request_headers"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut PipelineContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let path = request.uri().path();
            let value = HeaderValue::from_str(path).map_err(|e| {
                MiddlewareError::invalid_header(self.pathname_header.as_str(), e.to_string())
            })?;

            let mut headers = request.headers().clone();
            headers.insert(self.pathname_header.clone(), value);

            if self.is_action(&request) {
                tracing::trace!(http.path = %path, "Action request, skipping pipeline");
                return Ok(Outcome::pass_through());
            }

            ctx.set_request_headers(headers);
            Ok(next.run(ctx, request).await)
        })
    }
}
