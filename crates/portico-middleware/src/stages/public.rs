//! Public path middleware.
//!
//! Short-circuits the pipeline for requests that never need a session:
//! the landing page, well-known metadata files, framework and static assets,
//! and images. Matching requests pass through untouched; the header and auth
//! stages do not run for them.
//!
//! Patterns are regular expressions tested with search semantics, so a
//! pattern matches anywhere in the path unless it is anchored.

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::middleware::{BoxFuture, Middleware, MiddlewareResult, Next};
use crate::types::{Outcome, Request};
use regex::Regex;

/// Unprotected path patterns used when none are configured.
pub const DEFAULT_UNPROTECTED_PATHS: &[&str] = &[
    r"^/$",
    r"^/favicon\.ico$",
    r"^/sitemap\.xml$",
    r"^/robots\.txt$",
    r"^/_next/",
    r"_assets/",
    r"\.(png|jpg|jpeg|gif|svg|ico|webp)$",
];

/// Middleware that lets public paths bypass the rest of the pipeline.
#[derive(Debug, Clone)]
pub struct PublicPathMiddleware {
    patterns: Vec<Regex>,
}

impl PublicPathMiddleware {
    /// Compiles the given patterns, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidPattern`] for the first pattern that
    /// does not compile.
    pub fn new<I, S>(patterns: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(p).map_err(|e| PipelineError::invalid_pattern(p, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Uses [`DEFAULT_UNPROTECTED_PATHS`].
    pub fn with_defaults() -> Result<Self, PipelineError> {
        Self::new(DEFAULT_UNPROTECTED_PATHS)
    }

    /// Returns `true` if any pattern matches `path`.
    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(path))
    }

    /// Number of compiled patterns.
    #[must_use]
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

impl Middleware for PublicPathMiddleware {
    fn name(&self) -> &'static str {
        "public"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut PipelineContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            if self.is_public(request.uri().path()) {
                tracing::trace!(http.path = %request.uri().path(), "Public path, skipping pipeline");
                return Ok(Outcome::pass_through());
            }
            Ok(next.run(ctx, request).await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FetchEvent;
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue, Request as HttpRequest};
    use http_body_util::Full;

    fn request(path: &str) -> Request {
        HttpRequest::builder()
            .uri(path)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[test]
    fn test_default_patterns() {
        let public = PublicPathMiddleware::with_defaults().unwrap();
        assert_eq!(public.pattern_count(), DEFAULT_UNPROTECTED_PATHS.len());

        for path in [
            "/",
            "/favicon.ico",
            "/sitemap.xml",
            "/robots.txt",
            "/_next/static/chunks/main.js",
            "/static/_assets/app.css",
            "/images/avatar.png",
            "/logo.svg",
            "/photos/cat.webp",
        ] {
            assert!(public.is_public(path), "{path} should be public");
        }
    }

    #[test]
    fn test_protected_paths_are_not_public() {
        let public = PublicPathMiddleware::with_defaults().unwrap();
        for path in [
            "/dashboard",
            "/dashboard/projects",
            "/login",
            "/gifts",
            "/docs/png-export",
            "/x/favicon.ico.bak",
        ] {
            assert!(!public.is_public(path), "{path} should not be public");
        }
    }

    #[test]
    fn test_invalid_pattern() {
        let result = PublicPathMiddleware::new(["^/ok$", "(unclosed"]);
        match result {
            Err(PipelineError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "(unclosed"),
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_public_path_short_circuits() {
        let public = PublicPathMiddleware::with_defaults().unwrap();
        let mut ctx = PipelineContext::new(FetchEvent::new());
        // Headers in the context must not leak into a public pass-through.
        let mut headers = HeaderMap::new();
        headers.insert("x-pathname", HeaderValue::from_static("/"));
        ctx.set_request_headers(headers);

        let outcome = public
            .process(&mut ctx, request("/"), Next::terminal())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::pass_through());
    }

    #[tokio::test]
    async fn test_other_paths_continue() {
        let public = PublicPathMiddleware::with_defaults().unwrap();
        let mut ctx = PipelineContext::new(FetchEvent::new());
        let mut headers = HeaderMap::new();
        headers.insert("x-pathname", HeaderValue::from_static("/dashboard"));
        ctx.set_request_headers(headers);

        let outcome = public
            .process(&mut ctx, request("/dashboard"), Next::terminal())
            .await
            .unwrap();
        // The terminal handler carries the context headers.
        assert!(outcome.request_headers().is_some());
    }
}
