//! Ordered, fault-isolated middleware pipeline.
//!
//! ## Standard Stages
//!
//! The standard pipeline consists of 3 stages in a fixed order:
//!
//! 1. **Public** - Let static assets and public pages through untouched
//! 2. **Request Headers** - Annotate the request with `x-pathname`
//! 3. **Auth** - Session check and login/dashboard redirects
//!
//! The order determines short-circuit precedence: a public path exits before
//! headers are touched, and headers are annotated before any auth decision.
//!
//! ## Fault Isolation
//!
//! Every stage invocation is guarded. If a stage returns an error or panics,
//! the failure is logged with the stage name and the request passes through
//! with whatever request headers the context holds at that point. The
//! stage's own effect (for example a redirect) is lost.

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::event::FetchEvent;
use crate::middleware::{Middleware, Next};
use crate::stages::{AuthMiddleware, PublicPathMiddleware, RequestHeadersMiddleware};
use crate::types::{Outcome, Request};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Callback invoked once per contained stage failure.
pub type FailureHook = Arc<dyn Fn(&StageFailure) + Send + Sync + 'static>;

/// Describes a stage failure that the pipeline contained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    /// Name of the failing stage.
    pub stage: String,
    /// Error or panic message.
    pub message: String,
}

/// A registered stage: its name plus the middleware itself.
pub struct StageEntry {
    name: String,
    middleware: BoxedMiddleware,
    on_failure: Option<FailureHook>,
}

impl StageEntry {
    /// Returns the registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the stage, containing any error or panic.
    pub(crate) async fn run(
        &self,
        ctx: &mut PipelineContext,
        request: Request,
        next: Next<'_>,
    ) -> Outcome {
        let result = AssertUnwindSafe(self.middleware.process(ctx, request, next))
            .catch_unwind()
            .await;

        let message = match result {
            Ok(Ok(outcome)) => return outcome,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };

        self.contain(ctx, message)
    }

    fn contain(&self, ctx: &PipelineContext, message: String) -> Outcome {
        tracing::error!(
            stage = %self.name,
            error = %message,
            "Error in middleware, passing request through"
        );
        metrics::counter!(
            "portico_stage_failures_total",
            "stage" => self.name.clone()
        )
        .increment(1);

        if let Some(hook) = &self.on_failure {
            hook(&StageFailure {
                stage: self.name.clone(),
                message,
            });
        }

        Outcome::pass_through_with(ctx.request_headers().cloned())
    }
}

impl std::fmt::Debug for StageEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageEntry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "stage panicked".to_string()
    }
}

/// The middleware pipeline.
///
/// Built once at startup and shared between requests; each request gets its
/// own [`PipelineContext`].
///
/// # Example
///
/// ```ignore
/// let pipeline = Pipeline::builder()
///     .stage(PublicPathMiddleware::with_defaults()?)
///     .stage(RequestHeadersMiddleware::new())
///     .stage(auth)
///     .build()?;
///
/// let outcome = pipeline.handle(request, &FetchEvent::new()).await;
/// ```
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<StageEntry>,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Builds the standard Public → Request Headers → Auth pipeline.
    pub fn standard(
        public: PublicPathMiddleware,
        headers: RequestHeadersMiddleware,
        auth: AuthMiddleware,
    ) -> Result<Self, PipelineError> {
        Self::builder()
            .stage(public)
            .stage(headers)
            .stage(auth)
            .build()
    }

    /// Runs a request through every stage.
    ///
    /// This is the pipeline's single entrypoint. It never fails: stage
    /// failures are contained and turned into a pass-through.
    pub async fn handle(&self, request: Request, event: &FetchEvent) -> Outcome {
        let mut ctx = PipelineContext::new(event.clone());
        self.handle_with_context(&mut ctx, request).await
    }

    /// Runs a request through every stage using a caller-provided context.
    pub async fn handle_with_context(
        &self,
        ctx: &mut PipelineContext,
        request: Request,
    ) -> Outcome {
        let path = request.uri().path().to_string();
        let outcome = self.build_chain().run(ctx, request).await;

        tracing::debug!(http.path = %path, outcome = outcome.kind(), "Pipeline complete");
        metrics::counter!(
            "portico_pipeline_outcomes_total",
            "outcome" => outcome.kind()
        )
        .increment(1);

        outcome
    }

    /// Builds the chain for a request, back to front.
    fn build_chain(&self) -> Next<'_> {
        let mut next = Next::terminal();
        for stage in self.stages.iter().rev() {
            next = Next::new(stage, next);
        }
        next
    }

    /// Returns the names of all stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(StageEntry::name).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

/// Builder for constructing a [`Pipeline`].
///
/// Stages run in registration order: the first registered stage sees the
/// request first.
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<(String, BoxedMiddleware)>,
    on_failure: Option<FailureHook>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stage under its own [`Middleware::name`].
    #[must_use]
    pub fn stage<M: Middleware>(self, middleware: M) -> Self {
        let name = middleware.name().to_string();
        self.named_stage(name, middleware)
    }

    /// Adds a stage under an explicit name.
    #[must_use]
    pub fn named_stage<M: Middleware>(mut self, name: impl Into<String>, middleware: M) -> Self {
        self.stages.push((name.into(), Arc::new(middleware)));
        self
    }

    /// Registers a callback for contained stage failures.
    ///
    /// The callback runs in addition to the error log and the
    /// `portico_stage_failures_total` metric.
    #[must_use]
    pub fn on_stage_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&StageFailure) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(hook));
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingStageName`] if any stage name is
    /// empty.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let mut stages = Vec::with_capacity(self.stages.len());
        for (index, (name, middleware)) in self.stages.into_iter().enumerate() {
            if name.trim().is_empty() {
                return Err(PipelineError::MissingStageName { index });
            }
            stages.push(StageEntry {
                name,
                middleware,
                on_failure: self.on_failure.clone(),
            });
        }
        Ok(Pipeline { stages })
    }
}

/// Marker for the standard stages and their fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Stage 1: public path short-circuit
    Public = 1,
    /// Stage 2: request header annotation
    RequestHeaders = 2,
    /// Stage 3: session check and redirects
    Auth = 3,
}

impl Stage {
    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::RequestHeaders => "request_headers",
            Self::Auth => "auth",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Stage; 3] {
        [Self::Public, Self::RequestHeaders, Self::Auth]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MiddlewareError;
    use crate::middleware::{BoxFuture, MiddlewareResult};
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue, Request as HttpRequest};
    use http_body_util::Full;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records its invocation order and continues.
    struct OrderTrackingMiddleware {
        name: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Middleware for OrderTrackingMiddleware {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut PipelineContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, MiddlewareResult> {
            Box::pin(async move {
                self.order.lock().push(self.name);
                Ok(next.run(ctx, request).await)
            })
        }
    }

    /// Writes a header into the context, then fails in the configured way.
    struct FailingMiddleware {
        panic: bool,
    }

    impl Middleware for FailingMiddleware {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut PipelineContext,
            _request: Request,
            _next: Next<'a>,
        ) -> BoxFuture<'a, MiddlewareResult> {
            Box::pin(async move {
                let mut headers = HeaderMap::new();
                headers.insert("x-pathname", HeaderValue::from_static("/boom"));
                ctx.set_request_headers(headers);
                if self.panic {
                    panic!("kaboom");
                }
                Err(MiddlewareError::Other("stage failed".to_string()))
            })
        }
    }

    fn request() -> Request {
        HttpRequest::builder()
            .uri("/test")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn tracker(
        name: &'static str,
        order: &Arc<Mutex<Vec<&'static str>>>,
    ) -> OrderTrackingMiddleware {
        OrderTrackingMiddleware {
            name,
            order: order.clone(),
        }
    }

    #[tokio::test]
    async fn test_pipeline_executes_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let pipeline = Pipeline::builder()
            .stage(tracker("first", &order))
            .stage(tracker("second", &order))
            .stage(tracker("third", &order))
            .build()
            .unwrap();

        let outcome = pipeline.handle(request(), &FetchEvent::new()).await;

        assert_eq!(outcome, Outcome::pass_through());
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_empty_pipeline_passes_through() {
        let pipeline = Pipeline::builder().build().unwrap();
        let outcome = pipeline.handle(request(), &FetchEvent::new()).await;
        assert_eq!(outcome, Outcome::pass_through());
    }

    #[test]
    fn test_missing_stage_name_fails_build() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let result = Pipeline::builder()
            .stage(tracker("first", &order))
            .named_stage("  ", tracker("second", &order))
            .build();

        assert!(matches!(
            result,
            Err(PipelineError::MissingStageName { index: 1 })
        ));
    }

    #[test]
    fn test_named_stage_overrides_name() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .named_stage("custom", tracker("first", &order))
            .build()
            .unwrap();

        assert_eq!(pipeline.stage_names(), vec!["custom"]);
        assert_eq!(pipeline.stage_count(), 1);
    }

    #[tokio::test]
    async fn test_stage_error_is_contained() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();

        let pipeline = Pipeline::builder()
            .stage(tracker("before", &order))
            .stage(FailingMiddleware { panic: false })
            .stage(tracker("after", &order))
            .on_stage_failure(move |failure| sink.lock().push(failure.clone()))
            .build()
            .unwrap();

        let outcome = pipeline.handle(request(), &FetchEvent::new()).await;

        // Headers written before the failure survive.
        assert_eq!(
            outcome.request_headers().unwrap().get("x-pathname").unwrap(),
            "/boom"
        );
        assert_eq!(*order.lock(), vec!["before"]);

        let failures = failures.lock();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].stage, "failing");
        assert_eq!(failures[0].message, "stage failed");
    }

    #[tokio::test]
    async fn test_stage_panic_is_contained() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();

        let pipeline = Pipeline::builder()
            .stage(FailingMiddleware { panic: true })
            .on_stage_failure(move |failure| {
                assert_eq!(failure.message, "kaboom");
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        let outcome = pipeline.handle(request(), &FetchEvent::new()).await;

        assert!(outcome.is_pass_through());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_context_is_fresh_per_request() {
        let pipeline = Pipeline::builder()
            .stage(FailingMiddleware { panic: false })
            .build()
            .unwrap();

        let mut ctx = PipelineContext::new(FetchEvent::new());
        let _ = pipeline.handle_with_context(&mut ctx, request()).await;
        assert!(ctx.request_headers().is_some());

        // A different request through `handle` starts from an empty context.
        let empty = Pipeline::builder().build().unwrap();
        let outcome = empty.handle(request(), &FetchEvent::new()).await;
        assert!(outcome.request_headers().is_none());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "stage panicked");
    }

    #[test]
    fn test_stage_ordering() {
        assert!(Stage::Public < Stage::RequestHeaders);
        assert!(Stage::RequestHeaders < Stage::Auth);
    }

    #[test]
    fn test_stage_names() {
        let names: Vec<_> = Stage::all().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["public", "request_headers", "auth"]);
    }
}
