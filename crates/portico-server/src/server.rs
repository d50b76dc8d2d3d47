//! HTTP server.
//!
//! Every accepted connection is served by hyper's HTTP/1 implementation.
//! Requests are handled in this order:
//!
//! 1. `GET /health` is answered directly
//! 2. the body is collected, bounded by the request timeout
//! 3. paths the [`PathMatcher`] excludes go straight downstream
//! 4. everything else runs through the [`Pipeline`]; a redirect outcome is
//!    answered with `307 Temporary Redirect`, a pass-through continues
//!    downstream with the pipeline's request headers applied
//!
//! # Example
//!
//! ```rust,ignore
//! use portico_server::{downstream_fn, Server};
//!
//! let server = Server::builder()
//!     .http_addr("0.0.0.0:3000")
//!     .pipeline(pipeline)
//!     .downstream(downstream_fn(render_page))
//!     .build()?;
//!
//! server.run().await?;
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{header, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};

use portico_config::PorticoConfig;
use portico_middleware::{FetchEvent, Outcome, PathMatcher, Pipeline, Request, Response};
use portico_telemetry::{record_request, InFlightGuard};

use crate::downstream::Downstream;
use crate::error::ServerError;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:3000";
const HEALTH_PATH: &str = "/health";

/// The Portico HTTP server.
pub struct Server {
    http_addr: String,
    pipeline: Arc<Pipeline>,
    matcher: PathMatcher,
    downstream: Arc<dyn Downstream>,
    request_timeout: Duration,
    shutdown_timeout: Duration,
}

impl Server {
    /// Creates a new server builder.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Returns the configured listen address.
    #[must_use]
    pub fn http_addr(&self) -> &str {
        &self.http_addr
    }

    /// Returns the pipeline requests run through.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Runs until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the listen address cannot be bound.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Binds the configured address and runs until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the listen address is invalid or cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr: SocketAddr = self.http_addr.parse().map_err(|e| {
            ServerError::BindError(format!("invalid address '{}': {e}", self.http_addr))
        })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("failed to bind to {addr}: {e}")))?;

        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener until `shutdown`
    /// fires, then waits up to the shutdown timeout for open connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        tracing::info!("Server listening on {}", local_addr);

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => {
                            let server = Arc::clone(&server);
                            let token = tracker.acquire();
                            let shutdown = shutdown.clone();

                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, remote_addr, shutdown).await {
                                    tracing::debug!("Connection error from {}: {}", remote_addr, e);
                                }
                                drop(token);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }

                () = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping server");
                    break;
                }
            }
        }

        tracing::info!(
            "Waiting up to {:?} for {} connections to close",
            server.shutdown_timeout,
            tracker.active_connections()
        );

        tokio::select! {
            () = tracker.wait_for_shutdown() => {
                tracing::info!("All connections closed");
            }
            () = tokio::time::sleep(server.shutdown_timeout) => {
                tracing::warn!(
                    "Shutdown timeout reached, {} connections still active",
                    tracker.active_connections()
                );
            }
        }

        tracing::info!("Server stopped");
        Ok(())
    }

    async fn handle_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let server = Arc::clone(self);

        let service = service_fn(move |request: hyper::Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle_request(request, remote_addr).await) }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                // Let the in-flight exchange finish, then close.
                conn.as_mut().graceful_shutdown();
                conn.as_mut().await
            }
        }
    }

    async fn handle_request(
        &self,
        request: hyper::Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> Response {
        let _in_flight = InFlightGuard::new();
        let started = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let response = if method == Method::GET && path == HEALTH_PATH {
            health_response()
        } else {
            match tokio::time::timeout(self.request_timeout, collect_request(request)).await {
                Ok(Ok(request)) => self.dispatch(request, remote_addr).await,
                Ok(Err(e)) => {
                    tracing::warn!("Failed to read request body: {}", e);
                    text_response(StatusCode::BAD_REQUEST, "failed to read request body")
                }
                Err(_) => {
                    tracing::warn!("Request body collection timed out");
                    text_response(StatusCode::REQUEST_TIMEOUT, "request timed out")
                }
            }
        };

        let elapsed = started.elapsed();
        record_request(response.status().as_u16(), elapsed);
        tracing::debug!(
            http.method = %method,
            http.path = %path,
            http.status_code = response.status().as_u16(),
            duration_ms = elapsed.as_secs_f64() * 1000.0,
            "Request complete"
        );

        response
    }

    /// Runs the pipeline, if it applies, and produces the response.
    async fn dispatch(&self, mut request: Request, remote_addr: SocketAddr) -> Response {
        if self.matcher.applies(request.uri().path()) {
            let event = FetchEvent::from_peer(remote_addr);
            let outcome = self.pipeline.handle(pipeline_view(&request), &event).await;

            if event.pending() > 0 {
                tokio::spawn(async move { event.drain().await });
            }

            match outcome {
                Outcome::Redirect { location } => return redirect_response(location.as_str()),
                Outcome::PassThrough {
                    request_headers: Some(headers),
                } => *request.headers_mut() = headers,
                Outcome::PassThrough {
                    request_headers: None,
                } => {}
            }
        }

        let path = request.uri().path().to_string();
        match tokio::time::timeout(self.request_timeout, self.downstream.call(request)).await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!("Downstream timed out for {}", path);
                text_response(StatusCode::GATEWAY_TIMEOUT, "downstream timed out")
            }
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("http_addr", &self.http_addr)
            .field("stages", &self.pipeline.stage_names())
            .field("matcher", &self.matcher)
            .field("request_timeout", &self.request_timeout)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

/// Reads the whole body so the request can be inspected and forwarded.
async fn collect_request(request: hyper::Request<Incoming>) -> Result<Request, hyper::Error> {
    let (parts, body) = request.into_parts();
    let bytes = body.collect().await?.to_bytes();
    Ok(Request::from_parts(parts, Full::new(bytes)))
}

/// Copies what the pipeline reads from a request. Extensions are not carried.
fn pipeline_view(request: &Request) -> Request {
    let mut view = Request::new(request.body().clone());
    *view.method_mut() = request.method().clone();
    *view.uri_mut() = request.uri().clone();
    *view.version_mut() = request.version();
    *view.headers_mut() = request.headers().clone();
    view
}

fn redirect_response(location: &str) -> Response {
    http::Response::builder()
        .status(StatusCode::TEMPORARY_REDIRECT)
        .header(header::LOCATION, location)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| text_response(StatusCode::INTERNAL_SERVER_ERROR, "bad redirect"))
}

fn health_response() -> Response {
    let body = serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    });

    http::Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(br#"{"status":"healthy"}"#))))
}

fn text_response(status: StatusCode, message: &'static str) -> Response {
    let mut response = Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response
}

/// Builder for [`Server`].
#[derive(Default)]
pub struct ServerBuilder {
    http_addr: Option<String>,
    pipeline: Option<Arc<Pipeline>>,
    matcher: Option<PathMatcher>,
    downstream: Option<Arc<dyn Downstream>>,
    request_timeout: Option<Duration>,
    shutdown_timeout: Option<Duration>,
}

impl ServerBuilder {
    /// Takes the listen address, timeouts and path matcher from `config`.
    #[must_use]
    pub fn config(mut self, config: &PorticoConfig) -> Self {
        self.http_addr = Some(config.server.http_addr.clone());
        self.request_timeout = Some(Duration::from_millis(config.server.request_timeout_ms));
        self.shutdown_timeout = Some(Duration::from_secs(config.server.shutdown_timeout_secs));
        self.matcher = Some(crate::app::path_matcher(config));
        self
    }

    /// Sets the listen address.
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.http_addr = Some(addr.into());
        self
    }

    /// Sets the pipeline.
    #[must_use]
    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(Arc::new(pipeline));
        self
    }

    /// Sets a pipeline shared with other owners.
    #[must_use]
    pub fn shared_pipeline(mut self, pipeline: Arc<Pipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Sets the path matcher. Defaults to [`PathMatcher::default`].
    #[must_use]
    pub fn matcher(mut self, matcher: PathMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Sets the downstream handler.
    #[must_use]
    pub fn downstream<D: Downstream>(mut self, downstream: D) -> Self {
        self.downstream = Some(Arc::new(downstream));
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets how long shutdown waits for open connections.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Builds the server.
    ///
    /// # Errors
    ///
    /// Fails if no pipeline or downstream handler was set.
    pub fn build(self) -> Result<Server, ServerError> {
        Ok(Server {
            http_addr: self
                .http_addr
                .unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string()),
            pipeline: self.pipeline.ok_or(ServerError::MissingComponent("pipeline"))?,
            matcher: self.matcher.unwrap_or_default(),
            downstream: self
                .downstream
                .ok_or(ServerError::MissingComponent("downstream"))?,
            request_timeout: self.request_timeout.unwrap_or(Duration::from_secs(30)),
            shutdown_timeout: self.shutdown_timeout.unwrap_or(Duration::from_secs(30)),
        })
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("http_addr", &self.http_addr)
            .field("has_pipeline", &self.pipeline.is_some())
            .field("has_downstream", &self.downstream.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downstream::downstream_fn;
    use portico_middleware::{
        AuthMiddleware, AuthRoutes, JwtVerifier, PublicPathMiddleware, RequestHeadersMiddleware,
    };

    fn pipeline() -> Pipeline {
        Pipeline::standard(
            PublicPathMiddleware::with_defaults().unwrap(),
            RequestHeadersMiddleware::new(),
            AuthMiddleware::new(JwtVerifier::hs256(b"unit").unwrap(), AuthRoutes::default())
                .unwrap(),
        )
        .unwrap()
    }

    fn echo_server() -> Server {
        Server::builder()
            .pipeline(pipeline())
            .downstream(downstream_fn(|request: Request| async move {
                let pathname = request
                    .headers()
                    .get("x-pathname")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-")
                    .to_string();
                Response::new(Full::new(Bytes::from(pathname)))
            }))
            .build()
            .unwrap()
    }

    fn request(uri: &str) -> Request {
        http::Request::builder()
            .uri(uri)
            .header("host", "localhost")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_builder_requires_pipeline_and_downstream() {
        let err = Server::builder().build().unwrap_err();
        assert!(matches!(err, ServerError::MissingComponent("pipeline")));

        let err = Server::builder().pipeline(pipeline()).build().unwrap_err();
        assert!(matches!(err, ServerError::MissingComponent("downstream")));
    }

    #[test]
    fn test_builder_defaults() {
        let server = echo_server();
        assert_eq!(server.http_addr(), DEFAULT_HTTP_ADDR);
        assert_eq!(server.request_timeout(), Duration::from_secs(30));
        assert_eq!(server.pipeline().stage_count(), 3);
    }

    #[test]
    fn test_builder_from_config() {
        let config = PorticoConfig::development();
        let server = Server::builder()
            .config(&config)
            .pipeline(pipeline())
            .downstream(downstream_fn(|_request: Request| async {
                Response::new(Full::new(Bytes::new()))
            }))
            .build()
            .unwrap();
        assert_eq!(server.http_addr(), "127.0.0.1:3000");
    }

    #[tokio::test]
    async fn test_dispatch_redirects_anonymous_user() {
        let response = echo_server().dispatch(request("/settings"), peer()).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "http://localhost/login?next=%2Fsettings"
        );
    }

    #[tokio::test]
    async fn test_dispatch_applies_pipeline_headers() {
        let response = echo_server().dispatch(request("/login"), peer()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "/login");
    }

    #[tokio::test]
    async fn test_dispatch_skips_excluded_paths() {
        let response = echo_server().dispatch(request("/api/projects"), peer()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "-");
    }

    #[tokio::test]
    async fn test_downstream_timeout() {
        let server = Server::builder()
            .pipeline(pipeline())
            .request_timeout(Duration::from_millis(20))
            .downstream(downstream_fn(|_request: Request| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Response::new(Full::new(Bytes::new()))
            }))
            .build()
            .unwrap();

        let response = server.dispatch(request("/api/slow"), peer()).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_pipeline_view_copies_request_line_and_headers() {
        let original = http::Request::builder()
            .method(Method::POST)
            .uri("/dashboard?tab=1")
            .header("cookie", "auth_token=abc")
            .body(Full::new(Bytes::from_static(b"payload")))
            .unwrap();

        let view = pipeline_view(&original);
        assert_eq!(*view.method(), Method::POST);
        assert_eq!(view.uri(), "/dashboard?tab=1");
        assert_eq!(view.headers().get("cookie").unwrap(), "auth_token=abc");
    }

    #[tokio::test]
    async fn test_health_response() {
        let response = health_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("healthy"));
    }
}
