//! Session authentication middleware.
//!
//! Reads the session token, verifies it, and applies the two redirect rules:
//!
//! | Session | Path            | Result                                   |
//! |---------|-----------------|------------------------------------------|
//! | valid   | auth path       | redirect to `next` or the login redirect |
//! | none    | any other path  | redirect to login with `next` set        |
//! | *       | *               | continue                                 |
//!
//! Any verification result other than [`Verification::Valid`] counts as no
//! session. A valid session populates the context's user before the
//! decision is made.

use crate::context::{PipelineContext, SessionUser};
use crate::error::{MiddlewareError, PipelineError};
use crate::middleware::{BoxFuture, Middleware, MiddlewareResult, Next};
use crate::token::{CookieTokenSource, TokenSource, TokenVerifier, Verification};
use crate::types::{Outcome, Request};
use http::header::HOST;
use std::sync::Arc;
use url::form_urlencoded;
use url::Url;

/// Paths that only make sense without a session.
pub const DEFAULT_AUTH_PATHS: &[&str] = &[
    "/login",
    "/register",
    "/forgot-password",
    "/reset-password",
];

/// Where unauthenticated users are sent.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Where authenticated users land after visiting an auth path.
pub const DEFAULT_LOGIN_REDIRECT: &str = "/dashboard";

/// Registration page.
pub const DEFAULT_SIGNUP_PATH: &str = "/signup";

/// Query parameter carrying the post-login destination.
pub const DEFAULT_REDIRECT_PARAM: &str = "next";

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Encoded `?` separating path and query inside a `next` value.
const QUERY_MARKER: &str = "%3F";

/// Route configuration for [`AuthMiddleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRoutes {
    /// Exact paths treated as auth paths.
    pub auth_paths: Vec<String>,
    /// Login page.
    pub login_path: String,
    /// Default destination for authenticated users on an auth path.
    pub login_redirect: String,
    /// Registration page. Not consulted by the redirect rules; exposed for
    /// downstream handlers that link to it.
    pub signup_path: String,
    /// Name of the post-login destination query parameter.
    pub redirect_param: String,
    /// Whether authenticated users are redirected away from auth paths.
    pub redirect_authenticated_user: bool,
}

impl AuthRoutes {
    /// Returns `true` if `path` is one of the auth paths.
    #[must_use]
    pub fn is_auth_path(&self, path: &str) -> bool {
        self.auth_paths.iter().any(|p| p == path)
    }

    /// Checks that every route is an absolute path.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRoute`] for the first bad route.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let routes = self
            .auth_paths
            .iter()
            .chain([&self.login_path, &self.login_redirect, &self.signup_path]);
        for route in routes {
            if !route.starts_with('/') || route.starts_with("//") {
                return Err(PipelineError::invalid_route(
                    route.as_str(),
                    "must be an absolute path starting with a single '/'",
                ));
            }
        }
        if self.redirect_param.is_empty() {
            return Err(PipelineError::invalid_route(
                "redirect_param",
                "must not be empty",
            ));
        }
        Ok(())
    }
}

impl Default for AuthRoutes {
    fn default() -> Self {
        Self {
            auth_paths: DEFAULT_AUTH_PATHS.iter().map(ToString::to_string).collect(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            login_redirect: DEFAULT_LOGIN_REDIRECT.to_string(),
            signup_path: DEFAULT_SIGNUP_PATH.to_string(),
            redirect_param: DEFAULT_REDIRECT_PARAM.to_string(),
            redirect_authenticated_user: true,
        }
    }
}

/// Middleware enforcing the session redirect rules.
pub struct AuthMiddleware {
    routes: AuthRoutes,
    source: Arc<dyn TokenSource>,
    verifier: Arc<dyn TokenVerifier>,
    fallback_origin: Url,
}

impl AuthMiddleware {
    /// Creates the middleware with a cookie token source.
    ///
    /// # Errors
    ///
    /// Returns an error if `routes` does not validate.
    pub fn new<V: TokenVerifier>(verifier: V, routes: AuthRoutes) -> Result<Self, PipelineError> {
        routes.validate()?;
        let fallback_origin = Url::parse("http://localhost/")
            .map_err(|e| PipelineError::invalid_route("http://localhost/", e.to_string()))?;
        Ok(Self {
            routes,
            source: Arc::new(CookieTokenSource::default()),
            verifier: Arc::new(verifier),
            fallback_origin,
        })
    }

    /// Replaces the token source.
    #[must_use]
    pub fn with_token_source<S: TokenSource>(mut self, source: S) -> Self {
        self.source = Arc::new(source);
        self
    }

    /// Sets the origin used when a request has no usable `Host` header.
    #[must_use]
    pub fn with_fallback_origin(mut self, origin: Url) -> Self {
        self.fallback_origin = origin;
        self
    }

    /// Returns the route configuration.
    #[must_use]
    pub fn routes(&self) -> &AuthRoutes {
        &self.routes
    }

    /// Reconstructs the absolute request URL.
    ///
    /// Absolute-form request targets are used as-is. Otherwise the origin is
    /// taken from `Host` (and `X-Forwarded-Proto` when it names `http` or
    /// `https`). An origin that does not parse falls back to the configured
    /// one.
    fn request_url(&self, request: &Request) -> Url {
        let uri = request.uri();
        let origin = match (uri.scheme_str(), uri.authority()) {
            (Some(scheme), Some(authority)) => parse_origin(scheme, authority.as_str()),
            _ => request
                .headers()
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .and_then(|host| parse_origin(self.forwarded_scheme(request), host)),
        };
        let mut url = origin.unwrap_or_else(|| self.fallback_origin.clone());
        // set_path keeps the origin even for paths like `//host`.
        url.set_path(uri.path());
        url.set_query(uri.query());
        url
    }

    fn forwarded_scheme<'r>(&'r self, request: &'r Request) -> &'r str {
        request
            .headers()
            .get(FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|proto| proto.eq_ignore_ascii_case("http") || proto.eq_ignore_ascii_case("https"))
            .unwrap_or(self.fallback_origin.scheme())
    }

    /// Destination for an authenticated user on an auth path.
    ///
    /// The value is resolved as produced by [`Self::login_target`]: the path
    /// is kept verbatim and only the encoded `%3F` query suffix is decoded.
    fn post_login_target(&self, url: &Url) -> Result<Url, MiddlewareError> {
        let requested = url
            .query_pairs()
            .find(|(key, _)| key == self.routes.redirect_param.as_str())
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty());

        let Some(requested) = requested else {
            return Ok(url.join(&self.routes.login_redirect)?);
        };

        let target = match requested.split_once(QUERY_MARKER) {
            Some((path, query)) => match urlencoding::decode(query) {
                Ok(query) => format!("{path}?{query}"),
                Err(_) => requested.clone(),
            },
            None => requested.clone(),
        };
        match url.join(&target) {
            Ok(target) if target.origin() == url.origin() => Ok(target),
            Ok(target) => {
                tracing::warn!(
                    target_url = %target,
                    "Rejected cross-origin post-login redirect"
                );
                Ok(url.join(&self.routes.login_redirect)?)
            }
            Err(e) => {
                tracing::warn!(error = %e, requested = %requested, "Ignoring unparsable post-login redirect");
                Ok(url.join(&self.routes.login_redirect)?)
            }
        }
    }

    /// Login URL carrying the originally requested location.
    fn login_target(&self, url: &Url, path: &str) -> Result<Url, MiddlewareError> {
        let mut login = url.join(&self.routes.login_path)?;
        login.set_query(None);
        login.set_fragment(None);

        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(url.query_pairs())
            .finish();
        // Lowercase hex keeps the uppercase marker unique to the query suffix.
        let mut redirect_to = path.replace(QUERY_MARKER, "%3f");
        if !query.is_empty() {
            redirect_to.push_str(&urlencoding::encode(&format!("?{query}")));
        }

        login
            .query_pairs_mut()
            .append_pair(&self.routes.redirect_param, &redirect_to);
        Ok(login)
    }

    fn verify(&self, token: &str) -> Verification {
        let verification = self.verifier.verify(token);
        metrics::counter!(
            "portico_token_verifications_total",
            "result" => verification.label()
        )
        .increment(1);
        if !verification.is_valid() {
            tracing::warn!(result = verification.label(), "Session token rejected");
        }
        verification
    }
}

/// Parses `scheme://authority/`, rejecting anything that is more than an origin.
fn parse_origin(scheme: &str, authority: &str) -> Option<Url> {
    let url = Url::parse(&format!("{scheme}://{authority}/")).ok()?;
    let bare = url.path() == "/"
        && url.query().is_none()
        && url.fragment().is_none()
        && url.username().is_empty()
        && url.password().is_none()
        && url.host().is_some();
    if bare {
        Some(url)
    } else {
        tracing::debug!(authority = %authority, "Ignoring malformed request origin");
        None
    }
}

impl std::fmt::Debug for AuthMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthMiddleware")
            .field("routes", &self.routes)
            .field("fallback_origin", &self.fallback_origin.as_str())
            .finish_non_exhaustive()
    }
}

impl Middleware for AuthMiddleware {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut PipelineContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let path = request.uri().path().to_string();
            let is_auth_path = self.routes.is_auth_path(&path);

            let session = match self.source.token(&request)? {
                Some(token) => match self.verify(&token) {
                    Verification::Valid(payload) => Some(payload),
                    _ => None,
                },
                None => None,
            };

            match session {
                Some(payload) => {
                    ctx.set_user(SessionUser::new(payload.sub));
                    if is_auth_path && self.routes.redirect_authenticated_user {
                        let url = self.request_url(&request);
                        let location = self.post_login_target(&url)?;
                        tracing::info!(http.path = %path, location = %location, "Redirecting to: {}", location);
                        return Ok(Outcome::redirect(location));
                    }
                }
                None if !is_auth_path => {
                    let url = self.request_url(&request);
                    let location = self.login_target(&url, &path)?;
                    tracing::info!(http.path = %path, location = %location, "Redirecting to: {}", location);
                    return Ok(Outcome::redirect(location));
                }
                None => {}
            }

            Ok(next.run(ctx, request).await)
        })
    }
}
