//! Pipeline error types.
//!
//! Two kinds of failure exist in the pipeline:
//!
//! - [`PipelineError`] is raised while *building* the pipeline. It is fatal:
//!   a server must not start with a misconfigured pipeline.
//! - [`MiddlewareError`] is returned by a stage while *handling* a request.
//!   It never leaves the pipeline; the isolation wrapper logs it and lets the
//!   request continue.

use thiserror::Error;

/// Errors raised while constructing a pipeline or one of its stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage was registered without a usable name.
    #[error("middleware name is required (stage #{index})")]
    MissingStageName {
        /// Zero-based position of the offending stage.
        index: usize,
    },

    /// A path pattern failed to compile.
    #[error("invalid path pattern `{pattern}`: {source}")]
    InvalidPattern {
        /// The pattern as configured.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// The token verifier could not be configured.
    #[error("invalid token verifier configuration: {0}")]
    InvalidVerifier(String),

    /// A configured header name is not a valid HTTP header name.
    #[error("invalid header name `{0}`")]
    InvalidHeaderName(String),

    /// A configured route path is not usable.
    #[error("invalid route `{route}`: {reason}")]
    InvalidRoute {
        /// The route as configured.
        route: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl PipelineError {
    /// Creates a new invalid pattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            source,
        }
    }

    /// Creates a new invalid route error.
    pub fn invalid_route(route: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRoute {
            route: route.into(),
            reason: reason.into(),
        }
    }
}

/// Errors a stage may return while handling a request.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    /// A header could not be built from request data.
    #[error("invalid header value for `{name}`: {reason}")]
    InvalidHeader {
        /// Header name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The request URL could not be resolved.
    #[error("cannot resolve request url: {0}")]
    Url(#[from] url::ParseError),

    /// The session token could not be read.
    #[error("failed to read session token: {0}")]
    TokenSource(String),

    /// Any other stage failure.
    #[error("{0}")]
    Other(String),
}

impl MiddlewareError {
    /// Creates a new invalid header error.
    pub fn invalid_header(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new token source error.
    pub fn token_source(reason: impl Into<String>) -> Self {
        Self::TokenSource(reason.into())
    }
}
