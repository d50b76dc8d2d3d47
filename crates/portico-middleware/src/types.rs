//! Common types used throughout the middleware pipeline.
//!
//! Stages do not produce HTTP responses directly. They produce an
//! [`Outcome`], which the hosting server turns into either a redirect
//! response or a call into normal routing.

use bytes::Bytes;
use http::HeaderMap;
use http_body_util::Full;
use url::Url;

/// The HTTP request type used in the middleware pipeline.
///
/// This is a standard `http::Request` with a `Full<Bytes>` body.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type produced by the hosting server.
pub type Response = http::Response<Full<Bytes>>;

/// The result of running a request through the pipeline (or one stage of it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Let the request continue to normal routing.
    ///
    /// When `request_headers` is set, the downstream handler sees these
    /// headers instead of the ones the client sent.
    PassThrough {
        /// Replacement request headers, if any stage rewrote them.
        request_headers: Option<HeaderMap>,
    },

    /// Stop here and send the client elsewhere.
    Redirect {
        /// Absolute redirect target.
        location: Url,
    },
}

impl Outcome {
    /// A pass-through that leaves the request headers untouched.
    #[must_use]
    pub const fn pass_through() -> Self {
        Self::PassThrough {
            request_headers: None,
        }
    }

    /// A pass-through that replaces the request headers seen downstream.
    #[must_use]
    pub fn pass_through_with(request_headers: Option<HeaderMap>) -> Self {
        Self::PassThrough { request_headers }
    }

    /// A redirect to the given absolute URL.
    #[must_use]
    pub fn redirect(location: Url) -> Self {
        Self::Redirect { location }
    }

    /// Returns `true` for [`Outcome::PassThrough`].
    #[must_use]
    pub fn is_pass_through(&self) -> bool {
        matches!(self, Self::PassThrough { .. })
    }

    /// Returns the redirect target, if this outcome is a redirect.
    #[must_use]
    pub fn location(&self) -> Option<&Url> {
        match self {
            Self::Redirect { location } => Some(location),
            Self::PassThrough { .. } => None,
        }
    }

    /// Returns the replacement request headers of a pass-through.
    #[must_use]
    pub fn request_headers(&self) -> Option<&HeaderMap> {
        match self {
            Self::PassThrough { request_headers } => request_headers.as_ref(),
            Self::Redirect { .. } => None,
        }
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PassThrough { .. } => "pass_through",
            Self::Redirect { .. } => "redirect",
        }
    }
}
