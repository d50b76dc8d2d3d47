//! # Portico Middleware
//!
//! Request middleware pipeline for server-rendered web applications.
//!
//! Every page request passes through an ordered chain of stages before it
//! reaches the renderer. A stage either decides the request's fate on its own
//! (short-circuit) or hands it to the next stage.
//!
//! ## Pipeline Stages
//!
//! ```text
//! Request → Public → RequestHeaders → Auth → Outcome
//! ```
//!
//! | Stage | Middleware       | Purpose                                     |
//! |-------|------------------|---------------------------------------------|
//! | 1     | Public           | Static assets and public pages pass through |
//! | 2     | Request Headers  | Add `x-pathname`, skip action requests      |
//! | 3     | Auth             | Session check, login and dashboard redirect |
//!
//! The pipeline yields an [`Outcome`]: pass the request through (optionally
//! with rewritten request headers), or redirect it.
//!
//! ## Failure Isolation
//!
//! A stage that returns an error or panics does not fail the request. The
//! failure is logged with the stage name and the request passes through.
//!
//! ## Example
//!
//! ```
//! use portico_middleware::pipeline::Stage;
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 3);
//! assert_eq!(stages[0].name(), "public");
//! assert_eq!(stages[2].name(), "auth");
//! ```

#![doc(html_root_url = "https://docs.rs/portico-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod cookies;
pub mod error;
pub mod event;
pub mod matcher;
pub mod middleware;
pub mod pipeline;
pub mod stages;
pub mod token;
pub mod types;

// Re-export main types at crate root
pub use context::{PipelineContext, SessionUser};
pub use error::{MiddlewareError, PipelineError};
pub use event::FetchEvent;
pub use matcher::PathMatcher;
pub use middleware::{BoxFuture, Middleware, MiddlewareResult, Next};
pub use pipeline::{Pipeline, PipelineBuilder, Stage, StageFailure};
pub use stages::{AuthMiddleware, AuthRoutes, PublicPathMiddleware, RequestHeadersMiddleware};
pub use token::{
    CookieTokenSource, JwtPayload, JwtVerifier, TokenSource, TokenVerifier, Verification,
};
pub use types::{Outcome, Request, Response};
