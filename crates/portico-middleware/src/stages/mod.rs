//! Standard middleware stages.
//!
//! 1. [`public`] - Public paths bypass the pipeline
//! 2. [`headers`] - Request header annotation and action short-circuit
//! 3. [`auth`] - Session check and redirects

pub mod auth;
pub mod headers;
pub mod public;

pub use auth::{AuthMiddleware, AuthRoutes};
pub use headers::RequestHeadersMiddleware;
pub use public::PublicPathMiddleware;
