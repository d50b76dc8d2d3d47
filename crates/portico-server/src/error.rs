//! Server error types.

use thiserror::Error;

use portico_config::ConfigError;
use portico_middleware::PipelineError;

/// Errors raised while assembling or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be parsed or bound.
    #[error("bind error: {0}")]
    BindError(String),

    /// The configuration is unusable.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The middleware pipeline could not be built.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// A server was built without a required component.
    #[error("missing server component: {0}")]
    MissingComponent(&'static str),

    /// An I/O error from the listener.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
