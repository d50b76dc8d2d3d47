//! # Portico Server
//!
//! HTTP front end for the Portico request pipeline.
//!
//! The server accepts connections with hyper, decides per request whether
//! the pipeline applies, and then either answers with the pipeline's
//! redirect or hands the request (with its annotated headers) to a
//! [`Downstream`] handler.
//!
//! ## Assembly from configuration
//!
//! ```rust,ignore
//! use portico_config::ConfigLoader;
//! use portico_server::{assemble_pipeline, downstream_fn, Server};
//!
//! let config = ConfigLoader::new().with_env_prefix("PORTICO").load()?;
//! let server = Server::builder()
//!     .config(&config)
//!     .pipeline(assemble_pipeline(&config)?)
//!     .downstream(downstream_fn(render_page))
//!     .build()?;
//! server.run().await?;
//! ```

#![doc(html_root_url = "https://docs.rs/portico-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
pub mod downstream;
pub mod error;
pub mod server;
pub mod shutdown;

pub use app::{assemble_pipeline, path_matcher, telemetry_config};
pub use downstream::{downstream_fn, Downstream, FnDownstream};
pub use error::ServerError;
pub use server::{Server, ServerBuilder};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownReceiver, ShutdownSignal};
