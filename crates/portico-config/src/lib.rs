//! Typed configuration for Portico.
//!
//! - TOML and JSON configuration files
//! - `.env` files and environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Overview
//!
//! [`PorticoConfig`] holds every setting of a Portico server:
//!
//! - [`ServerConfig`] - bind address, timeouts, public origin
//! - [`RoutesConfig`] - unprotected patterns, auth paths, redirect targets
//! - [`MatcherConfig`] - path prefixes that never enter the pipeline
//! - [`HeadersConfig`] - header names used by the header stage
//! - [`AuthConfig`] - session cookie and JWT verification
//! - [`TelemetryConfigSection`] - logging and metrics
//!
//! # Example
//!
//! ```no_run
//! use portico_config::ConfigLoader;
//!
//! # fn main() -> Result<(), portico_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("portico.toml")?
//!     .with_env_prefix("PORTICO")
//!     .load()?;
//!
//! println!("Listening on: {}", config.server.http_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:3000"
//! public_origin = "https://app.example.com"
//!
//! [routes]
//! auth_paths = ["/login", "/register", "/forgot-password", "/reset-password"]
//! login_path = "/login"
//! login_redirect = "/dashboard"
//! redirect_param = "next"
//!
//! [auth]
//! cookie_name = "auth_token"
//! algorithm = "HS256"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables:
//!
//! - `PORTICO__SERVER__HTTP_ADDR=0.0.0.0:8080`
//! - `PORTICO__ROUTES__AUTH_PATHS=/login,/register`
//! - `PORTICO__TELEMETRY__LOGGING__LEVEL=debug`
//!
//! List values are comma-separated, except `ROUTES__UNPROTECTED_PATHS`:
//! its regular expressions are separated by whitespace, since commas occur
//! inside patterns such as `^/\d{1,3}$`.
//!
//! The JWT secret may also come from `JWT_SECRET`.

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
