//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use portico_middleware::matcher::DEFAULT_EXCLUDED_PREFIXES;
use portico_middleware::stages::auth::{
    DEFAULT_AUTH_PATHS, DEFAULT_LOGIN_PATH, DEFAULT_LOGIN_REDIRECT, DEFAULT_REDIRECT_PARAM,
    DEFAULT_SIGNUP_PATH,
};
use portico_middleware::stages::headers::{ACTION_HEADER, PATHNAME_HEADER};
use portico_middleware::stages::public::DEFAULT_UNPROTECTED_PATHS;
use portico_middleware::token::DEFAULT_COOKIE_NAME;
use serde::{Deserialize, Serialize};

/// Environment variable consulted when `auth.jwt_secret` is unset.
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";

/// Server configuration section.
///
/// # Example
///
/// ```
/// use portico_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "0.0.0.0:3000".to_string(),
///     shutdown_timeout_secs: 30,
///     request_timeout_ms: 30000,
///     public_origin: "https://app.example.com".to_string(),
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// HTTP server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Origin used to build redirect URLs when a request has no `Host`.
    #[serde(default = "default_public_origin")]
    pub public_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            request_timeout_ms: default_request_timeout(),
            public_origin: default_public_origin(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30000
}

fn default_public_origin() -> String {
    "http://localhost".to_string()
}

/// Route configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RoutesConfig {
    /// Regular expressions for paths that skip the pipeline.
    #[serde(default = "default_unprotected_paths")]
    pub unprotected_paths: Vec<String>,

    /// Exact paths only meaningful without a session.
    #[serde(default = "default_auth_paths")]
    pub auth_paths: Vec<String>,

    /// Login page.
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Landing page for authenticated users leaving an auth path.
    #[serde(default = "default_login_redirect")]
    pub login_redirect: String,

    /// Registration page.
    #[serde(default = "default_signup_path")]
    pub signup_path: String,

    /// Query parameter carrying the post-login destination.
    #[serde(default = "default_redirect_param")]
    pub redirect_param: String,

    /// Redirect authenticated users away from auth paths.
    #[serde(default = "default_true")]
    pub redirect_authenticated_user: bool,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            unprotected_paths: default_unprotected_paths(),
            auth_paths: default_auth_paths(),
            login_path: default_login_path(),
            login_redirect: default_login_redirect(),
            signup_path: default_signup_path(),
            redirect_param: default_redirect_param(),
            redirect_authenticated_user: true,
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

fn default_unprotected_paths() -> Vec<String> {
    to_strings(DEFAULT_UNPROTECTED_PATHS)
}

fn default_auth_paths() -> Vec<String> {
    to_strings(DEFAULT_AUTH_PATHS)
}

fn default_login_path() -> String {
    DEFAULT_LOGIN_PATH.to_string()
}

fn default_login_redirect() -> String {
    DEFAULT_LOGIN_REDIRECT.to_string()
}

fn default_signup_path() -> String {
    DEFAULT_SIGNUP_PATH.to_string()
}

fn default_redirect_param() -> String {
    DEFAULT_REDIRECT_PARAM.to_string()
}

/// Which requests enter the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MatcherConfig {
    /// Path prefixes (after the leading `/`) that bypass the pipeline.
    #[serde(default = "default_excluded_prefixes")]
    pub excluded_prefixes: Vec<String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            excluded_prefixes: default_excluded_prefixes(),
        }
    }
}

fn default_excluded_prefixes() -> Vec<String> {
    to_strings(DEFAULT_EXCLUDED_PREFIXES)
}

/// Header names used by the header stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HeadersConfig {
    /// Header set to the request path.
    #[serde(default = "default_pathname_header")]
    pub pathname_header: String,

    /// Header marking framework action requests.
    #[serde(default = "default_action_header")]
    pub action_header: String,
}

impl Default for HeadersConfig {
    fn default() -> Self {
        Self {
            pathname_header: default_pathname_header(),
            action_header: default_action_header(),
        }
    }
}

fn default_pathname_header() -> String {
    PATHNAME_HEADER.to_string()
}

fn default_action_header() -> String {
    ACTION_HEADER.to_string()
}

/// Session token configuration.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Cookie holding the session token.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Shared HMAC secret. Falls back to the `JWT_SECRET` variable.
    #[serde(default, skip_serializing)]
    pub jwt_secret: Option<String>,

    /// JWT algorithm name (HS256, HS384 or HS512).
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Allowed clock skew for `exp`, in seconds.
    #[serde(default)]
    pub leeway_secs: u64,
}

impl AuthConfig {
    /// Resolves the secret from the config or the `JWT_SECRET` variable.
    ///
    /// Empty values count as unset.
    #[must_use]
    pub fn resolve_secret(&self) -> Option<String> {
        self.jwt_secret
            .clone()
            .or_else(|| std::env::var(JWT_SECRET_ENV).ok())
            .filter(|secret| !secret.is_empty())
    }

    /// Like [`resolve_secret`](Self::resolve_secret), but a missing secret
    /// is an error.
    pub fn secret(&self) -> Result<String, crate::ConfigError> {
        self.resolve_secret().ok_or_else(|| {
            crate::ConfigError::missing_field(format!("auth.jwt_secret (or {JWT_SECRET_ENV})"))
        })
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            jwt_secret: None,
            algorithm: default_algorithm(),
            leeway_secs: 0,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("cookie_name", &self.cookie_name)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("algorithm", &self.algorithm)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

fn default_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.to_string()
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prometheus metrics endpoint address.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level or filter directive (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include ANSI color codes in output.
    #[serde(default)]
    pub ansi_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telemetry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfigSection {
    /// Service name for telemetry identification.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TelemetryConfigSection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "portico".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, "0.0.0.0:3000");
        assert_eq!(config.shutdown_timeout_secs, 30);
        assert_eq!(config.request_timeout_ms, 30000);
        assert_eq!(config.public_origin, "http://localhost");
    }

    #[test]
    fn test_server_config_deserialize() {
        let toml = r#"
            http_addr = "127.0.0.1:4000"
            shutdown_timeout_secs = 5
        "#;
        let config: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.http_addr, "127.0.0.1:4000");
        assert_eq!(config.shutdown_timeout_secs, 5);
        // Defaults applied
        assert_eq!(config.request_timeout_ms, 30000);
    }

    #[test]
    fn test_routes_config_default() {
        let config = RoutesConfig::default();
        assert_eq!(config.login_path, "/login");
        assert_eq!(config.login_redirect, "/dashboard");
        assert_eq!(config.signup_path, "/signup");
        assert_eq!(config.redirect_param, "next");
        assert!(config.redirect_authenticated_user);
        assert_eq!(
            config.auth_paths,
            vec!["/login", "/register", "/forgot-password", "/reset-password"]
        );
        assert_eq!(config.unprotected_paths.len(), DEFAULT_UNPROTECTED_PATHS.len());
    }

    #[test]
    fn test_routes_unknown_field_rejected() {
        let toml = r#"
            login_path = "/signin"
            logout_path = "/signout"
        "#;
        let result: Result<RoutesConfig, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_matcher_and_headers_default() {
        assert_eq!(
            MatcherConfig::default().excluded_prefixes,
            vec!["api", "_next/static", "_next/image", "favicon.ico", "logo.svg"]
        );
        let headers = HeadersConfig::default();
        assert_eq!(headers.pathname_header, "x-pathname");
        assert_eq!(headers.action_header, "next-action");
    }

    #[test]
    fn test_auth_config_default() {
        let config = AuthConfig::default();
        assert_eq!(config.cookie_name, "auth_token");
        assert_eq!(config.algorithm, "HS256");
        assert_eq!(config.leeway_secs, 0);
        assert!(config.jwt_secret.is_none());
    }

    #[test]
    fn test_auth_config_explicit_secret_wins() {
        let config = AuthConfig {
            jwt_secret: Some("from-file".to_string()),
            ..AuthConfig::default()
        };
        assert_eq!(config.resolve_secret().as_deref(), Some("from-file"));
        assert_eq!(config.secret().unwrap(), "from-file");
    }

    #[test]
    fn test_auth_config_debug_redacts_secret() {
        let config = AuthConfig {
            jwt_secret: Some("hunter2".to_string()),
            ..AuthConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_auth_secret_not_serialized() {
        let config = AuthConfig {
            jwt_secret: Some("hunter2".to_string()),
            ..AuthConfig::default()
        };
        let toml = toml::to_string(&config).unwrap();
        assert!(!toml.contains("hunter2"));
    }

    #[test]
    fn test_log_format_deserialize() {
        let format: LogFormat = serde_json::from_str(r#""json""#).unwrap();
        assert_eq!(format, LogFormat::Json);

        let format: LogFormat = serde_json::from_str(r#""pretty""#).unwrap();
        assert_eq!(format, LogFormat::Pretty);
    }

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfigSection::default();
        assert_eq!(config.service_name, "portico");
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.addr, "0.0.0.0:9090");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
