//! Main configuration types.
//!
//! This module provides the top-level [`PorticoConfig`] struct and its builder.

use portico_middleware::stages::{AuthRoutes, PublicPathMiddleware, RequestHeadersMiddleware};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    AuthConfig, ConfigError, HeadersConfig, LogFormat, MatcherConfig, RoutesConfig, ServerConfig,
    TelemetryConfigSection,
};

const SUPPORTED_ALGORITHMS: &[&str] = &["HS256", "HS384", "HS512"];

/// Complete Portico configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use portico_config::PorticoConfig;
///
/// let config = PorticoConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:3000");
/// assert_eq!(config.routes.login_path, "/login");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct PorticoConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Public, auth and redirect routes.
    #[serde(default)]
    pub routes: RoutesConfig,

    /// Which requests enter the pipeline.
    #[serde(default)]
    pub matcher: MatcherConfig,

    /// Header names used by the header stage.
    #[serde(default)]
    pub headers: HeadersConfig,

    /// Session token settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Telemetry configuration (metrics, logging).
    #[serde(default)]
    pub telemetry: TelemetryConfigSection,
}

impl PorticoConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> PorticoConfigBuilder {
        PorticoConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// The JWT secret is not required here; it may arrive through the
    /// environment and is checked when the pipeline is assembled (see
    /// [`AuthConfig::secret`]). An explicitly configured secret must not be
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - Server, public origin or metrics address is invalid
    /// - An unprotected path pattern does not compile
    /// - A route is not an absolute path, or the redirect param is empty
    /// - A header name is invalid
    /// - The cookie name is empty, the secret is empty or the algorithm is
    ///   not HS256, HS384 or HS512
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .server
            .http_addr
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        match Url::parse(&self.server.public_origin) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
            _ => {
                return Err(ConfigError::invalid_value(
                    "server.public_origin",
                    format!("expected an http(s) origin: {}", self.server.public_origin),
                ))
            }
        }

        if self.telemetry.metrics.enabled
            && self
                .telemetry
                .metrics
                .addr
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            return Err(ConfigError::invalid_value(
                "telemetry.metrics.addr",
                format!("invalid socket address: {}", self.telemetry.metrics.addr),
            ));
        }

        PublicPathMiddleware::new(&self.routes.unprotected_paths)
            .map_err(|e| ConfigError::invalid_value("routes.unprotected_paths", e.to_string()))?;

        self.routes
            .auth_routes()
            .validate()
            .map_err(|e| ConfigError::invalid_value("routes", e.to_string()))?;

        RequestHeadersMiddleware::with_header_names(
            &self.headers.pathname_header,
            &self.headers.action_header,
        )
        .map_err(|e| ConfigError::invalid_value("headers", e.to_string()))?;

        if self.auth.cookie_name.is_empty() {
            return Err(ConfigError::invalid_value(
                "auth.cookie_name",
                "must not be empty",
            ));
        }

        if self.auth.jwt_secret.as_deref() == Some("") {
            return Err(ConfigError::invalid_value(
                "auth.jwt_secret",
                "must not be empty",
            ));
        }

        if !SUPPORTED_ALGORITHMS.contains(&self.auth.algorithm.as_str()) {
            return Err(ConfigError::invalid_value(
                "auth.algorithm",
                format!(
                    "unsupported algorithm {}, expected one of {}",
                    self.auth.algorithm,
                    SUPPORTED_ALGORITHMS.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// - Pretty log formatting with ANSI colors
    /// - Debug log level
    /// - Loopback bind address
    /// - Metrics exporter disabled
    ///
    /// # Example
    ///
    /// ```
    /// use portico_config::PorticoConfig;
    ///
    /// let config = PorticoConfig::development();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.server.http_addr = "127.0.0.1:3000".to_string();

        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.ansi_enabled = true;

        config.telemetry.metrics.enabled = false;

        config
    }

    /// Create a production configuration preset.
    ///
    /// - JSON log formatting
    /// - Info log level
    /// - Metrics exporter enabled
    ///
    /// # Example
    ///
    /// ```
    /// use portico_config::PorticoConfig;
    ///
    /// let config = PorticoConfig::production();
    /// assert_eq!(config.telemetry.logging.format, portico_config::LogFormat::Json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.logging.ansi_enabled = false;

        config.telemetry.metrics.enabled = true;

        config
    }
}

impl RoutesConfig {
    /// Converts the route section into the auth stage's route table.
    #[must_use]
    pub fn auth_routes(&self) -> AuthRoutes {
        AuthRoutes {
            auth_paths: self.auth_paths.clone(),
            login_path: self.login_path.clone(),
            login_redirect: self.login_redirect.clone(),
            signup_path: self.signup_path.clone(),
            redirect_param: self.redirect_param.clone(),
            redirect_authenticated_user: self.redirect_authenticated_user,
        }
    }
}

/// Builder for [`PorticoConfig`].
#[derive(Debug, Default)]
pub struct PorticoConfigBuilder {
    server: Option<ServerConfig>,
    routes: Option<RoutesConfig>,
    matcher: Option<MatcherConfig>,
    headers: Option<HeadersConfig>,
    auth: Option<AuthConfig>,
    telemetry: Option<TelemetryConfigSection>,
}

impl PorticoConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server configuration.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the route configuration.
    #[must_use]
    pub fn routes(mut self, routes: RoutesConfig) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Set the matcher configuration.
    #[must_use]
    pub fn matcher(mut self, matcher: MatcherConfig) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Set the header configuration.
    #[must_use]
    pub fn headers(mut self, headers: HeadersConfig) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Set the auth configuration.
    #[must_use]
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfigSection) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Build the configuration.
    ///
    /// Any unset sections will use their default values.
    #[must_use]
    pub fn build(self) -> PorticoConfig {
        PorticoConfig {
            server: self.server.unwrap_or_default(),
            routes: self.routes.unwrap_or_default(),
            matcher: self.matcher.unwrap_or_default(),
            headers: self.headers.unwrap_or_default(),
            auth: self.auth.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<PorticoConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_of(config: &PorticoConfig) -> String {
        config.validate().unwrap_err().to_string()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(PorticoConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_keeps_unset_sections_default() {
        let config = PorticoConfig::builder()
            .server(ServerConfig {
                http_addr: "127.0.0.1:8000".to_string(),
                ..Default::default()
            })
            .build();

        assert_eq!(config.server.http_addr, "127.0.0.1:8000");
        assert_eq!(config.routes, RoutesConfig::default());
        assert_eq!(config.telemetry.service_name, "portico");
    }

    #[test]
    fn test_validate_invalid_server_addr() {
        let config = PorticoConfig::builder()
            .server(ServerConfig {
                http_addr: "localhost".to_string(),
                ..Default::default()
            })
            .build();
        assert!(error_of(&config).contains("server.http_addr"));
    }

    #[test]
    fn test_validate_invalid_public_origin() {
        let config = PorticoConfig::builder()
            .server(ServerConfig {
                public_origin: "ftp://files.example.com".to_string(),
                ..Default::default()
            })
            .build();
        assert!(error_of(&config).contains("server.public_origin"));
    }

    #[test]
    fn test_validate_metrics_addr_only_when_enabled() {
        let mut config = PorticoConfig::default();
        config.telemetry.metrics.addr = "nope".to_string();
        assert!(error_of(&config).contains("telemetry.metrics.addr"));

        config.telemetry.metrics.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_pattern() {
        let config = PorticoConfig::builder()
            .routes(RoutesConfig {
                unprotected_paths: vec!["^/(docs".to_string()],
                ..Default::default()
            })
            .build();
        assert!(error_of(&config).contains("routes.unprotected_paths"));
    }

    #[test]
    fn test_validate_relative_login_path() {
        let config = PorticoConfig::builder()
            .routes(RoutesConfig {
                login_path: "login".to_string(),
                ..Default::default()
            })
            .build();
        assert!(error_of(&config).contains("routes"));
    }

    #[test]
    fn test_validate_bad_header_name() {
        let config = PorticoConfig::builder()
            .headers(HeadersConfig {
                pathname_header: "x path".to_string(),
                ..Default::default()
            })
            .build();
        assert!(error_of(&config).contains("headers"));
    }

    #[test]
    fn test_validate_auth_section() {
        let mut config = PorticoConfig::default();
        config.auth.jwt_secret = Some(String::new());
        assert!(error_of(&config).contains("auth.jwt_secret"));

        let mut config = PorticoConfig::default();
        config.auth.algorithm = "RS256".to_string();
        assert!(error_of(&config).contains("auth.algorithm"));

        let mut config = PorticoConfig::default();
        config.auth.cookie_name = String::new();
        assert!(error_of(&config).contains("auth.cookie_name"));
    }

    #[test]
    fn test_development_preset() {
        let config = PorticoConfig::development();
        assert_eq!(config.server.http_addr, "127.0.0.1:3000");
        assert_eq!(config.telemetry.logging.level, "debug");
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
        assert!(config.telemetry.logging.ansi_enabled);
        assert!(!config.telemetry.metrics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_production_preset() {
        let config = PorticoConfig::production();
        assert_eq!(config.telemetry.logging.level, "info");
        assert_eq!(config.telemetry.logging.format, LogFormat::Json);
        assert!(!config.telemetry.logging.ansi_enabled);
        assert!(config.telemetry.metrics.enabled);
    }

    #[test]
    fn test_auth_routes_conversion() {
        let routes = RoutesConfig {
            login_redirect: "/home".to_string(),
            redirect_authenticated_user: false,
            ..Default::default()
        };
        let auth_routes = routes.auth_routes();
        assert_eq!(auth_routes.login_redirect, "/home");
        assert!(!auth_routes.redirect_authenticated_user);
        assert!(auth_routes.is_auth_path("/register"));
    }

    #[test]
    fn test_toml_round_trip_shape() {
        let toml_str = toml::to_string_pretty(&PorticoConfig::default()).unwrap();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[routes]"));
        assert!(toml_str.contains("[auth]"));
    }

    #[test]
    fn test_unknown_section_rejected() {
        let toml_str = r#"
            [session]
            ttl = 3600
        "#;
        let result: Result<PorticoConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }
}
