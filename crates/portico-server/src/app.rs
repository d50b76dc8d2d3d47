//! Wiring from [`PorticoConfig`] to runtime components.

use url::Url;

use portico_config::{ConfigError, LogFormat, PorticoConfig};
use portico_middleware::{
    AuthMiddleware, CookieTokenSource, JwtVerifier, PathMatcher, Pipeline,
    PublicPathMiddleware, RequestHeadersMiddleware,
};
use portico_telemetry::TelemetryConfig;

use crate::error::ServerError;

/// Builds the standard Public → Request Headers → Auth pipeline.
///
/// # Errors
///
/// Fails when no JWT secret is configured or any stage rejects its
/// settings.
pub fn assemble_pipeline(config: &PorticoConfig) -> Result<Pipeline, ServerError> {
    let secret = config.auth.secret()?;
    let verifier = JwtVerifier::from_algorithm_name(secret.as_bytes(), &config.auth.algorithm)?
        .with_leeway(config.auth.leeway_secs);

    let auth = AuthMiddleware::new(verifier, config.routes.auth_routes())?
        .with_token_source(CookieTokenSource::new(config.auth.cookie_name.clone()))
        .with_fallback_origin(public_origin(config)?);

    let public = PublicPathMiddleware::new(&config.routes.unprotected_paths)?;
    let headers = RequestHeadersMiddleware::with_header_names(
        &config.headers.pathname_header,
        &config.headers.action_header,
    )?;

    let pipeline = Pipeline::standard(public, headers, auth)?;
    tracing::debug!(stages = ?pipeline.stage_names(), "Pipeline assembled");
    Ok(pipeline)
}

/// Builds the path matcher that decides which requests enter the pipeline.
#[must_use]
pub fn path_matcher(config: &PorticoConfig) -> PathMatcher {
    PathMatcher::new(&config.matcher.excluded_prefixes)
}

/// Maps the telemetry section onto the telemetry crate's configuration.
#[must_use]
pub fn telemetry_config(config: &PorticoConfig) -> TelemetryConfig {
    let section = &config.telemetry;
    TelemetryConfig::builder()
        .service_name(section.service_name.clone())
        .logging_enabled(section.logging.enabled)
        .log_level(section.logging.level.clone())
        .json_logs(section.logging.format == LogFormat::Json)
        .ansi(section.logging.ansi_enabled)
        .metrics_enabled(section.metrics.enabled)
        .metrics_addr(section.metrics.addr.clone())
        .build()
}

fn public_origin(config: &PorticoConfig) -> Result<Url, ConfigError> {
    Url::parse(&config.server.public_origin)
        .map_err(|e| ConfigError::invalid_value("server.public_origin", e.to_string()))
}
