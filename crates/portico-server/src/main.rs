//! The `portico` binary.
//!
//! Loads configuration from `portico.toml` (or the file named by
//! `PORTICO_CONFIG`), `.env` and `PORTICO__*` variables, then serves the
//! standard pipeline in front of a placeholder page handler.

use anyhow::Context;
use bytes::Bytes;
use http::{header, StatusCode};
use http_body_util::Full;

use portico_config::ConfigLoader;
use portico_middleware::{Request, Response};
use portico_server::{assemble_pipeline, downstream_fn, telemetry_config, Server};

const CONFIG_PATH_ENV: &str = "PORTICO_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "portico.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = ConfigLoader::new()
        .with_optional_file(&config_path)?
        .with_dotenv()?
        .with_env_prefix("PORTICO")
        .load()
        .with_context(|| format!("loading configuration from {config_path}"))?;

    portico_telemetry::init_telemetry(&telemetry_config(&config))
        .context("initializing telemetry")?;

    let pipeline = assemble_pipeline(&config).context("assembling pipeline")?;

    let pathname_header = config.headers.pathname_header.clone();
    let server = Server::builder()
        .config(&config)
        .pipeline(pipeline)
        .downstream(downstream_fn(move |request: Request| {
            placeholder_page(pathname_header.clone(), request)
        }))
        .build()?;

    server.run().await?;
    Ok(())
}

/// Stands in for the page renderer: echoes what the pipeline annotated.
async fn placeholder_page(pathname_header: String, request: Request) -> Response {
    let pathname = request
        .headers()
        .get(pathname_header.as_str())
        .and_then(|v| v.to_str().ok())
        .unwrap_or(request.uri().path())
        .to_string();

    http::Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(format!("portico: {pathname}\n"))))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}
