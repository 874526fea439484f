//! Logging service entry point.
//!
//! Loads configuration, applies command-line overrides, sets up tracing and
//! the log/metrics sinks, then serves a demonstration service:
//! - `GET /`: times a short sleep, logs the caller, requires a JSON content
//!   type, echoes `X-Request-Id` and answers 201 with the app URL
//! - `POST /`: halts with 300

use std::path::PathBuf;
use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;

use logging_app::codec::Value;
use logging_app::config::{self, AppConfig};
use logging_app::http::{HttpError, HttpServer, RequestContext, X_REQUEST_ID};
use logging_app::lifecycle::{self, signals, Shutdown};
use logging_app::observability::logging;

#[derive(Parser)]
#[command(name = "logging-app")]
#[command(about = "HTTP service with request logging and timing metrics", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (keeps the configured host).
    #[arg(short, long)]
    port: Option<u16>,

    /// Service identifier for logs and metrics.
    #[arg(long)]
    service_id: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// File (or defaults), then overrides, then validation of the result.
    fn load(&self) -> Result<AppConfig, config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => config::load_config(path)?,
            None => AppConfig::default(),
        };

        if let Some(port) = self.port {
            let host = config
                .listener
                .bind_address
                .rsplit_once(':')
                .map_or("0.0.0.0", |(host, _)| host)
                .to_string();
            config.listener.bind_address = format!("{host}:{port}");
        }
        if let Some(id) = &self.service_id {
            config.service.id = id.clone();
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }

        config::validate_config(&config).map_err(config::ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    logging::init_tracing(&config.observability);

    tracing::info!(
        service_id = %config.service.service_id(),
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.http.request_timeout_secs,
        "Configuration loaded"
    );

    let state = lifecycle::build_state(&config).await?;
    let server = HttpServer::new(&config, state, routes());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn routes() -> Router {
    Router::new().route("/", get(index).post(reject))
}

async fn index(ctx: RequestContext) -> Result<impl IntoResponse, HttpError> {
    ctx.timeit_async("metric", tokio::time::sleep(Duration::from_millis(100)))
        .await;
    ctx.logvalue("caller", ctx.caller())?;
    ctx.require_json_content_type()?;
    ctx.set_headers([(X_REQUEST_ID.as_str(), ctx.request_id())])?;

    let body = ctx.json(&Value::object([("url", ctx.appurl())]))?;
    Ok((
        StatusCode::CREATED,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    ))
}

async fn reject(ctx: RequestContext) -> Result<(), HttpError> {
    Err(ctx.halt(StatusCode::MULTIPLE_CHOICES, None))
}
