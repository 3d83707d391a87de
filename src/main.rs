//! HTTP bridge demo server.
//!
//! Loads an optional TOML config, serves a few routes through one request
//! handler and stops gracefully on Ctrl+C / SIGTERM.
//!
//! ```text
//! GET  /ping             → "pong"
//! *    /echo             → the normalized request as JSON
//! GET  /static/{*path}   → files under --static-dir (when given)
//! ```

use std::path::PathBuf;

use clap::Parser;

use http_bridge::config::{load_config, ConnectionConfig, ServerConfig};
use http_bridge::http::{Header, Reply, ReplyError, ReplySession};
use http_bridge::lifecycle::signals::shutdown_signal;
use http_bridge::observability::{logging, metrics};
use http_bridge::plugins::static_files::{self, DirectoryConfig, StaticFilesOptions};
use http_bridge::{NormalizedRequest, RouteConfig, ServerHandle};

#[derive(Parser)]
#[command(name = "http-bridge")]
#[command(about = "Serve HTTP requests through a single value-based handler", long_about = None)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind when the config lists no connections.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind when the config lists no connections.
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Directory served under /static.
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    logging::init_logging(&config.settings.observability);

    tracing::info!("http-bridge v{} starting", env!("CARGO_PKG_VERSION"));

    if config.settings.observability.metrics_enabled {
        match config.settings.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.settings.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    if config.connections.is_empty() {
        config.connections.push(ConnectionConfig::new(args.host.clone(), args.port));
    }

    let mut server = ServerHandle::create(config)?;
    server
        .with_route(RouteConfig::new("GET", "/ping"))
        .with_route(RouteConfig::new("*", "/echo"));

    if let Some(dir) = args.static_dir {
        server
            .with_plugins([static_files::plugin(StaticFilesOptions {
                relative_to: Some(dir),
            })])
            .await?;
        server.with_route(RouteConfig::new("GET", "/static/{*path}"));
    }

    server.on_request(handle);
    server.start().await?;

    for info in server.get_infos() {
        tracing::info!(uri = %info.uri, connection = %info.id, "Accepting requests");
    }

    shutdown_signal().await;
    server.stop().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn handle(mut session: ReplySession, request: NormalizedRequest) {
    match respond(&mut session, &request).await {
        Ok(()) => {}
        Err(e) if e.is_fatal() => {
            tracing::debug!(request_id = %request.id, error = %e, "Client went away");
        }
        Err(e) => {
            tracing::warn!(request_id = %request.id, error = %e, "Reply failed");
        }
    }
}

async fn respond(session: &mut ReplySession, request: &NormalizedRequest) -> Result<(), ReplyError> {
    match request.path.as_str() {
        "/ping" => {
            session.reply(Reply::full(200, "pong"))?;
        }
        "/echo" => {
            let body = serde_json::to_vec_pretty(request).unwrap_or_default();
            session
                .with_header(&Header::new("content-type", "application/json"))?
                .with_body(body)?
                .send(true)?;
        }
        path if path.starts_with("/static/") => {
            session
                .reply_static(&static_files::directory(DirectoryConfig::new(".")))
                .await?;
        }
        _ => {
            session.reply(Reply::full(404, "Not Found"))?;
        }
    }
    Ok(())
}
