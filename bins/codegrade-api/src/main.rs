mod handlers;
mod routes;

use anyhow::Context;
use axum::Router;
use codegrade_common::config::Settings;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub redis: ConnectionManager,
    pub result_ttl_secs: u64,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("CodeGrade API booting...");

    let settings = Settings::from_env();

    let client = redis::Client::open(settings.redis_url.as_str())
        .with_context(|| format!("Invalid REDIS_URL '{}'", settings.redis_url))?;
    let redis_conn = ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;

    info!("Connected to Redis: {}", settings.redis_url);

    let state = Arc::new(AppState {
        redis: redis_conn,
        result_ttl_secs: settings.result_ttl_secs,
    });

    let app = Router::new().merge(routes::routes()).with_state(state);

    let listener = TcpListener::bind(&settings.api_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.api_addr))?;

    info!("HTTP server listening on {}", settings.api_addr);
    info!("Ready to accept submissions");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
