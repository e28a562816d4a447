//! Market pulse dashboard: binary entrypoint.
//! Loads config, wires the components against the backend, runs the first aggregation
//! and serves the local JSON API.

use std::sync::Arc;

use anyhow::Context;
use market_pulse::config::DashboardConfig;
use market_pulse::metrics::Metrics;
use market_pulse::transport::HttpTransport;
use market_pulse::{router, DashboardApp};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    market_pulse::init_tracing();

    let cfg = DashboardConfig::load()?;
    let metrics = match Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = %e, "prometheus recorder not installed; /metrics disabled");
            None
        }
    };

    let transport = Arc::new(HttpTransport::new(&cfg.backend)?);
    let app = DashboardApp::new(&cfg, transport);

    let initial = app.bootstrap().await;
    tracing::info!(state = initial.status(), backend = %cfg.backend.base_url, "initial load finished");

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("bind {}", cfg.server.bind))?;
    tracing::info!(bind = %cfg.server.bind, "serving dashboard API");
    axum::serve(listener, router(app, metrics.as_ref()))
        .await
        .context("server error")?;
    Ok(())
}
