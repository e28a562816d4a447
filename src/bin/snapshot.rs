//! One-shot: run a single dashboard aggregation against the configured backend and print
//! the resulting state as JSON. Exit code 1 when the run itself failed.
//!
//!   cargo run --bin snapshot
//!   DASHBOARD_BACKEND_URL=http://localhost:3001 cargo run --bin snapshot

use std::sync::Arc;

use market_pulse::config::DashboardConfig;
use market_pulse::dashboard::{Dashboard, DashboardState};
use market_pulse::transport::HttpTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    market_pulse::init_tracing();

    let cfg = DashboardConfig::load()?;
    let transport = Arc::new(HttpTransport::new(&cfg.backend)?);
    let dashboard = Dashboard::new(transport, cfg.sources.clone());

    let state = dashboard.refresh().await;
    println!("{}", serde_json::to_string_pretty(&state)?);

    if matches!(state, DashboardState::Failed { .. }) {
        std::process::exit(1);
    }
    Ok(())
}
