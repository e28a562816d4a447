// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod error;
pub mod transport;
pub mod config;

// Orchestration core
pub mod aggregate;
pub mod enrich;
pub mod settings;
pub mod polling;

// Dashboard domain
pub mod news;
pub mod market;
pub mod dashboard;
pub mod admin;
pub mod chat;

pub mod app;
pub mod api;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::app::DashboardApp;
pub use crate::error::{ErrorKind, RemoteCallError, RemoteCallResult};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber. `DASHBOARD_LOG_JSON=1` switches to JSON lines.
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("market_pulse=info,warn"));
    let json = std::env::var("DASHBOARD_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}
