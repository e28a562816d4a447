// tests/admin_monitor.rs
//
// Admin polling: fetch on open, recover on the next tick after a failure, stop on close.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use market_pulse::admin::{AdminMonitor, LOGS_ERROR, METRICS_ERROR};
use market_pulse::config::AdminConfig;
use market_pulse::error::RemoteCallError;
use market_pulse::transport::ScriptedTransport;

fn cfg() -> AdminConfig {
    AdminConfig {
        poll_interval_ms: 10_000,
        ..AdminConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn failure_is_shown_then_recovered_on_next_tick() {
    let t = Arc::new(ScriptedTransport::new());
    t.on_get("/api/metrics", Err(RemoteCallError::remote(Some(500), "boom")))
        .on_get(
            "/api/metrics",
            Ok(json!({
                "summarization": {"calls": 4, "success": 4, "failures": 0, "average_time": 1.2},
                "last_updated": 1714953600
            })),
        );
    t.on_get("/api/logs", Ok(json!({"logs": [{"level": "INFO", "message": "started"}]})));

    let admin = AdminMonitor::new(t.clone(), cfg());
    assert!(admin.open());
    tokio::time::sleep(Duration::from_millis(1)).await;

    let panel = admin.panel();
    assert_eq!(panel.metrics, None);
    assert_eq!(panel.error.as_deref(), Some(METRICS_ERROR));
    assert_eq!(panel.logs.len(), 1);
    assert!(admin.poll_state().active);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let panel = admin.panel();
    assert_eq!(panel.error, None);
    let metrics = panel.metrics.expect("metrics after recovery");
    assert_eq!(metrics.tasks["summarization"].calls, 4);
    assert_eq!(admin.poll_state().ticks, 2);
}

#[tokio::test(start_paused = true)]
async fn closed_monitor_stops_fetching() {
    let t = Arc::new(ScriptedTransport::new());
    t.on_get("/api/metrics", Ok(json!({"last_updated": 1})));
    t.on_get("/api/logs", Err(RemoteCallError::network("down")));

    let admin = AdminMonitor::new(t.clone(), cfg());
    admin.open();
    assert!(!admin.open(), "already open");
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(admin.panel().error.as_deref(), Some(LOGS_ERROR));
    assert_eq!(t.calls_to("/api/metrics"), 1);

    assert!(admin.close());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(t.calls_to("/api/metrics"), 1);
    assert!(!admin.poll_state().active);
}

#[tokio::test]
async fn manual_refresh_works_without_polling() {
    let t = Arc::new(ScriptedTransport::new());
    t.on_get("/api/metrics", Ok(json!({"chat": {"calls": 1}})));
    t.on_get("/api/logs", Ok(json!({})));

    let admin = AdminMonitor::new(t, cfg());
    let panel = admin.refresh_now().await;
    assert!(panel.metrics.is_some());
    assert!(panel.logs.is_empty());
    assert!(panel.last_refreshed_at.is_some());
    assert!(!admin.poll_state().active);
}
