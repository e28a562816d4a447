// src/admin.rs
//! Admin surface: usage metrics and recent backend logs, polled only while open.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::config::AdminConfig;
use crate::error::RemoteCallResult;
use crate::polling::{PollState, PollingRefresher};
use crate::transport::SharedTransport;

pub const METRICS_ERROR: &str = "Failed to fetch metrics.";
pub const LOGS_ERROR: &str = "Failed to fetch logs.";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskUsage {
    pub model: Option<String>,
    pub calls: u64,
    pub success: u64,
    pub failures: u64,
    /// Seconds, weighted towards recent calls by the backend.
    pub average_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageMetrics {
    pub tasks: BTreeMap<String, TaskUsage>,
    pub last_updated: Option<i64>,
}

impl UsageMetrics {
    /// Every object-valued entry is a task; `last_updated` is the snapshot time (unix seconds).
    pub fn from_value(v: &Value) -> Option<Self> {
        let obj = v.as_object()?;
        let tasks = obj
            .iter()
            .filter_map(|(name, entry)| {
                let e = entry.as_object()?;
                let count = |k: &str| e.get(k).and_then(Value::as_u64).unwrap_or(0);
                Some((
                    name.clone(),
                    TaskUsage {
                        model: e.get("model").and_then(Value::as_str).map(str::to_string),
                        calls: count("calls"),
                        success: count("success"),
                        failures: count("failures"),
                        average_time: e.get("average_time").and_then(Value::as_f64).unwrap_or(0.0),
                    },
                ))
            })
            .collect();
        Some(Self {
            tasks,
            last_updated: obj.get("last_updated").and_then(Value::as_i64),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdminPanel {
    pub metrics: Option<UsageMetrics>,
    pub logs: Vec<Value>,
    pub error: Option<String>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct AdminMonitor {
    transport: SharedTransport,
    cfg: AdminConfig,
    refresher: PollingRefresher,
    panel: Arc<Mutex<AdminPanel>>,
}

impl AdminMonitor {
    pub fn new(transport: SharedTransport, cfg: AdminConfig) -> Self {
        Self {
            transport,
            cfg,
            refresher: PollingRefresher::new("admin"),
            panel: Arc::new(Mutex::new(AdminPanel::default())),
        }
    }

    /// Start polling. Fetches once right away. No-op when already open.
    pub fn open(&self) -> bool {
        let this = self.clone();
        self.refresher.activate(
            move || {
                let this = this.clone();
                async move {
                    this.refresh_now().await;
                }
            },
            Duration::from_millis(self.cfg.poll_interval_ms),
        )
    }

    pub fn close(&self) -> bool {
        self.refresher.deactivate()
    }

    pub fn poll_state(&self) -> PollState {
        self.refresher.state()
    }

    pub fn panel(&self) -> AdminPanel {
        self.panel.lock().expect("admin panel poisoned").clone()
    }

    /// Fetch metrics and logs once, independent of polling.
    pub async fn refresh_now(&self) -> AdminPanel {
        let (metrics, logs) = tokio::join!(
            self.transport.get(&self.cfg.metrics_path),
            self.transport.get(&self.cfg.logs_path)
        );
        let mut panel = self.panel.lock().expect("admin panel poisoned");
        apply(&mut panel, metrics, logs);
        panel.clone()
    }
}

fn apply(panel: &mut AdminPanel, metrics: RemoteCallResult<Value>, logs: RemoteCallResult<Value>) {
    let mut errors = Vec::new();
    match metrics.map(|v| UsageMetrics::from_value(&v)) {
        Ok(Some(m)) => panel.metrics = Some(m),
        Ok(None) => {
            tracing::warn!("metrics snapshot is not an object");
            panel.metrics = None;
            errors.push(METRICS_ERROR);
        }
        Err(e) => {
            tracing::warn!(error = %e, "metrics fetch failed");
            panel.metrics = None;
            errors.push(METRICS_ERROR);
        }
    }
    match logs {
        Ok(v) => {
            panel.logs = v
                .get("logs")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
        }
        Err(e) => {
            tracing::warn!(error = %e, "logs fetch failed");
            panel.logs.clear();
            errors.push(LOGS_ERROR);
        }
    }
    panel.error = (!errors.is_empty()).then(|| errors.join(" "));
    panel.last_refreshed_at = Some(Utc::now());
}
