use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
static DESCRIBED: OnceCell<()> = OnceCell::new();

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Only the first call installs; later calls
    /// (tests, the snapshot binary) reuse the same handle.
    pub fn init() -> anyhow::Result<Self> {
        let handle = HANDLE.get_or_try_init(|| {
            // Default buckets keep us independent of exporter version differences.
            PrometheusBuilder::new().install_recorder()
        })?;
        ensure_described();
        Ok(Self {
            handle: handle.clone(),
        })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// Register descriptions for every series this crate emits. Idempotent.
pub(crate) fn ensure_described() {
    DESCRIBED.get_or_init(|| {
        describe_counter!("aggregate_runs_total", "Aggregation runs started");
        describe_counter!(
            "aggregate_source_outcomes_total",
            "Settled sources by outcome (succeeded | soft_degraded | hard_failed)"
        );
        describe_histogram!("aggregate_run_ms", Unit::Milliseconds, "Wall time of one aggregation run");

        describe_counter!("enrichment_started_total", "Accepted enrichment runs");
        describe_counter!(
            "enrichment_rejected_total",
            "Rejected enrichment starts (text_too_short | already_running)"
        );
        describe_counter!("enrichment_settled_total", "Settled enrichment runs by status");
        describe_histogram!("enrichment_ms", Unit::Milliseconds, "Enrichment run duration");

        describe_counter!(
            "setting_sync_total",
            "Setting persist settlements (confirmed | rolled_back | fallback)"
        );
        describe_counter!("poll_ticks_total", "Completed polling ticks");

        describe_histogram!("remote_call_ms", Unit::Milliseconds, "Backend call duration");
        describe_counter!("remote_call_errors_total", "Failed backend calls by error kind");
    });
}
