// src/aggregate/mod.rs
//! Fan-out/fan-in over independently failing sources.
//!
//! Every source is fetched on its own task and every outcome is observed exactly once.
//! One slow or broken source never blocks or poisons the others: the run settles only after
//! all sources settle, and per-source errors are folded into the [`AggregateResult`] rather than
//! propagated. Only a malformed run (duplicate names or fields) is returned as an error.

mod result;
mod spec;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, histogram};
use serde_json::Value;
use thiserror::Error;

use crate::error::{contained, RemoteCallError, RemoteCallResult};

pub use result::{AggregateResult, SourceField, SourceOutcome};
pub use spec::{FetchFuture, SourceSpec};

/// Orchestration defects. Per-source failures never show up here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("source '{0}' declared twice in one run")]
    DuplicateSource(String),
    #[error("field '{field}' is mapped by both '{first}' and '{second}'")]
    DuplicateField {
        field: String,
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SourceAggregator;

impl SourceAggregator {
    pub fn new() -> Self {
        crate::metrics::ensure_described();
        Self
    }

    /// Fetch all sources concurrently and wait for every one of them to settle.
    pub async fn run(&self, specs: Vec<SourceSpec>) -> Result<AggregateResult, AggregateError> {
        validate(&specs)?;
        let t0 = Instant::now();
        counter!("aggregate_runs_total").increment(1);

        // Spawn everything first; awaiting the handles in order afterwards still completes
        // within the slowest source's time because all fetches are already in flight.
        let in_flight: Vec<_> = specs
            .into_iter()
            .map(|spec| {
                let (meta, fetch) = spec.into_parts();
                let handle = tokio::spawn(contained(async move { fetch().await }));
                (meta, handle)
            })
            .collect();

        let mut per_source = BTreeMap::new();
        let mut fields = BTreeMap::new();
        let mut hard_failures = Vec::new();
        let mut soft_degradations = Vec::new();

        for (meta, handle) in in_flight {
            // `contained` already maps panics; only runtime shutdown can fail the outer join.
            let outcome = handle.await.unwrap_or_else(|e| {
                Err(RemoteCallError::network(format!("source fetch cancelled: {e}")))
            });
            let (recorded, field, settled) = settle(&meta, outcome);
            counter!(
                "aggregate_source_outcomes_total",
                "source" => meta.name.clone(),
                "outcome" => settled.as_str()
            )
            .increment(1);

            match settled {
                SourceOutcome::Succeeded => {
                    tracing::debug!(source = %meta.name, "source loaded");
                }
                SourceOutcome::SoftDegraded => {
                    if let Err(e) = &recorded {
                        tracing::warn!(source = %meta.name, status = ?e.status_code, detail = %e.detail, "source degraded");
                    }
                    soft_degradations.push(meta.name.clone());
                }
                SourceOutcome::HardFailed => {
                    if let Err(e) = &recorded {
                        tracing::warn!(source = %meta.name, kind = %e.kind, status = ?e.status_code, detail = %e.detail, "source failed");
                    }
                    hard_failures.push(meta.name.clone());
                }
            }
            if let Some(field) = field {
                fields.insert(meta.maps_to.clone(), field);
            }
            per_source.insert(meta.name, recorded);
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("aggregate_run_ms").record(ms);
        tracing::info!(
            sources = per_source.len(),
            hard = hard_failures.len(),
            soft = soft_degradations.len(),
            elapsed_ms = ms,
            "aggregation settled"
        );

        Ok(AggregateResult {
            per_source,
            fields,
            hard_failures,
            soft_degradations,
            completed_at: Utc::now(),
        })
    }
}

fn validate(specs: &[SourceSpec]) -> Result<(), AggregateError> {
    let mut names = BTreeSet::new();
    let mut fields: BTreeMap<&str, &str> = BTreeMap::new();
    for s in specs {
        if !names.insert(s.name.as_str()) {
            return Err(AggregateError::DuplicateSource(s.name.clone()));
        }
        if let Some(first) = fields.insert(s.maps_to.as_str(), s.name.as_str()) {
            return Err(AggregateError::DuplicateField {
                field: s.maps_to.clone(),
                first: first.to_string(),
                second: s.name.clone(),
            });
        }
    }
    Ok(())
}

/// Classify one settled outcome into (recorded result, field value, bucket).
fn settle(
    meta: &spec::SourceMeta,
    outcome: RemoteCallResult<Value>,
) -> (RemoteCallResult<Value>, Option<SourceField>, SourceOutcome) {
    match outcome {
        Ok(value) => match missing_key(meta, &value) {
            None => (
                Ok(value.clone()),
                Some(SourceField::Ready { value }),
                SourceOutcome::Succeeded,
            ),
            Some(key) => (
                Err(RemoteCallError::remote(None, format!("missing '{key}' in payload"))),
                None,
                SourceOutcome::HardFailed,
            ),
        },
        Err(e) if e.status_in(&meta.degrade_on) => {
            let soft = e.into_soft();
            let field = SourceField::Degraded {
                detail: soft.detail.clone(),
                status_code: soft.status_code,
            };
            (Err(soft), Some(field), SourceOutcome::SoftDegraded)
        }
        Err(e) => (Err(e), None, SourceOutcome::HardFailed),
    }
}

fn missing_key<'a>(meta: &'a spec::SourceMeta, value: &Value) -> Option<&'a str> {
    let key = meta.required_key.as_deref()?;
    match value.get(key) {
        Some(v) if !v.is_null() => None,
        _ => Some(key),
    }
}
