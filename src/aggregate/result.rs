// src/aggregate/result.rs
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::RemoteCallResult;

/// Value written into an aggregate field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SourceField {
    Ready {
        value: Value,
    },
    /// Tolerated failure rendered inline instead of leaving the field empty.
    Degraded {
        detail: String,
        status_code: Option<u16>,
    },
}

/// Which bucket a settled source ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOutcome {
    Succeeded,
    SoftDegraded,
    HardFailed,
}

impl SourceOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceOutcome::Succeeded => "succeeded",
            SourceOutcome::SoftDegraded => "soft_degraded",
            SourceOutcome::HardFailed => "hard_failed",
        }
    }
}

/// Snapshot of one aggregation run. Built once after every source settled; never mutated.
///
/// A source name appears in at most one of `hard_failures` / `soft_degradations`;
/// names in neither succeeded. Both lists keep the order in which sources were declared.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateResult {
    pub per_source: BTreeMap<String, RemoteCallResult<Value>>,
    pub fields: BTreeMap<String, SourceField>,
    pub hard_failures: Vec<String>,
    pub soft_degradations: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl AggregateResult {
    pub fn field(&self, name: &str) -> Option<&SourceField> {
        self.fields.get(name)
    }

    /// Payload of a field that loaded successfully.
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.fields.get(name)? {
            SourceField::Ready { value } => Some(value),
            SourceField::Degraded { .. } => None,
        }
    }

    pub fn outcome_of(&self, source: &str) -> Option<SourceOutcome> {
        if !self.per_source.contains_key(source) {
            return None;
        }
        Some(if self.hard_failures.iter().any(|n| n == source) {
            SourceOutcome::HardFailed
        } else if self.soft_degradations.iter().any(|n| n == source) {
            SourceOutcome::SoftDegraded
        } else {
            SourceOutcome::Succeeded
        })
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.hard_failures.is_empty() && self.soft_degradations.is_empty()
    }

    /// One message naming the hard failures. Soft degradations are left out: they already
    /// carry their detail inline.
    pub fn failure_summary(&self) -> Option<String> {
        if self.hard_failures.is_empty() {
            return None;
        }
        Some(format!(
            "Failed to load some data: {}.",
            self.hard_failures.join(", ")
        ))
    }
}
