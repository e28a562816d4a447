// src/market.rs
//! Typed views over the market sentiment index and the market price index payloads.
//! The backend forwards upstream data loosely typed (numbers sometimes arrive as strings),
//! so every numeric field goes through [`lenient_f64`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::aggregate::SourceField;

/// Latest fear & greed reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FearGreed {
    #[serde(deserialize_with = "lenient_f64")]
    pub value: f64,
    #[serde(default)]
    pub value_classification: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub change: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub change_percent: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub day_low: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub day_high: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub year_high: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub year_low: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub market_cap: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub last_updated: f64,
}

/// Market index as shown on the dashboard: a quote, or the inline reason it is unavailable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MarketIndexView {
    Quote(MarketQuote),
    Unavailable { detail: String },
}

impl FearGreed {
    pub fn from_value(v: &Value) -> Option<Self> {
        serde_json::from_value(v.clone())
            .map_err(|e| tracing::warn!(error = %e, "fear & greed payload not understood"))
            .ok()
    }
}

impl MarketIndexView {
    pub fn from_field(field: &SourceField) -> Option<Self> {
        match field {
            SourceField::Ready { value } => serde_json::from_value::<MarketQuote>(value.clone())
                .map(MarketIndexView::Quote)
                .map_err(|e| tracing::warn!(error = %e, "market index payload not understood"))
                .ok(),
            SourceField::Degraded { detail, .. } => Some(MarketIndexView::Unavailable {
                detail: detail.clone(),
            }),
        }
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    })
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
