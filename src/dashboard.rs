// src/dashboard.rs
//! The four standard dashboard sources and the typed view built from one aggregation run.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{AggregateResult, SourceAggregator, SourceSpec};
use crate::config::SourcesConfig;
use crate::enrich::EntityKey;
use crate::market::{FearGreed, MarketIndexView};
use crate::news::{parse_articles, Article};
use crate::transport::SharedTransport;

pub const FEAR_GREED: &str = "Fear & Greed";
pub const MARKET_INDEX: &str = "Market Index";
pub const CRYPTO_NEWS: &str = "Crypto News";
pub const WORLD_NEWS: &str = "World News";

pub const FIELD_FEAR_GREED: &str = "fear_greed";
pub const FIELD_MARKET_INDEX: &str = "market_index";
pub const FIELD_CRYPTO_NEWS: &str = "crypto_news";
pub const FIELD_WORLD_NEWS: &str = "world_news";

/// Market sentiment and both news feeds fail hard; the market index degrades on the
/// configured status codes (plan limits).
pub fn standard_sources(cfg: &SourcesConfig, transport: &SharedTransport) -> Vec<SourceSpec> {
    vec![
        SourceSpec::get(FEAR_GREED, FIELD_FEAR_GREED, transport.clone(), &cfg.fear_greed_path),
        SourceSpec::get(MARKET_INDEX, FIELD_MARKET_INDEX, transport.clone(), &cfg.market_index_path)
            .degrade_on(cfg.market_index_degrade_on.iter().copied()),
        SourceSpec::get(CRYPTO_NEWS, FIELD_CRYPTO_NEWS, transport.clone(), &cfg.crypto_news_path)
            .require_key("articles"),
        SourceSpec::get(WORLD_NEWS, FIELD_WORLD_NEWS, transport.clone(), &cfg.world_news_path)
            .require_key("articles"),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub fear_greed: Option<FearGreed>,
    pub market_index: Option<MarketIndexView>,
    pub crypto_news: Option<Vec<Article>>,
    pub world_news: Option<Vec<Article>>,
    pub failure_summary: Option<String>,
    pub hard_failures: Vec<String>,
    pub soft_degradations: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl DashboardView {
    pub fn from_aggregate(res: &AggregateResult) -> Self {
        Self {
            fear_greed: res.value(FIELD_FEAR_GREED).and_then(FearGreed::from_value),
            market_index: res
                .field(FIELD_MARKET_INDEX)
                .and_then(MarketIndexView::from_field),
            crypto_news: res.value(FIELD_CRYPTO_NEWS).map(parse_articles),
            world_news: res.value(FIELD_WORLD_NEWS).map(parse_articles),
            failure_summary: res.failure_summary(),
            hard_failures: res.hard_failures.clone(),
            soft_degradations: res.soft_degradations.clone(),
            completed_at: res.completed_at,
        }
    }

    fn articles(&self) -> impl Iterator<Item = &Article> {
        self.crypto_news
            .iter()
            .chain(self.world_news.iter())
            .flatten()
    }

    /// Keys of every trackable article in this view.
    pub fn entity_keys(&self) -> HashSet<EntityKey> {
        self.articles().filter_map(Article::entity_key).collect()
    }

    pub fn find_article(&self, key: &EntityKey) -> Option<&Article> {
        self.articles()
            .find(|a| a.entity_key().as_ref() == Some(key))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DashboardState {
    Loading,
    Ready { view: DashboardView },
    /// The run itself was malformed. Source failures never end up here.
    Failed { error: String },
}

impl DashboardState {
    pub fn status(&self) -> &'static str {
        match self {
            DashboardState::Loading => "loading",
            DashboardState::Ready { .. } => "ready",
            DashboardState::Failed { .. } => "failed",
        }
    }
}

/// Re-runnable aggregation over the standard sources.
#[derive(Clone)]
pub struct Dashboard {
    transport: SharedTransport,
    sources: SourcesConfig,
    aggregator: SourceAggregator,
    state: Arc<Mutex<Published>>,
    runs: Arc<AtomicU64>,
}

struct Published {
    state: DashboardState,
    /// Run number that produced `state`; an older run finishing late is discarded.
    run: u64,
}

impl Dashboard {
    pub fn new(transport: SharedTransport, sources: SourcesConfig) -> Self {
        Self {
            transport,
            sources,
            aggregator: SourceAggregator::new(),
            state: Arc::new(Mutex::new(Published {
                state: DashboardState::Loading,
                run: 0,
            })),
            runs: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> DashboardState {
        self.state.lock().expect("dashboard state poisoned").state.clone()
    }

    pub fn view(&self) -> Option<DashboardView> {
        match &self.state.lock().expect("dashboard state poisoned").state {
            DashboardState::Ready { view } => Some(view.clone()),
            _ => None,
        }
    }

    /// Run one aggregation and publish it. The previous view stays visible meanwhile.
    pub async fn refresh(&self) -> DashboardState {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let specs = standard_sources(&self.sources, &self.transport);
        let next = match self.aggregator.run(specs).await {
            Ok(res) => {
                let view = DashboardView::from_aggregate(&res);
                if let Some(summary) = &view.failure_summary {
                    tracing::warn!(run, %summary, "dashboard partially loaded");
                } else {
                    tracing::info!(run, soft = view.soft_degradations.len(), "dashboard loaded");
                }
                DashboardState::Ready { view }
            }
            Err(e) => {
                tracing::error!(run, error = %e, "dashboard aggregation failed");
                DashboardState::Failed {
                    error: e.to_string(),
                }
            }
        };

        let mut published = self.state.lock().expect("dashboard state poisoned");
        if run > published.run {
            published.run = run;
            published.state = next;
        } else {
            tracing::debug!(run, newer = published.run, "late dashboard run discarded");
        }
        published.state.clone()
    }
}
