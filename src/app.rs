// src/app.rs
//! Wires every component from one config and one transport.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::admin::AdminMonitor;
use crate::chat::{ChatError, ChatReply, ChatSession};
use crate::config::DashboardConfig;
use crate::dashboard::{Dashboard, DashboardState};
use crate::enrich::{Enricher, Enrichment, EntityKey, StartError, TaskKind, TaskSlot};
use crate::settings::{ModelOption, ModelSelectionBackend, OptimisticRemoteSetting};
use crate::transport::SharedTransport;

pub type ModelSetting = OptimisticRemoteSetting<ModelSelectionBackend>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingName {
    Summarization,
    Sentiment,
    Chat,
}

impl SettingName {
    pub const ALL: [SettingName; 3] = [
        SettingName::Summarization,
        SettingName::Sentiment,
        SettingName::Chat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingName::Summarization => "summarization",
            SettingName::Sentiment => "sentiment",
            SettingName::Chat => "chat",
        }
    }
}

impl fmt::Display for SettingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "summarization" | "summarize" => Ok(SettingName::Summarization),
            "sentiment" => Ok(SettingName::Sentiment),
            "chat" => Ok(SettingName::Chat),
            other => Err(format!("unknown setting '{other}'")),
        }
    }
}

/// Why an enrichment request did not start.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrichError {
    #[error("no article with key '{0}' in the current view")]
    UnknownEntity(String),
    #[error(transparent)]
    Rejected(#[from] StartError),
}

#[derive(Clone)]
pub struct DashboardApp {
    pub dashboard: Dashboard,
    pub enricher: Enricher,
    pub summarization_model: ModelSetting,
    pub sentiment_model: ModelSetting,
    pub chat_model: ModelSetting,
    pub admin: AdminMonitor,
    pub chat: ChatSession,
}

impl DashboardApp {
    pub fn new(cfg: &DashboardConfig, transport: SharedTransport) -> Self {
        let model = |name: SettingName, endpoints| {
            OptimisticRemoteSetting::new(ModelSelectionBackend::new(
                name.as_str(),
                transport.clone(),
                endpoints,
            ))
        };
        Self {
            dashboard: Dashboard::new(transport.clone(), cfg.sources.clone()),
            enricher: Enricher::new(transport.clone(), &cfg.enrichment),
            summarization_model: model(SettingName::Summarization, cfg.models.summarization.clone()),
            sentiment_model: model(SettingName::Sentiment, cfg.models.sentiment.clone()),
            chat_model: model(SettingName::Chat, cfg.models.chat.clone()),
            admin: AdminMonitor::new(transport.clone(), cfg.admin.clone()),
            chat: ChatSession::new(transport, &cfg.chat),
        }
    }

    pub fn setting(&self, name: SettingName) -> &ModelSetting {
        match name {
            SettingName::Summarization => &self.summarization_model,
            SettingName::Sentiment => &self.sentiment_model,
            SettingName::Chat => &self.chat_model,
        }
    }

    pub fn setting_options(&self, name: SettingName) -> Vec<ModelOption> {
        self.setting(name).backend().options()
    }

    /// Initialize every setting, then load the dashboard. Settings that fail to initialize
    /// stay uninitialized; the failure is logged.
    pub async fn bootstrap(&self) -> DashboardState {
        let (a, b, c) = tokio::join!(
            self.summarization_model.initialize(),
            self.sentiment_model.initialize(),
            self.chat_model.initialize()
        );
        let failed = [a.is_err(), b.is_err(), c.is_err()]
            .into_iter()
            .filter(|f| *f)
            .count();
        if failed > 0 {
            tracing::warn!(failed, "some model settings could not be initialized");
        }
        self.refresh().await
    }

    /// Re-run the aggregation and drop enrichment state of articles that are gone.
    pub async fn refresh(&self) -> DashboardState {
        let state = self.dashboard.refresh().await;
        if let DashboardState::Ready { view } = &state {
            let pruned = self.enricher.prune(&view.entity_keys());
            if pruned > 0 {
                tracing::debug!(pruned, "stale enrichment slots pruned");
            }
        }
        state
    }

    fn model_for(&self, kind: TaskKind) -> Option<String> {
        let setting = match kind {
            TaskKind::Summarize => &self.summarization_model,
            TaskKind::Sentiment => &self.sentiment_model,
        };
        setting.state().map(|s| s.local_value)
    }

    /// Start `kind` for the article `key` of the current view, using the live model choice.
    pub fn enrich(
        &self,
        key: &EntityKey,
        kind: TaskKind,
    ) -> Result<TaskSlot<Enrichment>, EnrichError> {
        let article = self
            .dashboard
            .view()
            .and_then(|v| v.find_article(key).cloned())
            .ok_or_else(|| EnrichError::UnknownEntity(key.to_string()))?;
        self.enricher.start(&article, kind, self.model_for(kind))?;
        Ok(self.enricher.state_of(key, kind))
    }

    pub async fn ask(&self, question: &str) -> Result<ChatReply, ChatError> {
        let model = self.chat_model.state().map(|s| s.local_value);
        self.chat.ask(question, model.as_deref()).await
    }
}
