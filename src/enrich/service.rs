// src/enrich/service.rs
//! Binds the task manager to the summarize and sentiment endpoints.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::{json, Value};

use super::{
    EnrichmentTaskManager, EntityKey, StartError, TaskKind, TaskSlot, TaskTicket, TextPolicy,
};
use crate::config::EnrichmentConfig;
use crate::error::{RemoteCallError, RemoteCallResult};
use crate::news::Article;
use crate::transport::SharedTransport;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Enrichment {
    Summary { text: String },
    Sentiment { label: String, score: f64 },
}

#[derive(Clone)]
pub struct Enricher {
    transport: SharedTransport,
    summarize_path: String,
    sentiment_path: String,
    tasks: EnrichmentTaskManager<Enrichment>,
}

impl Enricher {
    pub fn new(transport: SharedTransport, cfg: &EnrichmentConfig) -> Self {
        Self {
            transport,
            summarize_path: cfg.summarize_path.clone(),
            sentiment_path: cfg.sentiment_path.clone(),
            tasks: EnrichmentTaskManager::new(TextPolicy {
                min_summarize_chars: cfg.min_summarize_chars,
                min_sentiment_chars: cfg.min_sentiment_chars,
            }),
        }
    }

    /// Start `kind` for `article` with the given model. `Ok(None)` when the article has no
    /// usable key: nothing is tracked and nothing is sent.
    pub fn start(
        &self,
        article: &Article,
        kind: TaskKind,
        model_id: Option<String>,
    ) -> Result<Option<TaskTicket<Enrichment>>, StartError> {
        let Some(key) = article.entity_key() else {
            tracing::debug!(%kind, "article has no key; enrichment skipped");
            return Ok(None);
        };
        let transport = self.transport.clone();
        let path = match kind {
            TaskKind::Summarize => self.summarize_path.clone(),
            TaskKind::Sentiment => self.sentiment_path.clone(),
        };
        let ticket = self
            .tasks
            .start(&key, kind, article.enrichment_text(), move |text| async move {
                let body = json!({ "text": text, "model_id": model_id });
                let reply = transport.post(&path, &body).await?;
                parse_reply(kind, &reply)
            })?;
        Ok(Some(ticket))
    }

    pub fn state_of(&self, key: &EntityKey, kind: TaskKind) -> TaskSlot<Enrichment> {
        self.tasks.state_of(key, kind)
    }

    pub fn running_kind(&self, key: &EntityKey) -> Option<TaskKind> {
        self.tasks.running_kind(key)
    }

    pub fn slots_for(&self, key: &EntityKey) -> BTreeMap<TaskKind, TaskSlot<Enrichment>> {
        self.tasks.slots_for(key)
    }

    pub fn prune(&self, live: &HashSet<EntityKey>) -> usize {
        self.tasks.prune(live)
    }
}

fn parse_reply(kind: TaskKind, reply: &Value) -> RemoteCallResult<Enrichment> {
    match kind {
        TaskKind::Summarize => reply
            .get("summary")
            .and_then(Value::as_str)
            .map(|s| Enrichment::Summary {
                text: s.trim().to_string(),
            })
            .ok_or_else(|| RemoteCallError::remote(None, "summary missing in response")),
        TaskKind::Sentiment => {
            let s = reply
                .get("sentiment")
                .or_else(|| reply.get("top_sentiment"))
                .ok_or_else(|| RemoteCallError::remote(None, "sentiment missing in response"))?;
            let label = s.get("label").and_then(Value::as_str);
            let score = s.get("score").and_then(Value::as_f64);
            match (label, score) {
                (Some(label), Some(score)) => Ok(Enrichment::Sentiment {
                    label: label.to_string(),
                    score,
                }),
                _ => Err(RemoteCallError::remote(None, "sentiment label/score missing in response")),
            }
        }
    }
}
