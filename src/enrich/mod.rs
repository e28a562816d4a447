// src/enrich/mod.rs
//! Per-entity enrichment: at most one operation in flight per entity, with observable
//! per-(entity, kind) state.

mod manager;
pub mod service;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;

pub use manager::{EnrichmentTaskManager, TaskTicket};
pub use service::{Enricher, Enrichment};

/// Stable identifier of a trackable entity. Never blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityKey(String);

impl EntityKey {
    /// Trimmed key, or `None` when nothing usable is left.
    pub fn new(raw: &str) -> Option<Self> {
        let t = raw.trim();
        (!t.is_empty()).then(|| Self(t.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 6 bytes of SHA-256, hex. Used in logs instead of the raw URL or title.
    pub fn short_hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(self.0.as_bytes());
        let mut out = String::with_capacity(12);
        for b in digest.iter().take(6) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EntityKey {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        EntityKey::new(&value).ok_or("entity key must not be blank")
    }
}

impl From<EntityKey> for String {
    fn from(k: EntityKey) -> Self {
        k.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Summarize,
    Sentiment,
}

impl TaskKind {
    pub const ALL: [TaskKind; 2] = [TaskKind::Summarize, TaskKind::Sentiment];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Summarize => "summarize",
            TaskKind::Sentiment => "sentiment",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "summarize" | "summary" => Ok(TaskKind::Summarize),
            "sentiment" => Ok(TaskKind::Sentiment),
            other => Err(format!("unknown task kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// State of one (entity, kind) pair. A `Failed` slot never carries a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSlot<T> {
    pub status: TaskStatus,
    pub result: Option<T>,
    pub error: Option<String>,
}

impl<T> Default for TaskSlot<T> {
    fn default() -> Self {
        Self {
            status: TaskStatus::Idle,
            result: None,
            error: None,
        }
    }
}

/// Minimum text length (in characters) per task kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextPolicy {
    pub min_summarize_chars: usize,
    pub min_sentiment_chars: usize,
}

impl Default for TextPolicy {
    fn default() -> Self {
        Self {
            min_summarize_chars: 50,
            min_sentiment_chars: 10,
        }
    }
}

impl TextPolicy {
    pub fn min_chars(&self, kind: TaskKind) -> usize {
        match kind {
            TaskKind::Summarize => self.min_summarize_chars,
            TaskKind::Sentiment => self.min_sentiment_chars,
        }
    }
}

/// Synchronous rejection of a `start`; nothing was spawned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("text too short for {kind}: {len} chars, need at least {min}")]
    TextTooShort { kind: TaskKind, len: usize, min: usize },
    #[error("{running} already running for this entity")]
    AlreadyRunning { key: EntityKey, running: TaskKind },
}

impl StartError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StartError::TextTooShort { .. } => ErrorKind::TextTooShort,
            StartError::AlreadyRunning { .. } => ErrorKind::AlreadyRunning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_key_rejects_blank() {
        assert!(EntityKey::new("   ").is_none());
        assert_eq!(EntityKey::new("  a ").unwrap().as_str(), "a");
        assert!(serde_json::from_str::<EntityKey>("\" \"").is_err());
    }

    #[test]
    fn short_hash_is_stable_and_short() {
        let k = EntityKey::new("https://news.test/a").unwrap();
        assert_eq!(k.short_hash().len(), 12);
        assert_eq!(k.short_hash(), k.clone().short_hash());
    }

    #[test]
    fn task_kind_parses_path_segments() {
        assert_eq!("summarize".parse::<TaskKind>(), Ok(TaskKind::Summarize));
        assert_eq!("Sentiment".parse::<TaskKind>(), Ok(TaskKind::Sentiment));
        assert!("translate".parse::<TaskKind>().is_err());
    }

    #[test]
    fn summarize_needs_more_text_than_sentiment() {
        let p = TextPolicy::default();
        assert!(p.min_chars(TaskKind::Summarize) > p.min_chars(TaskKind::Sentiment));
    }
}
