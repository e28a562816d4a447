// src/news.rs
//! News articles as delivered by the crypto and world feeds, plus the text we send for enrichment.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enrich::EntityKey;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, alias = "publishedAt")]
    pub published_at: Option<String>,
}

impl Article {
    /// `url` if present, else `title`. Articles without a title cannot be enriched.
    pub fn entity_key(&self) -> Option<EntityKey> {
        let title = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        self.url
            .as_deref()
            .and_then(EntityKey::new)
            .or_else(|| EntityKey::new(title))
    }

    /// `"<title>. <description|content>"` exactly as sent for enrichment. An empty
    /// description falls back to the content; nothing is trimmed or truncated, so the
    /// length checks see the same text the backend receives.
    pub fn enrichment_text(&self) -> String {
        let body = [self.description.as_deref(), self.content.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .unwrap_or_default();
        format!("{}. {}", self.title.as_deref().unwrap_or_default(), body)
    }
}

/// Extract `articles` from a feed payload. Malformed entries are skipped.
pub fn parse_articles(payload: &Value) -> Vec<Article> {
    let Some(items) = payload.get("articles").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Article>(item.clone()) {
            Ok(a) => Some(a),
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed article");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_prefers_url_and_requires_title() {
        let a = Article {
            title: Some("Fed holds".into()),
            url: Some("https://news.test/a".into()),
            ..Default::default()
        };
        assert_eq!(a.entity_key().unwrap().as_str(), "https://news.test/a");

        let no_url = Article {
            title: Some("Fed holds".into()),
            url: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(no_url.entity_key().unwrap().as_str(), "Fed holds");

        let no_title = Article {
            url: Some("https://news.test/b".into()),
            ..Default::default()
        };
        assert!(no_title.entity_key().is_none());
    }

    #[test]
    fn enrichment_text_falls_back_to_content() {
        let a = Article {
            title: Some("ETH rallies".into()),
            description: Some("".into()),
            content: Some("Ether gained 5% &amp; more.".into()),
            ..Default::default()
        };
        assert_eq!(a.enrichment_text(), "ETH rallies. Ether gained 5% &amp; more.");

        let bare = Article {
            title: Some("BTC rise".into()),
            ..Default::default()
        };
        assert_eq!(bare.enrichment_text(), "BTC rise. ");
    }

    #[test]
    fn enrichment_text_is_not_truncated() {
        let long = "x".repeat(4_000);
        let a = Article {
            title: Some("Long read".into()),
            description: Some(long.clone()),
            ..Default::default()
        };
        assert_eq!(a.enrichment_text(), format!("Long read. {long}"));
    }

    #[test]
    fn parse_articles_reads_both_feed_shapes() {
        let payload = json!({"articles": [
            {"title": "A", "url": "https://a", "published_at": "2024-01-01"},
            {"title": "B", "publishedAt": "2024-01-02", "urlToImage": "x"},
            "garbage"
        ]});
        let out = parse_articles(&payload);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].published_at.as_deref(), Some("2024-01-02"));
        assert!(parse_articles(&json!({"results": []})).is_empty());
    }
}
