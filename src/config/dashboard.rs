// src/config/dashboard.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

pub const DEFAULT_CONFIG_PATH: &str = "config/dashboard.toml";
pub const ENV_CONFIG_PATH: &str = "DASHBOARD_CONFIG_PATH";
pub const ENV_BACKEND_URL: &str = "DASHBOARD_BACKEND_URL";
pub const ENV_BIND: &str = "DASHBOARD_BIND";
pub const ENV_POLL_INTERVAL_MS: &str = "DASHBOARD_POLL_INTERVAL_MS";

const MIN_POLL_INTERVAL_MS: u64 = 250;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub backend: BackendConfig,
    pub server: ServerConfig,
    pub sources: SourcesConfig,
    pub enrichment: EnrichmentConfig,
    pub models: ModelsConfig,
    pub admin: AdminConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
            connect_timeout_secs: 4,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8088".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub fear_greed_path: String,
    pub market_index_path: String,
    /// Status codes on the market index that render inline instead of failing the load.
    pub market_index_degrade_on: Vec<u16>,
    pub crypto_news_path: String,
    pub world_news_path: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            fear_greed_path: "/api/market/fear-greed".to_string(),
            market_index_path: "/api/market/index".to_string(),
            market_index_degrade_on: vec![403],
            crypto_news_path: "/api/news/crypto".to_string(),
            world_news_path: "/api/news/world".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub summarize_path: String,
    pub sentiment_path: String,
    pub min_summarize_chars: usize,
    pub min_sentiment_chars: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            summarize_path: "/api/news/summarize".to_string(),
            sentiment_path: "/api/news/sentiment/analyze".to_string(),
            min_summarize_chars: 50,
            min_sentiment_chars: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEndpoints {
    pub catalog_path: String,
    pub select_path: String,
}

impl ModelEndpoints {
    fn llm_task(task: &str) -> Self {
        Self {
            catalog_path: format!("/api/llm/models/{task}"),
            select_path: format!("/api/llm/models/{task}/select"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub summarization: ModelEndpoints,
    pub sentiment: ModelEndpoints,
    pub chat: ModelEndpoints,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            summarization: ModelEndpoints::llm_task("summarization"),
            sentiment: ModelEndpoints::llm_task("sentiment"),
            chat: ModelEndpoints {
                catalog_path: "/api/chat/models".to_string(),
                select_path: "/api/chat/models/select".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub metrics_path: String,
    pub logs_path: String,
    pub poll_interval_ms: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            metrics_path: "/api/metrics".to_string(),
            logs_path: "/api/logs".to_string(),
            poll_interval_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub ask_path: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            ask_path: "/api/chat/ask".to_string(),
        }
    }
}

impl DashboardConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading dashboard config from {}", path.display()))?;
        let cfg: DashboardConfig = toml::from_str(&data)
            .with_context(|| format!("parsing dashboard config {}", path.display()))?;
        Ok(cfg)
    }

    /// Resolve config using env var + fallbacks, then apply env overrides:
    /// 1) $DASHBOARD_CONFIG_PATH
    /// 2) config/dashboard.toml
    /// 3) built-in defaults
    pub fn load() -> Result<Self> {
        let mut cfg = match env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
                }
                Self::load_from_file(&pb)?
            }
            Err(_) => {
                let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default_p.exists() {
                    Self::load_from_file(&default_p)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env_overrides()?;
        cfg.sanitize()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = env::var(ENV_BACKEND_URL) {
            if !url.trim().is_empty() {
                self.backend.base_url = url.trim().to_string();
            }
        }
        if let Ok(bind) = env::var(ENV_BIND) {
            if !bind.trim().is_empty() {
                self.server.bind = bind.trim().to_string();
            }
        }
        if let Ok(raw) = env::var(ENV_POLL_INTERVAL_MS) {
            self.admin.poll_interval_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_POLL_INTERVAL_MS} must be an integer, got '{raw}'"))?;
        }
        Ok(())
    }

    /// Clamp values that would break the components and reject an unusable backend URL.
    pub fn sanitize(&mut self) -> Result<()> {
        let url = self.backend.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("backend.base_url must start with http:// or https://, got '{url}'");
        }
        self.enrichment.min_summarize_chars = self.enrichment.min_summarize_chars.max(1);
        self.enrichment.min_sentiment_chars = self.enrichment.min_sentiment_chars.max(1);
        if self.admin.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            tracing::warn!(
                requested = self.admin.poll_interval_ms,
                min = MIN_POLL_INTERVAL_MS,
                "admin poll interval too small, clamping"
            );
            self.admin.poll_interval_ms = MIN_POLL_INTERVAL_MS;
        }
        Ok(())
    }
}
