// src/transport/http.rs
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::{Client, Response};
use serde_json::Value;

use super::RemoteTransport;
use crate::config::BackendConfig;
use crate::error::{RemoteCallError, RemoteCallResult};

/// reqwest-backed transport rooted at the backend base URL.
pub struct HttpTransport {
    http: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(cfg: &BackendConfig) -> anyhow::Result<Self> {
        let base_url = cfg.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!("backend base_url must start with http:// or https://, got '{base_url}'");
        }
        let http = Client::builder()
            .user_agent(concat!("market-pulse/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .context("building reqwest client")?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn finish(
        method: &'static str,
        path: &str,
        t0: Instant,
        sent: Result<Response, reqwest::Error>,
    ) -> RemoteCallResult<Value> {
        let outcome = read_response(sent).await;
        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("remote_call_ms").record(ms);
        match &outcome {
            Ok(_) => tracing::debug!(method, path, elapsed_ms = ms, "remote call ok"),
            Err(e) => {
                counter!("remote_call_errors_total", "kind" => e.kind.as_str()).increment(1);
                tracing::warn!(
                    method,
                    path,
                    elapsed_ms = ms,
                    kind = %e.kind,
                    status = ?e.status_code,
                    detail = %e.detail,
                    "remote call failed"
                );
            }
        }
        outcome
    }
}

async fn read_response(sent: Result<Response, reqwest::Error>) -> RemoteCallResult<Value> {
    let resp = sent.map_err(|e| RemoteCallError::network(describe_send_error(&e)))?;
    let status = resp.status();
    let code = status.as_u16();
    let body = resp
        .text()
        .await
        .map_err(|e| RemoteCallError::network(format!("reading response body: {e}")))?;

    if !status.is_success() {
        return Err(RemoteCallError::remote(Some(code), error_message(&body)));
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(trimmed)
        .map_err(|e| RemoteCallError::remote(Some(code), format!("invalid JSON body: {e}")))
}

fn describe_send_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        format!("request failed: {e}")
    }
}

/// Backend errors look like `{"error": "...", "details": "..."}`; fall back to the raw body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(v) => v
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default(),
        Err(_) => body.chars().take(200).collect(),
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn get(&self, path: &str) -> RemoteCallResult<Value> {
        let t0 = Instant::now();
        let sent = self.http.get(self.url(path)).send().await;
        Self::finish("GET", path, t0, sent).await
    }

    async fn post(&self, path: &str, body: &Value) -> RemoteCallResult<Value> {
        let t0 = Instant::now();
        let sent = self.http.post(self.url(path)).json(body).send().await;
        Self::finish("POST", path, t0, sent).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_error_field() {
        assert_eq!(
            error_message(r#"{"error":"rate limited","details":"x"}"#),
            "rate limited"
        );
        assert_eq!(error_message("<html>bad gateway</html>"), "<html>bad gateway</html>");
        assert_eq!(error_message(r#"{"message":"nope"}"#), "");
    }

    #[test]
    fn rejects_base_url_without_scheme() {
        let cfg = BackendConfig {
            base_url: "localhost:3001".into(),
            ..BackendConfig::default()
        };
        assert!(HttpTransport::new(&cfg).is_err());
    }

    #[test]
    fn joins_base_and_path_with_single_slash() {
        let cfg = BackendConfig {
            base_url: "http://localhost:3001/".into(),
            ..BackendConfig::default()
        };
        let t = HttpTransport::new(&cfg).unwrap();
        assert_eq!(t.url("/api/news/crypto"), "http://localhost:3001/api/news/crypto");
        assert_eq!(t.url("api/metrics"), "http://localhost:3001/api/metrics");
    }
}
