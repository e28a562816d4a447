// src/transport/mod.rs
//! Remote-call transport: the only place that talks HTTP to the dashboard backend.

pub mod http;
pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RemoteCallResult;

pub use http::HttpTransport;
pub use mock::ScriptedTransport;

/// JSON request/response over the backend API. Every failure (network, 4xx, 5xx, bad body)
/// comes back as `Err(RemoteCallError)`; implementations never panic on remote input.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn get(&self, path: &str) -> RemoteCallResult<Value>;
    async fn post(&self, path: &str, body: &Value) -> RemoteCallResult<Value>;
}

/// Convenient alias used by callers.
pub type SharedTransport = Arc<dyn RemoteTransport>;
