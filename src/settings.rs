// src/settings.rs
//! Live configuration values synced optimistically with the backend.
//!
//! `set` updates the local value at once and persists in the background. A rejected persist
//! rolls the local value back to whatever the backend reports *now* (a fresh read), falling
//! back to the last confirmed value when even that read fails.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::config::ModelEndpoints;
use crate::error::{contained, RemoteCallError, RemoteCallResult};
use crate::transport::SharedTransport;

/// When `syncing` is false and `last_error` is empty, `local_value == remote_value`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingState<T> {
    pub local_value: T,
    pub remote_value: T,
    pub syncing: bool,
    pub last_error: Option<String>,
}

/// Where a setting is read from and persisted to.
#[async_trait]
pub trait SettingBackend: Send + Sync + 'static {
    type Value: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// Label used in logs and metrics.
    fn name(&self) -> &str;
    async fn fetch_current(&self) -> RemoteCallResult<Self::Value>;
    async fn persist(&self, value: &Self::Value) -> RemoteCallResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingError {
    #[error("setting '{0}' is not initialized")]
    NotInitialized(String),
}

pub struct OptimisticRemoteSetting<B: SettingBackend> {
    backend: Arc<B>,
    inner: Arc<Mutex<Inner<B::Value>>>,
}

impl<B: SettingBackend> Clone for OptimisticRemoteSetting<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<V> {
    state: Option<SettingState<V>>,
    /// Bumped by every accepted `set`; only the newest one may touch local state on settle.
    generation: u64,
    /// Generation of the newest persist the backend confirmed.
    confirmed: u64,
}

/// Resolves with the state right after this `set` settled, or `None` when a newer `set`
/// superseded a failed one.
pub struct SyncTicket<V> {
    rx: oneshot::Receiver<SettingState<V>>,
}

impl<V> SyncTicket<V> {
    pub async fn settled(self) -> Option<SettingState<V>> {
        self.rx.await.ok()
    }
}

impl<B: SettingBackend> OptimisticRemoteSetting<B> {
    pub fn new(backend: B) -> Self {
        crate::metrics::ensure_described();
        Self {
            backend: Arc::new(backend),
            inner: Arc::new(Mutex::new(Inner {
                state: None,
                generation: 0,
                confirmed: 0,
            })),
        }
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Read the remote value once and make it both local and remote.
    pub async fn initialize(&self) -> RemoteCallResult<SettingState<B::Value>> {
        let current = self.backend.fetch_current().await.map_err(|e| {
            tracing::warn!(setting = %self.name(), error = %e, "setting initialization failed");
            e
        })?;
        let state = SettingState {
            local_value: current.clone(),
            remote_value: current,
            syncing: false,
            last_error: None,
        };
        let mut inner = self.inner.lock().expect("setting state poisoned");
        inner.state = Some(state.clone());
        tracing::info!(setting = %self.name(), value = ?state.remote_value, "setting initialized");
        Ok(state)
    }

    pub fn state(&self) -> Option<SettingState<B::Value>> {
        self.inner.lock().expect("setting state poisoned").state.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().expect("setting state poisoned").state.is_some()
    }

    /// Apply `value` locally right away and persist it in the background.
    pub fn set(&self, value: B::Value) -> Result<SyncTicket<B::Value>, SettingError> {
        let generation = {
            let mut inner = self.inner.lock().expect("setting state poisoned");
            let Inner {
                state, generation, ..
            } = &mut *inner;
            let Some(state) = state.as_mut() else {
                return Err(SettingError::NotInitialized(self.name().to_string()));
            };
            *generation += 1;
            state.local_value = value.clone();
            state.syncing = true;
            state.last_error = None;
            *generation
        };
        tracing::debug!(setting = %self.name(), ?value, generation, "setting changed locally");

        let (tx, rx) = oneshot::channel();
        let backend = Arc::clone(&self.backend);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let persisted = {
                let backend = Arc::clone(&backend);
                let value = value.clone();
                contained(async move { backend.persist(&value).await }).await
            };
            let state = match persisted {
                Ok(()) => confirm(&inner, backend.name(), generation, value),
                Err(e) => rollback(&inner, &backend, generation, e).await,
            };
            if let Some(state) = state {
                let _ = tx.send(state);
            }
        });
        Ok(SyncTicket { rx })
    }
}

fn confirm<V: Clone + fmt::Debug>(
    inner: &Mutex<Inner<V>>,
    name: &str,
    generation: u64,
    value: V,
) -> Option<SettingState<V>> {
    let mut guard = inner.lock().expect("setting state poisoned");
    let Inner {
        state,
        generation: newest_generation,
        confirmed,
    } = &mut *guard;
    let state = state.as_mut()?;
    let newest = *newest_generation == generation;
    if newest {
        state.local_value = value.clone();
        state.syncing = false;
        state.last_error = None;
    }
    // A late confirmation of an older value must not overwrite a newer confirmed one.
    if generation > *confirmed {
        *confirmed = generation;
        state.remote_value = value;
    }
    counter!("setting_sync_total", "setting" => name.to_string(), "outcome" => "confirmed")
        .increment(1);
    tracing::info!(setting = %name, value = ?state.remote_value, newest, "setting persisted");
    Some(state.clone())
}

async fn rollback<B: SettingBackend>(
    inner: &Mutex<Inner<B::Value>>,
    backend: &Arc<B>,
    generation: u64,
    err: RemoteCallError,
) -> Option<SettingState<B::Value>> {
    let name = backend.name();
    if inner.lock().expect("setting state poisoned").generation != generation {
        tracing::debug!(setting = %name, generation, error = %err, "stale persist failure ignored");
        return None;
    }

    let reread = {
        let backend = Arc::clone(backend);
        contained(async move { backend.fetch_current().await }).await
    };

    let mut guard = inner.lock().expect("setting state poisoned");
    if guard.generation != generation {
        return None;
    }
    let state = guard.state.as_mut()?;
    state.syncing = false;
    match reread {
        Ok(current) => {
            state.local_value = current.clone();
            state.remote_value = current;
            state.last_error = Some(err.detail.clone());
            counter!("setting_sync_total", "setting" => name.to_string(), "outcome" => "rolled_back")
                .increment(1);
            tracing::warn!(setting = %name, error = %err, value = ?state.local_value, "persist rejected; rolled back to remote value");
        }
        Err(reread_err) => {
            state.local_value = state.remote_value.clone();
            state.last_error = Some(format!(
                "{}; rollback re-read failed: {}",
                err.detail, reread_err.detail
            ));
            counter!("setting_sync_total", "setting" => name.to_string(), "outcome" => "fallback")
                .increment(1);
            tracing::warn!(setting = %name, error = %err, reread_error = %reread_err, "persist rejected and re-read failed; kept last confirmed value");
        }
    }
    Some(state.clone())
}

/// Selectable model as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOption {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Selected model of one task (summarization, sentiment, chat).
pub struct ModelSelectionBackend {
    name: String,
    transport: SharedTransport,
    endpoints: ModelEndpoints,
    options: Mutex<Vec<ModelOption>>,
}

impl ModelSelectionBackend {
    pub fn new(name: impl Into<String>, transport: SharedTransport, endpoints: ModelEndpoints) -> Self {
        Self {
            name: name.into(),
            transport,
            endpoints,
            options: Mutex::new(Vec::new()),
        }
    }

    /// Options seen on the last successful catalog read.
    pub fn options(&self) -> Vec<ModelOption> {
        self.options.lock().expect("model options poisoned").clone()
    }
}

#[async_trait]
impl SettingBackend for ModelSelectionBackend {
    type Value = String;

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_current(&self) -> RemoteCallResult<String> {
        let payload = self.transport.get(&self.endpoints.catalog_path).await?;
        let options = parse_options(&payload);
        let current = payload
            .get("current")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| options.first().map(|o| o.id.clone()));
        *self.options.lock().expect("model options poisoned") = options;
        current.ok_or_else(|| RemoteCallError::remote(None, "no current model and no options"))
    }

    async fn persist(&self, value: &String) -> RemoteCallResult<()> {
        self.transport
            .post(&self.endpoints.select_path, &json!({ "model_id": value }))
            .await
            .map(|_| ())
    }
}

/// `options` or `models`; entries may be `{id, name}` objects or bare id strings.
fn parse_options(payload: &Value) -> Vec<ModelOption> {
    let Some(items) = payload
        .get("options")
        .or_else(|| payload.get("models"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(id) => Some(ModelOption {
                id: id.clone(),
                name: None,
            }),
            other => serde_json::from_value::<ModelOption>(other.clone()).ok(),
        })
        .collect()
}
