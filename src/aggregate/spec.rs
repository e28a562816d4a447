// src/aggregate/spec.rs
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::error::RemoteCallResult;
use crate::transport::SharedTransport;

pub type FetchFuture = Pin<Box<dyn Future<Output = RemoteCallResult<Value>> + Send>>;
type FetchFn = Box<dyn FnOnce() -> FetchFuture + Send>;

/// One source of an aggregation run. Declared once per run; consumed by the run.
pub struct SourceSpec {
    pub name: String,
    /// Field of the aggregate this source populates.
    pub maps_to: String,
    /// Status codes treated as a soft degradation instead of a hard failure.
    pub degrade_on: BTreeSet<u16>,
    /// Top-level key a successful payload must carry.
    pub required_key: Option<String>,
    fetch: FetchFn,
}

/// Everything about a source except its fetch.
#[derive(Debug, Clone)]
pub(crate) struct SourceMeta {
    pub name: String,
    pub maps_to: String,
    pub degrade_on: BTreeSet<u16>,
    pub required_key: Option<String>,
}

impl SourceSpec {
    pub fn new<F, Fut>(name: impl Into<String>, maps_to: impl Into<String>, fetch: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = RemoteCallResult<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            maps_to: maps_to.into(),
            degrade_on: BTreeSet::new(),
            required_key: None,
            fetch: Box::new(move || Box::pin(fetch())),
        }
    }

    /// GET `path` on the shared transport.
    pub fn get(
        name: impl Into<String>,
        maps_to: impl Into<String>,
        transport: SharedTransport,
        path: impl Into<String>,
    ) -> Self {
        let path = path.into();
        Self::new(name, maps_to, move || async move { transport.get(&path).await })
    }

    pub fn degrade_on(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.degrade_on.extend(codes);
        self
    }

    pub fn require_key(mut self, key: impl Into<String>) -> Self {
        self.required_key = Some(key.into());
        self
    }

    pub(crate) fn into_parts(self) -> (SourceMeta, FetchFn) {
        (
            SourceMeta {
                name: self.name,
                maps_to: self.maps_to,
                degrade_on: self.degrade_on,
                required_key: self.required_key,
            },
            self.fetch,
        )
    }
}

impl fmt::Debug for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSpec")
            .field("name", &self.name)
            .field("maps_to", &self.maps_to)
            .field("degrade_on", &self.degrade_on)
            .field("required_key", &self.required_key)
            .finish_non_exhaustive()
    }
}
