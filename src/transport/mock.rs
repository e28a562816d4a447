// src/transport/mock.rs
//! In-memory transport with scripted per-route outcomes, for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::RemoteTransport;
use crate::error::{RemoteCallError, RemoteCallResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
struct Scripted {
    delay: Duration,
    outcome: RemoteCallResult<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// Each route holds a queue of outcomes. Outcomes are consumed in order; the last one
/// sticks and answers every further call. Unscripted routes answer `404`.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_get(&self, path: &str, outcome: RemoteCallResult<Value>) -> &Self {
        self.push(Method::Get, path, Duration::ZERO, outcome)
    }

    pub fn on_get_delayed(
        &self,
        path: &str,
        delay: Duration,
        outcome: RemoteCallResult<Value>,
    ) -> &Self {
        self.push(Method::Get, path, delay, outcome)
    }

    pub fn on_post(&self, path: &str, outcome: RemoteCallResult<Value>) -> &Self {
        self.push(Method::Post, path, Duration::ZERO, outcome)
    }

    pub fn on_post_delayed(
        &self,
        path: &str,
        delay: Duration,
        outcome: RemoteCallResult<Value>,
    ) -> &Self {
        self.push(Method::Post, path, delay, outcome)
    }

    fn push(
        &self,
        method: Method,
        path: &str,
        delay: Duration,
        outcome: RemoteCallResult<Value>,
    ) -> &Self {
        self.routes
            .lock()
            .expect("scripted routes poisoned")
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Scripted { delay, outcome });
        self
    }

    /// Number of calls made to `path` with any method.
    pub fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .expect("scripted calls poisoned")
            .iter()
            .filter(|c| c.path == path)
            .count()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("scripted calls poisoned").clone()
    }

    /// Body of the most recent POST to `path`.
    pub fn last_body(&self, path: &str) -> Option<Value> {
        self.calls
            .lock()
            .expect("scripted calls poisoned")
            .iter()
            .rev()
            .find(|c| c.method == Method::Post && c.path == path)
            .and_then(|c| c.body.clone())
    }

    fn next(&self, method: Method, path: &str) -> Option<Scripted> {
        let mut routes = self.routes.lock().expect("scripted routes poisoned");
        let queue = routes.get_mut(&(method, path.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    async fn answer(&self, method: Method, path: &str, body: Option<Value>) -> RemoteCallResult<Value> {
        self.calls
            .lock()
            .expect("scripted calls poisoned")
            .push(RecordedCall {
                method,
                path: path.to_string(),
                body,
            });
        let Some(scripted) = self.next(method, path) else {
            return Err(RemoteCallError::remote(
                Some(404),
                format!("no scripted route for {method:?} {path}"),
            ));
        };
        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }
        scripted.outcome
    }
}

#[async_trait]
impl RemoteTransport for ScriptedTransport {
    async fn get(&self, path: &str) -> RemoteCallResult<Value> {
        self.answer(Method::Get, path, None).await
    }

    async fn post(&self, path: &str, body: &Value) -> RemoteCallResult<Value> {
        self.answer(Method::Post, path, Some(body.clone())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn outcomes_are_consumed_in_order_and_last_sticks() {
        let t = ScriptedTransport::new();
        t.on_get("/x", Ok(json!(1))).on_get("/x", Ok(json!(2)));
        assert_eq!(t.get("/x").await.unwrap(), json!(1));
        assert_eq!(t.get("/x").await.unwrap(), json!(2));
        assert_eq!(t.get("/x").await.unwrap(), json!(2));
        assert_eq!(t.calls_to("/x"), 3);
    }

    #[tokio::test]
    async fn unscripted_route_is_404() {
        let t = ScriptedTransport::new();
        let err = t.post("/nope", &json!({})).await.unwrap_err();
        assert_eq!(err.status_code, Some(404));
        assert_eq!(t.last_body("/nope"), Some(json!({})));
    }
}
