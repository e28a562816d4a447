// src/chat.rs
//! Conversational query: one question in flight at a time, with a running transcript.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::ChatConfig;
use crate::error::{RemoteCallError, RemoteCallResult};
use crate::transport::SharedTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub answer: String,
    /// As reported by the backend, e.g. `"1.23s"`. Bare numbers are read as seconds.
    #[serde(default, deserialize_with = "seconds_label")]
    pub execution_time: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("question must not be empty")]
    EmptyQuestion,
    #[error("a question is already being answered")]
    AlreadyRunning,
    #[error(transparent)]
    Remote(#[from] RemoteCallError),
}

#[derive(Clone)]
pub struct ChatSession {
    transport: SharedTransport,
    ask_path: String,
    busy: Arc<AtomicBool>,
    history: Arc<Mutex<Vec<ChatMessage>>>,
}

/// Clears the busy flag when the ask finishes, however it finishes.
struct Busy(Arc<AtomicBool>);

impl Drop for Busy {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ChatSession {
    pub fn new(transport: SharedTransport, cfg: &ChatConfig) -> Self {
        Self {
            transport,
            ask_path: cfg.ask_path.clone(),
            busy: Arc::new(AtomicBool::new(false)),
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.lock().expect("chat history poisoned").clone()
    }

    pub async fn ask(&self, question: &str, model_id: Option<&str>) -> Result<ChatReply, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ChatError::AlreadyRunning);
        }
        let _busy = Busy(Arc::clone(&self.busy));

        self.push(Sender::User, question, false);
        let mut body = json!({ "question": question });
        if let Some(m) = model_id.filter(|m| !m.trim().is_empty()) {
            body["model_id"] = Value::from(m);
        }

        let outcome = self
            .transport
            .post(&self.ask_path, &body)
            .await
            .and_then(parse_reply);
        match outcome {
            Ok(reply) => {
                tracing::info!(model = ?reply.model, execution_time = ?reply.execution_time, "chat answered");
                self.push(Sender::Agent, &reply.answer, false);
                Ok(reply)
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat question failed");
                self.push(Sender::Agent, &format!("Error: {}", e.detail), true);
                Err(e.into())
            }
        }
    }

    fn push(&self, sender: Sender, text: &str, is_error: bool) {
        self.history
            .lock()
            .expect("chat history poisoned")
            .push(ChatMessage {
                sender,
                text: text.to_string(),
                is_error,
            });
    }
}

fn seconds_label<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(|secs| Some(format!("{secs:.2}s")))
            .ok_or_else(|| de::Error::custom("execution_time out of range")),
        Some(other) => Err(de::Error::custom(format!(
            "execution_time must be a string or number, got {other}"
        ))),
    }
}

fn parse_reply(v: Value) -> RemoteCallResult<ChatReply> {
    serde_json::from_value(v)
        .map_err(|e| RemoteCallError::remote(None, format!("unexpected chat response: {e}")))
}
