// tests/chat_session.rs
//
// Single-flight chat with transcript.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use market_pulse::chat::{ChatError, ChatSession, Sender};
use market_pulse::config::ChatConfig;
use market_pulse::error::{ErrorKind, RemoteCallError};
use market_pulse::transport::ScriptedTransport;

const ASK: &str = "/api/chat/ask";

#[tokio::test(start_paused = true)]
async fn second_question_while_pending_is_rejected() {
    let t = Arc::new(ScriptedTransport::new());
    t.on_post_delayed(
        ASK,
        Duration::from_secs(2),
        Ok(json!({"answer": "BTC is at 64k", "execution_time": "1.23s", "model": "zephyr"})),
    );
    let chat = ChatSession::new(t.clone(), &ChatConfig::default());

    let pending = {
        let chat = chat.clone();
        tokio::spawn(async move { chat.ask("Where is BTC?", None).await })
    };
    tokio::task::yield_now().await;
    assert!(chat.is_busy());
    assert_eq!(
        chat.ask("And ETH?", None).await,
        Err(ChatError::AlreadyRunning)
    );

    let reply = pending.await.expect("join").expect("answer");
    assert_eq!(reply.answer, "BTC is at 64k");
    assert_eq!(reply.model.as_deref(), Some("zephyr"));
    assert_eq!(reply.execution_time.as_deref(), Some("1.23s"));
    assert!(!chat.is_busy());

    let history = chat.history();
    assert_eq!(history.len(), 2, "rejected question is not recorded");
    assert_eq!(history[0].sender, Sender::User);
    assert_eq!(history[1].sender, Sender::Agent);
    assert!(!history[1].is_error);
}

#[tokio::test]
async fn remote_failure_is_recorded_as_error_message() {
    let t = Arc::new(ScriptedTransport::new());
    t.on_post(
        ASK,
        Err(RemoteCallError::remote(Some(500), "Failed to process question")),
    );
    let chat = ChatSession::new(t, &ChatConfig::default());

    match chat.ask("Why?", None).await {
        Err(ChatError::Remote(e)) => {
            assert_eq!(e.kind, ErrorKind::Remote);
            assert_eq!(e.status_code, Some(500));
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    let last = chat.history().pop().expect("agent message");
    assert!(last.is_error);
    assert_eq!(last.text, "Error: Failed to process question");
    assert!(!chat.is_busy(), "busy flag is released on failure");
}

#[tokio::test]
async fn reply_without_answer_is_a_remote_error() {
    let t = Arc::new(ScriptedTransport::new());
    t.on_post(ASK, Ok(json!({"response": "wrong field"})));
    let chat = ChatSession::new(t, &ChatConfig::default());
    assert!(matches!(
        chat.ask("hello", None).await,
        Err(ChatError::Remote(_))
    ));
}
