// tests/enrich_manager.rs
//
// Per-entity single-flight and slot isolation of the enrichment task manager.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use market_pulse::enrich::{
    EnrichmentTaskManager, EntityKey, StartError, TaskKind, TaskStatus, TextPolicy,
};
use market_pulse::error::{ErrorKind, RemoteCallError};

fn key(s: &str) -> EntityKey {
    EntityKey::new(s).expect("non-blank key")
}

fn text(chars: usize) -> String {
    "a".repeat(chars)
}

fn manager() -> EnrichmentTaskManager<String> {
    EnrichmentTaskManager::new(TextPolicy::default())
}

#[tokio::test]
async fn same_key_other_kind_is_rejected_while_pending() {
    let m = manager();
    let k = key("https://news.test/1");
    let (release, wait) = oneshot::channel::<()>();

    let first = m
        .start(&k, TaskKind::Summarize, text(80), |_| async move {
            let _ = wait.await;
            Ok::<_, RemoteCallError>("summary".to_string())
        })
        .expect("first start");

    let second = m.start(&k, TaskKind::Sentiment, text(80), |_| async {
        Ok::<_, RemoteCallError>("positive".to_string())
    });
    match second {
        Err(e @ StartError::AlreadyRunning { .. }) => {
            assert_eq!(e.kind(), ErrorKind::AlreadyRunning);
        }
        Err(other) => panic!("unexpected rejection: {other}"),
        Ok(_) => panic!("second kind started while first was pending"),
    }
    assert_eq!(m.running_kind(&k), Some(TaskKind::Summarize));
    assert_eq!(m.state_of(&k, TaskKind::Sentiment).status, TaskStatus::Idle);

    release.send(()).expect("release first");
    let slot = first.settled().await.expect("first settled");
    assert_eq!(slot.status, TaskStatus::Succeeded);

    let slot = m
        .start(&k, TaskKind::Sentiment, text(80), |_| async {
            Ok::<_, RemoteCallError>("positive".to_string())
        })
        .expect("second kind after first settled")
        .settled()
        .await
        .expect("settled");
    assert_eq!(slot.result.as_deref(), Some("positive"));
}

#[tokio::test(start_paused = true)]
async fn concurrent_keys_never_cross_write() {
    let m = manager();
    let (slow, fast) = (key("slow"), key("fast"));

    let slow_ticket = m
        .start(&slow, TaskKind::Sentiment, text(20), |t| async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, RemoteCallError>(format!("slow:{}", t.len()))
        })
        .expect("slow start");
    let fast_ticket = m
        .start(&fast, TaskKind::Sentiment, text(30), |t| async move {
            Ok::<_, RemoteCallError>(format!("fast:{}", t.len()))
        })
        .expect("fast start");

    let fast_slot = fast_ticket.settled().await.expect("fast settled");
    assert_eq!(fast_slot.result.as_deref(), Some("fast:30"));
    assert_eq!(m.state_of(&slow, TaskKind::Sentiment).status, TaskStatus::Running);

    slow_ticket.settled().await.expect("slow settled");
    assert_eq!(
        m.state_of(&fast, TaskKind::Sentiment).result.as_deref(),
        Some("fast:30")
    );
    assert_eq!(
        m.state_of(&slow, TaskKind::Sentiment).result.as_deref(),
        Some("slow:20")
    );
}

#[tokio::test]
async fn errors_stay_scoped_to_their_entity() {
    let m = manager();
    let (bad, good) = (key("bad"), key("good"));
    let bad_slot = m
        .start(&bad, TaskKind::Sentiment, text(20), |_| async {
            Err::<String, _>(RemoteCallError::remote(Some(502), "model loading"))
        })
        .expect("start")
        .settled()
        .await
        .expect("settled");
    assert_eq!(bad_slot.status, TaskStatus::Failed);

    let good_slot = m
        .start(&good, TaskKind::Sentiment, text(20), |_| async {
            Ok::<_, RemoteCallError>("neutral".to_string())
        })
        .expect("start after other entity failed")
        .settled()
        .await
        .expect("settled");
    assert_eq!(good_slot.error, None);
    assert_eq!(
        m.state_of(&bad, TaskKind::Sentiment).error.as_deref(),
        Some("model loading")
    );
}

#[tokio::test]
async fn short_text_never_calls_the_operation() {
    let m = manager();
    let k = key("k");
    let calls = Arc::new(AtomicUsize::new(0));

    // 49 chars: enough for sentiment, too short for a summary.
    let c = calls.clone();
    let res = m.start(&k, TaskKind::Summarize, text(49), move |_| async move {
        c.fetch_add(1, Ordering::SeqCst);
        Ok::<_, RemoteCallError>(String::new())
    });
    assert_eq!(
        res.err(),
        Some(StartError::TextTooShort {
            kind: TaskKind::Summarize,
            len: 49,
            min: 50
        })
    );

    let c = calls.clone();
    let res = m.start(&k, TaskKind::Sentiment, text(9), move |_| async move {
        c.fetch_add(1, Ordering::SeqCst);
        Ok::<_, RemoteCallError>(String::new())
    });
    assert!(matches!(res, Err(StartError::TextTooShort { .. })));

    tokio::task::yield_now().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(m.state_of(&k, TaskKind::Summarize).status, TaskStatus::Idle);
    assert_eq!(m.running_kind(&k), None);

    let slot = m
        .start(&k, TaskKind::Sentiment, text(10), |_| async {
            Ok::<_, RemoteCallError>("ok".to_string())
        })
        .expect("exact threshold is accepted")
        .settled()
        .await
        .expect("settled");
    assert_eq!(slot.result.as_deref(), Some("ok"));
}

#[tokio::test]
async fn thresholds_count_characters_not_bytes() {
    let m = manager();
    let k = key("unicode");
    // 10 multi-byte characters.
    let res = m.start(&k, TaskKind::Sentiment, "éééééééééé".to_string(), |_| async {
        Ok::<_, RemoteCallError>("ok".to_string())
    });
    assert!(res.is_ok());
}
