// tests/aggregate_sources.rs
//
// Fan-out/fan-in over the standard dashboard sources with a scripted backend.
//
// Covered:
// - all sources run concurrently (total time ~ slowest source, not the sum)
// - 403 on a degrade_on={403} source is a soft degradation with inline detail
// - [ok, ok, 403-degrade, 500-fail] end to end, including the combined message

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use market_pulse::aggregate::{SourceAggregator, SourceField, SourceOutcome, SourceSpec};
use market_pulse::config::SourcesConfig;
use market_pulse::dashboard::{standard_sources, DashboardView, MARKET_INDEX, WORLD_NEWS};
use market_pulse::error::{ErrorKind, RemoteCallError};
use market_pulse::market::MarketIndexView;
use market_pulse::transport::{ScriptedTransport, SharedTransport};

fn scripted() -> Arc<ScriptedTransport> {
    Arc::new(ScriptedTransport::new())
}

#[tokio::test(start_paused = true)]
async fn sources_run_concurrently_and_all_settle() {
    let t = scripted();
    t.on_get_delayed("/a", Duration::from_millis(300), Ok(json!({"v": 1})));
    t.on_get_delayed(
        "/b",
        Duration::from_millis(200),
        Err(RemoteCallError::remote(Some(500), "boom")),
    );
    t.on_get_delayed(
        "/c",
        Duration::from_millis(100),
        Err(RemoteCallError::network("connection refused")),
    );
    let shared: SharedTransport = t.clone();
    let specs = vec![
        SourceSpec::get("A", "a", shared.clone(), "/a"),
        SourceSpec::get("B", "b", shared.clone(), "/b"),
        SourceSpec::get("C", "c", shared, "/c"),
    ];

    let t0 = Instant::now();
    let res = SourceAggregator::new().run(specs).await.expect("run");
    let elapsed = t0.elapsed();

    assert!(
        elapsed < Duration::from_millis(400),
        "sources were serialized: {elapsed:?}"
    );
    assert_eq!(res.per_source.len(), 3);
    assert_eq!(res.hard_failures, vec!["B".to_string(), "C".to_string()]);
    assert!(res.soft_degradations.is_empty());
    assert_eq!(res.value("a"), Some(&json!({"v": 1})));
}

#[tokio::test]
async fn forbidden_market_index_degrades_softly() {
    let t = scripted();
    let cfg = SourcesConfig::default();
    t.on_get(&cfg.fear_greed_path, Ok(json!({"value": "55"})));
    t.on_get(
        &cfg.market_index_path,
        Err(RemoteCallError::remote(Some(403), "Plan does not include this index")),
    );
    t.on_get(&cfg.crypto_news_path, Ok(json!({"articles": []})));
    t.on_get(&cfg.world_news_path, Ok(json!({"articles": []})));
    let shared: SharedTransport = t.clone();

    let res = SourceAggregator::new()
        .run(standard_sources(&cfg, &shared))
        .await
        .expect("run");

    assert!(res.hard_failures.is_empty());
    assert_eq!(res.soft_degradations, vec![MARKET_INDEX.to_string()]);
    assert_eq!(res.outcome_of(MARKET_INDEX), Some(SourceOutcome::SoftDegraded));
    match res.field("market_index") {
        Some(SourceField::Degraded {
            detail,
            status_code,
        }) => {
            assert!(!detail.is_empty());
            assert_eq!(*status_code, Some(403));
        }
        other => panic!("expected degraded field, got {other:?}"),
    }
    let err = res.per_source[MARKET_INDEX].as_ref().unwrap_err();
    assert_eq!(err.kind, ErrorKind::SoftDegradation);
    assert_eq!(res.failure_summary(), None);
}

#[tokio::test]
async fn mixed_outcomes_end_to_end() {
    let t = scripted();
    let cfg = SourcesConfig::default();
    t.on_get(&cfg.fear_greed_path, Ok(json!({"value": 20, "value_classification": "Extreme Fear"})));
    t.on_get(
        &cfg.crypto_news_path,
        Ok(json!({"articles": [{"title": "ETH ETF approved", "url": "https://n/eth"}]})),
    );
    t.on_get(
        &cfg.market_index_path,
        Err(RemoteCallError::remote(Some(403), "rate limited")),
    );
    t.on_get(
        &cfg.world_news_path,
        Err(RemoteCallError::remote(Some(500), "upstream down")),
    );
    let shared: SharedTransport = t.clone();

    let res = SourceAggregator::new()
        .run(standard_sources(&cfg, &shared))
        .await
        .expect("run");

    assert_eq!(res.hard_failures, vec![WORLD_NEWS.to_string()]);
    assert_eq!(res.soft_degradations, vec![MARKET_INDEX.to_string()]);
    let summary = res.failure_summary().expect("summary");
    assert_eq!(summary, "Failed to load some data: World News.");
    assert!(!summary.contains(MARKET_INDEX));

    let view = DashboardView::from_aggregate(&res);
    assert_eq!(view.fear_greed.map(|f| f.value), Some(20.0));
    assert!(matches!(
        view.market_index,
        Some(MarketIndexView::Unavailable { .. })
    ));
    assert_eq!(view.crypto_news.map(|a| a.len()), Some(1));
    assert!(view.world_news.is_none());
}

#[tokio::test]
async fn each_source_is_fetched_exactly_once() {
    let t = scripted();
    let cfg = SourcesConfig::default();
    for path in [
        &cfg.fear_greed_path,
        &cfg.market_index_path,
        &cfg.crypto_news_path,
        &cfg.world_news_path,
    ] {
        t.on_get(path, Ok(json!({"articles": []})));
    }
    let shared: SharedTransport = t.clone();
    let res = SourceAggregator::new()
        .run(standard_sources(&cfg, &shared))
        .await
        .expect("run");

    assert!(res.is_fully_loaded());
    assert_eq!(t.calls().len(), 4);
    assert_eq!(t.calls_to(&cfg.world_news_path), 1);
}
