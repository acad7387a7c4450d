// Cache-or-compute path and shutdown
// Author: kelexine (https://github.com/kelexine)

use filechat::app::COMPLETION_OPERATION;
use filechat::config::AppConfig;
use filechat::metrics::FlushOutcome;
use filechat::store::{Fault, MemoryStore};
use filechat::{Completion, FileChat};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn app() -> (Arc<MemoryStore>, FileChat) {
    let store = Arc::new(MemoryStore::new());
    let app = FileChat::with_store(store.clone(), &AppConfig::default());
    (store, app)
}

#[tokio::test]
async fn test_second_request_is_served_from_cache() {
    let (_store, app) = app();
    let computed = AtomicUsize::new(0);
    let metadata = json!({"model": "gpt-4o-mini", "temperature": 0.0});

    for _ in 0..2 {
        let counter = &computed;
        let completion = app
            .complete_cached("Summarize report.pdf", "openai", "u1", &metadata, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(Completion::computed("A short summary", 120, 0.0004))
            })
            .await
            .unwrap();
        assert_eq!(completion.response, "A short summary");
        assert_eq!(completion.tokens_used, 120);
    }

    assert_eq!(computed.load(Ordering::SeqCst), 1);

    let samples = app.batcher().pending();
    assert_eq!(samples.len(), 2);
    assert!(samples.iter().all(|m| m.operation == COMPLETION_OPERATION && m.success));
    assert_eq!(samples[0].cache_hit, Some(false));
    assert_eq!(samples[1].cache_hit, Some(true));

    app.batcher().destroy();
}

#[tokio::test]
async fn test_cached_flag_reflects_source() {
    let (_store, app) = app();
    let compute = || async { Ok::<_, String>(Completion::computed("R", 1, 0.0)) };

    let first = app.complete_cached("P", "openai", "u1", &json!({}), compute).await.unwrap();
    let second = app.complete_cached("P", "openai", "u1", &json!({}), compute).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    app.batcher().destroy();
}

#[tokio::test]
async fn test_compute_error_is_returned_and_not_cached() {
    let (store, app) = app();

    let result = app
        .complete_cached("P", "openai", "u1", &json!({}), || async {
            Err::<Completion, _>("provider unavailable".to_string())
        })
        .await;

    assert_eq!(result.unwrap_err(), "provider unavailable");
    assert_eq!(store.row_count("embeddings_cache"), 0);

    let samples = app.batcher().pending();
    assert_eq!(samples.len(), 1);
    assert!(!samples[0].success);
    assert_eq!(samples[0].error.as_deref(), Some("provider unavailable"));
    app.batcher().destroy();
}

#[tokio::test]
async fn test_shutdown_flushes_then_stops() {
    let (store, app) = app();
    app.complete_cached("P", "openai", "u1", &json!({}), || async {
        Ok::<_, String>(Completion::computed("R", 1, 0.0))
    })
    .await
    .unwrap();

    assert_eq!(app.shutdown().await, FlushOutcome::Sent(1));
    assert!(app.batcher().is_destroyed());
    assert!(!app.batcher().timer_running());
    assert_eq!(store.function_calls().len(), 1);
    assert_eq!(
        store.function_calls()[0].payload["metrics"][0]["operation"],
        COMPLETION_OPERATION
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_out_a_running_timer_flush() {
    let store = Arc::new(MemoryStore::new());
    let mut config = AppConfig::default();
    config.metrics.flush_interval_seconds = 1;
    let app = FileChat::with_store(store.clone(), &config);
    store.fail_next_functions(Fault::Hang, 1);

    app.complete_cached("P", "openai", "u1", &json!({}), || async {
        Ok::<_, String>(Completion::computed("R", 1, 0.0))
    })
    .await
    .unwrap();
    // let the timer flush pick the sample up and get stuck on the store
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(app.batcher().pending_len(), 0);

    assert_eq!(app.shutdown().await, FlushOutcome::Sent(1));
    assert_eq!(store.function_calls().len(), 1);
    assert_eq!(app.batcher().pending_len(), 0);
}
