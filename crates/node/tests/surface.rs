//! Tests of the operational HTTP surface against a running node.

use preranker_engine::{Config, Engine};
use preranker_memory_storage::MemoryStore;
use std::{sync::Arc, time::Duration};
use test_utils::{dry_run_ok, intent, intent_event, MapBlobStore, ScriptedEvents, ScriptedSimulator};

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

#[tokio::test]
async fn status_and_flush_endpoints() {
    let blob = MapBlobStore::new();
    let events = ScriptedEvents::new();
    blob.put_intent("blob-i-1", intent("i-1", now_ms() + 100_000));
    events.push(intent_event(1, "i-1", "blob-i-1"));

    let engine = Engine::new(
        MemoryStore::new(),
        Arc::new(blob),
        Arc::new(ScriptedSimulator::new(dry_run_ok(&[], 1_000))),
        Arc::new(events),
        Config {
            event_poll_interval_ms: 20,
            ..Config::default()
        },
    );

    let (addr_tx, addr_rx) = tokio::sync::oneshot::channel();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let jh = tokio::spawn(preranker_node::run(
        engine,
        "127.0.0.1:0",
        addr_tx,
        Some(shutdown_rx),
    ));
    let addr = addr_rx.await.expect("node failed to bind");

    // Give the poll loop a couple of ticks to pick the intent up.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let client = reqwest::Client::new();

    let health = client
        .get(format!("http://{addr}/"))
        .send()
        .await
        .unwrap();
    assert!(health.status().is_success());

    let status: serde_json::Value = client
        .get(format!("http://{addr}/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["active_intent_count"], 1);
    assert_eq!(status["current_cursor"]["event_seq"], 1);
    assert!(status["last_poll_ts"].is_u64());

    // The debug trigger flushes the active intent.
    let flushed = client
        .post(format!("http://{addr}/flush/i-1"))
        .send()
        .await
        .unwrap();
    assert!(flushed.status().is_success());
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Second trigger: the intent is gone.
    let gone = client
        .post(format!("http://{addr}/flush/i-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(gone.status(), reqwest::StatusCode::NOT_FOUND);

    let status: serde_json::Value = client
        .get(format!("http://{addr}/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["active_intent_count"], 0);

    shutdown_tx.send(()).unwrap();
    jh.await.unwrap().unwrap();
}
