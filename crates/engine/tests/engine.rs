//! End-to-end tests of the engine loop against scripted upstreams and the
//! in-memory store. Timer-sensitive tests run on the paused clock.

use preranker_engine::{Config, Engine, EngineHandle};
use preranker_memory_storage::MemoryStore;
use preranker_storage::{CursorStore, IntentStore, KeyValueStore, RankingQueue, StoreError};
use preranker_types::{Amount, Constraints};
use std::{sync::Arc, time::Duration};
use test_utils::{
    bound, dry_run_ok, intent_event, intent_with_constraints, solution, solution_event,
    MapBlobStore, ScriptedEvents, ScriptedSimulator, USDC, USER,
};

struct Harness {
    store: MemoryStore,
    blob: MapBlobStore,
    simulator: ScriptedSimulator,
    events: ScriptedEvents,
    config: Config,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            blob: MapBlobStore::new(),
            simulator: ScriptedSimulator::new(dry_run_ok(&[(USER, USDC, 101_000)], 1_000)),
            events: ScriptedEvents::new(),
            config: Config {
                event_poll_interval_ms: 20,
                ..Config::default()
            },
        }
    }

    async fn spawn(&self) -> EngineHandle<MemoryStore> {
        Engine::new(
            self.store.clone(),
            Arc::new(self.blob.clone()),
            Arc::new(self.simulator.clone()),
            Arc::new(self.events.clone()),
            self.config.clone(),
        )
        .spawn()
        .await
        .expect("engine spawn")
    }

    fn intents(&self) -> IntentStore<MemoryStore> {
        IntentStore::new(self.store.clone(), Duration::from_secs(3600))
    }

    fn queue(&self) -> RankingQueue<MemoryStore> {
        RankingQueue::new(self.store.clone())
    }

    /// Standard constraints of the happy-path scenario: 1% slippage cap and
    /// a 100_000 USDC minimum.
    fn constraints() -> Constraints {
        Constraints {
            max_slippage_bps: Some(100),
            min_outputs: Some(vec![bound(USDC, 100_000)]),
            ..Constraints::default()
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

#[tokio::test(start_paused = true)]
async fn happy_path_flushes_one_payload() {
    let harness = Harness::new();
    let window_end = now_ms() + 500;
    harness.blob.put_intent(
        "blob-i-1",
        intent_with_constraints("i-1", window_end, Harness::constraints()),
    );
    harness
        .blob
        .put_solution("blob-s-1", solution("s-1", "i-1", now_ms()));
    harness.events.push(intent_event(1, "i-1", "blob-i-1"));
    harness.events.push(solution_event(2, "i-1", "s-1", "blob-s-1"));

    let handle = harness.spawn().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Mid-window: the pass record is in, nothing flushed yet.
    assert_eq!(handle.coordinator().active_count(), 1);
    assert_eq!(harness.intents().count_passed("i-1").await.unwrap(), 1);
    assert!(harness.queue().is_empty().await.unwrap());

    tokio::time::sleep(Duration::from_millis(600)).await;

    let payloads = harness.queue().snapshot().await.unwrap();
    assert_eq!(payloads.len(), 1);
    let payload = &payloads[0];
    assert_eq!(payload.intent_id, "i-1");
    assert_eq!(payload.passed_solutions.len(), 1);
    assert_eq!(payload.passed_solutions[0].solution_id, "s-1");
    assert_eq!(payload.total_solutions_submitted, 1);
    assert_eq!(payload.passed_solutions[0].features.surplus, Amount(1_000));
    assert_eq!(handle.coordinator().active_count(), 0);

    // The cursor is durably past both events.
    let cursor = CursorStore::new(harness.store.clone())
        .load()
        .await
        .unwrap()
        .expect("cursor stored");
    assert_eq!(cursor.event_seq, 2);

    let status = handle.status().snapshot();
    assert_eq!(status.active_intent_count, 0);
    assert!(status.last_poll_ts.is_some());
    assert_eq!(status.current_cursor.map(|c| c.event_seq), Some(2));

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn late_solution_fails_and_empty_window_publishes_nothing() {
    let harness = Harness::new();
    let window_end = now_ms() + 500;
    harness.blob.put_intent(
        "blob-i-1",
        intent_with_constraints("i-1", window_end, Harness::constraints()),
    );
    // The body says it was submitted after the window closed.
    harness
        .blob
        .put_solution("blob-s-1", solution("s-1", "i-1", window_end + 1_000));
    harness.events.push(intent_event(1, "i-1", "blob-i-1"));
    harness.events.push(solution_event(2, "i-1", "s-1", "blob-s-1"));

    let handle = harness.spawn().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(harness.intents().count_passed("i-1").await.unwrap(), 0);
    assert_eq!(harness.intents().count_failed("i-1").await.unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(600)).await;

    // Zero passed solutions: no payload, and the tree is deleted.
    assert!(harness.queue().is_empty().await.unwrap());
    assert!(harness.intents().get_intent("i-1").await.unwrap().is_none());
    assert_eq!(harness.intents().count_failed("i-1").await.unwrap(), 0);
    assert_eq!(handle.coordinator().active_count(), 0);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn empty_intent_window_closes_silently() {
    let harness = Harness::new();
    harness.blob.put_intent(
        "blob-i-1",
        intent_with_constraints("i-1", now_ms() + 300, Harness::constraints()),
    );
    harness.events.push(intent_event(1, "i-1", "blob-i-1"));

    let handle = harness.spawn().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.coordinator().active_count(), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(harness.queue().is_empty().await.unwrap());
    assert!(harness.intents().get_intent("i-1").await.unwrap().is_none());
    assert_eq!(handle.coordinator().active_count(), 0);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn replayed_solution_events_do_not_double_record() {
    let harness = Harness::new();
    let window_end = now_ms() + 500;
    harness.blob.put_intent(
        "blob-i-1",
        intent_with_constraints("i-1", window_end, Harness::constraints()),
    );
    harness
        .blob
        .put_solution("blob-s-1", solution("s-1", "i-1", now_ms()));
    harness.events.push(intent_event(1, "i-1", "blob-i-1"));
    harness.events.push(solution_event(2, "i-1", "s-1", "blob-s-1"));
    // A redelivery of the same solution under a new event id, as after a
    // crash between handoff and cursor persistence.
    harness.events.push(solution_event(3, "i-1", "s-1", "blob-s-1"));

    let handle = harness.spawn().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(harness.intents().count_passed("i-1").await.unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(600)).await;
    let payloads = harness.queue().snapshot().await.unwrap();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].passed_solutions.len(), 1);
    assert_eq!(payloads[0].total_solutions_submitted, 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn saturated_intent_page_does_not_skip_events() {
    let mut harness = Harness::new();
    harness.config.event_batch_limit = 2;
    let window_end = now_ms() + 100_000;
    // Three intents; the first tick's intent page fills at seq 2 while the
    // solution stream already reaches seq 4.
    for (seq, id) in [(1, "i-1"), (2, "i-2"), (3, "i-3")] {
        harness.blob.put_intent(
            &format!("blob-{id}"),
            intent_with_constraints(id, window_end, Harness::constraints()),
        );
        harness.events.push(intent_event(seq, id, &format!("blob-{id}")));
    }
    harness
        .blob
        .put_solution("blob-s-1", solution("s-1", "i-3", now_ms()));
    harness.events.push(solution_event(4, "i-3", "s-1", "blob-s-1"));

    let handle = harness.spawn().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The cursor must not have advanced past the unfetched intent at seq 3:
    // all three intents open, and the solution for the third one is
    // processed once the later tick delivers both.
    assert_eq!(handle.coordinator().active_count(), 3);
    assert_eq!(harness.intents().count_passed("i-3").await.unwrap(), 1);
    let cursor = CursorStore::new(harness.store.clone())
        .load()
        .await
        .unwrap()
        .expect("cursor stored");
    assert_eq!(cursor.event_seq, 4);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn flush_happens_at_most_once_under_manual_triggers() {
    let harness = Harness::new();
    let window_end = now_ms() + 500;
    harness.blob.put_intent(
        "blob-i-1",
        intent_with_constraints("i-1", window_end, Harness::constraints()),
    );
    harness
        .blob
        .put_solution("blob-s-1", solution("s-1", "i-1", now_ms()));
    harness.events.push(intent_event(1, "i-1", "blob-i-1"));
    harness.events.push(solution_event(2, "i-1", "s-1", "blob-s-1"));

    let handle = harness.spawn().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Two manual triggers racing each other, then the timer.
    let coordinator = handle.coordinator();
    assert!(coordinator.flush("i-1").await);
    coordinator.flush("i-1").await;
    tokio::time::sleep(Duration::from_millis(700)).await;

    let payloads = harness.queue().snapshot().await.unwrap();
    assert_eq!(payloads.len(), 1);
    // A flush for an unknown intent reports inactive.
    assert!(!coordinator.flush("i-1").await);
    assert!(!coordinator.flush("i-404").await);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn listener_waits_for_external_start() {
    let mut harness = Harness::new();
    harness.config.auto_start_listener = false;
    harness.blob.put_intent(
        "blob-i-1",
        intent_with_constraints("i-1", now_ms() + 100_000, Harness::constraints()),
    );
    harness.events.push(intent_event(1, "i-1", "blob-i-1"));

    let handle = harness.spawn().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.coordinator().active_count(), 0);
    assert!(handle.status().snapshot().last_poll_ts.is_none());

    handle.start_listener();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.coordinator().active_count(), 1);
    assert!(handle.status().snapshot().last_poll_ts.is_some());

    handle.shutdown().await.unwrap();
}

/// Delegates to a memory store but refuses every ranking enqueue.
#[derive(Clone)]
struct EnqueueFailsStore {
    inner: MemoryStore,
}

#[async_trait::async_trait]
impl KeyValueStore for EnqueueFailsStore {
    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.inner.set(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.inner.set_add(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.inner.set_members(key).await
    }

    async fn set_card(&self, key: &str) -> Result<u64, StoreError> {
        self.inner.set_card(key).await
    }

    async fn list_push(&self, _key: &str, _value: String) -> Result<(), StoreError> {
        Err(StoreError::Backend("queue is down".to_string()))
    }

    async fn list_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, StoreError> {
        self.inner.list_range(key, start, stop).await
    }

    async fn del(&self, keys: &[String]) -> Result<(), StoreError> {
        self.inner.del(keys).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.inner.expire(key, ttl).await
    }
}

#[tokio::test(start_paused = true)]
async fn exhausted_enqueue_retries_still_terminate_the_intent() {
    let harness = Harness::new();
    let store = EnqueueFailsStore {
        inner: harness.store.clone(),
    };
    let window_end = now_ms() + 300;
    harness.blob.put_intent(
        "blob-i-1",
        intent_with_constraints("i-1", window_end, Harness::constraints()),
    );
    harness
        .blob
        .put_solution("blob-s-1", solution("s-1", "i-1", now_ms()));
    harness.events.push(intent_event(1, "i-1", "blob-i-1"));
    harness.events.push(solution_event(2, "i-1", "s-1", "blob-s-1"));

    let mut config = harness.config.clone();
    config.publish_retry_limit = 2;
    let handle = Engine::new(
        store,
        Arc::new(harness.blob.clone()),
        Arc::new(harness.simulator.clone()),
        Arc::new(harness.events.clone()),
        config,
    )
    .spawn()
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(1_500)).await;

    // The payload is lost, but the intent is not stuck.
    assert_eq!(handle.coordinator().active_count(), 0);
    assert!(harness.queue().is_empty().await.unwrap());

    handle.shutdown().await.unwrap();
}
