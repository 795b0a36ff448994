use super::*;
use preranker_storage::{CursorStore, IntentStore, RecordWrite};
use preranker_types::{
    Amount, AmountSpec, AssetAmount, Constraints, DryRun, DryRunStatus, EventCursor, FailReason,
    FailedRecord, GasSummary, Intent, Operation, PassedRecord, Solution, SolutionFeatures,
};

fn intent(id: &str) -> Intent {
    Intent {
        intent_id: id.to_string(),
        user_address: "0xuser".to_string(),
        window_start_ms: 0,
        window_end_ms: 5_000,
        operation: Operation {
            mode: "swap".to_string(),
            inputs: vec![AssetAmount {
                asset_id: "0xa::sui::SUI".to_string(),
                amount: AmountSpec::Exact(Amount(1_000)),
                decimals: Some(9),
            }],
            outputs: vec![],
            expected_outputs: None,
        },
        constraints: Constraints::default(),
    }
}

fn passed(solution_id: &str, intent_id: &str) -> PassedRecord {
    PassedRecord {
        solution_id: solution_id.to_string(),
        solution: Solution {
            solution_id: solution_id.to_string(),
            intent_id: intent_id.to_string(),
            solver_address: "0xsolver".to_string(),
            submitted_at_ms: 1_000,
            transaction_bytes: "AAEC".to_string(),
            declared_inputs: None,
            route: None,
        },
        features: SolutionFeatures::default(),
        dry_run: DryRun {
            status: DryRunStatus::Ok,
            error_msg: None,
            gas: GasSummary {
                computation: Amount(1_000),
                storage: Amount(0),
                rebate: Amount(0),
            },
            events: vec![],
            balance_changes: vec![],
            object_changes: vec![],
        },
        passed_at_ms: 1_000,
    }
}

fn failed(solution_id: &str) -> FailedRecord {
    FailedRecord {
        solution_id: solution_id.to_string(),
        reason: FailReason::DryRunFailed,
        errors: vec![],
        error_msg: Some("aborted".to_string()),
        failed_at_ms: 1_000,
    }
}

#[tokio::test]
async fn string_ttl_expires() {
    let store = MemoryStore::new();
    store
        .set("k", "v".to_string(), Some(Duration::from_millis(10)))
        .await
        .unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(store.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn set_add_is_idempotent() {
    let store = MemoryStore::new();
    assert!(store.set_add("s", "a").await.unwrap());
    assert!(!store.set_add("s", "a").await.unwrap());
    assert!(store.set_add("s", "b").await.unwrap());
    assert_eq!(store.set_card("s").await.unwrap(), 2);
    let mut members = store.set_members("s").await.unwrap();
    members.sort();
    assert_eq!(members, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn wrong_type_is_an_error() {
    let store = MemoryStore::new();
    store.set("k", "v".to_string(), None).await.unwrap();
    assert!(store.set_add("k", "a").await.is_err());
    assert!(store.list_push("k", "x".to_string()).await.is_err());
}

#[tokio::test]
async fn list_range_indices() {
    let store = MemoryStore::new();
    for v in ["a", "b", "c"] {
        store.list_push("l", v.to_string()).await.unwrap();
    }
    let all = store.list_range("l", 0, -1).await.unwrap();
    assert_eq!(all, vec!["a", "b", "c"]);
    let tail = store.list_range("l", 1, 10).await.unwrap();
    assert_eq!(tail, vec!["b", "c"]);
    assert!(store.list_range("missing", 0, -1).await.unwrap().is_empty());
}

#[tokio::test]
async fn cursor_round_trip() {
    let store = MemoryStore::new();
    let cursors = CursorStore::new(store);
    assert!(cursors.load().await.unwrap().is_none());
    let cursor = EventCursor {
        event_seq: 7,
        tx_digest: "0xabc".to_string(),
    };
    cursors.store(&cursor).await.unwrap();
    assert_eq!(cursors.load().await.unwrap(), Some(cursor));
}

#[tokio::test]
async fn record_writes_are_keyed_by_solution() {
    let store = MemoryStore::new();
    let intents = IntentStore::new(store, Duration::from_secs(3600));
    intents.put_intent(&intent("i-1")).await.unwrap();

    let write = intents.record_passed("i-1", passed("s-1", "i-1")).await.unwrap();
    assert_eq!(write, RecordWrite::Recorded);

    // Replay of the same solution event is a no-op.
    let write = intents.record_passed("i-1", passed("s-1", "i-1")).await.unwrap();
    assert_eq!(write, RecordWrite::Duplicate);

    let write = intents.record_failed("i-1", failed("s-2")).await.unwrap();
    assert_eq!(write, RecordWrite::Recorded);

    assert_eq!(intents.count_passed("i-1").await.unwrap(), 1);
    assert_eq!(intents.count_failed("i-1").await.unwrap(), 1);
    let listed = intents.list_passed("i-1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].solution_id, "s-1");
}

#[tokio::test]
async fn deleted_tree_discards_writes() {
    let store = MemoryStore::new();
    let intents = IntentStore::new(store, Duration::from_secs(3600));
    intents.put_intent(&intent("i-1")).await.unwrap();
    intents.record_passed("i-1", passed("s-1", "i-1")).await.unwrap();

    intents.delete_intent_tree("i-1").await.unwrap();
    assert!(intents.get_intent("i-1").await.unwrap().is_none());
    assert_eq!(intents.count_passed("i-1").await.unwrap(), 0);

    let write = intents.record_passed("i-1", passed("s-2", "i-1")).await.unwrap();
    assert_eq!(write, RecordWrite::Discarded);
    assert_eq!(intents.count_passed("i-1").await.unwrap(), 0);
}
