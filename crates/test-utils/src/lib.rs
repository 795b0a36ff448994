//! Shared constructors and scripted collaborators for tests across the
//! workspace.

use preranker_types::{
    Amount, AmountSpec, AssetAmount, AssetBound, BalanceChange, ChainEvent, Constraints, DryRun,
    DryRunStatus, EventCursor, EventId, GasSummary, Intent, IntentSubmittedEvent, Operation,
    SignedAmount, Solution, SolutionSubmittedEvent,
};
use preranker_upstream::{
    BlobError, BlobFetch, DryRunner, EventKind, EventPage, EventSource, EventSourceError,
    SimulatorError,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// The asset most tests trade into.
pub const USDC: &str = "0xa::usdc::USDC";
/// The asset most tests trade out of.
pub const SUI: &str = "0x2::sui::SUI";
/// The user address used by [`intent`].
pub const USER: &str = "0xuser";

/// A swap intent of 1000 SUI into USDC with the given window end and no
/// constraints.
pub fn intent(intent_id: &str, window_end_ms: u64) -> Intent {
    Intent {
        intent_id: intent_id.to_string(),
        user_address: USER.to_string(),
        window_start_ms: 0,
        window_end_ms,
        operation: Operation {
            mode: "swap".to_string(),
            inputs: vec![AssetAmount {
                asset_id: SUI.to_string(),
                amount: AmountSpec::Exact(Amount(1_000_000_000_000)),
                decimals: Some(9),
            }],
            outputs: vec![AssetAmount {
                asset_id: USDC.to_string(),
                amount: AmountSpec::Exact(Amount(100_000)),
                decimals: Some(6),
            }],
            expected_outputs: Some(vec![AssetAmount {
                asset_id: USDC.to_string(),
                amount: AmountSpec::Exact(Amount(100_000)),
                decimals: Some(6),
            }]),
        },
        constraints: Constraints::default(),
    }
}

/// [`intent`] with the given constraints.
pub fn intent_with_constraints(
    intent_id: &str,
    window_end_ms: u64,
    constraints: Constraints,
) -> Intent {
    Intent {
        constraints,
        ..intent(intent_id, window_end_ms)
    }
}

/// A minimum-output bound.
pub fn bound(asset_id: &str, amount: u128) -> AssetBound {
    AssetBound {
        asset_id: asset_id.to_string(),
        amount: Amount(amount),
    }
}

/// A solution for `intent_id` submitted at the given time.
pub fn solution(solution_id: &str, intent_id: &str, submitted_at_ms: u64) -> Solution {
    Solution {
        solution_id: solution_id.to_string(),
        intent_id: intent_id.to_string(),
        solver_address: "0xsolver".to_string(),
        submitted_at_ms,
        transaction_bytes: "AAECAwQ=".to_string(),
        declared_inputs: None,
        route: None,
    }
}

/// A successful dry run crediting the given balance changes to their
/// owners, with the given computation gas.
pub fn dry_run_ok(changes: &[(&str, &str, i128)], computation: u128) -> DryRun {
    DryRun {
        status: DryRunStatus::Ok,
        error_msg: None,
        gas: GasSummary {
            computation: Amount(computation),
            storage: Amount(0),
            rebate: Amount(0),
        },
        events: vec![],
        balance_changes: changes
            .iter()
            .map(|(owner, coin_type, amount)| BalanceChange {
                owner: owner.to_string(),
                coin_type: coin_type.to_string(),
                amount: SignedAmount(*amount),
            })
            .collect(),
        object_changes: vec![],
    }
}

/// A failed dry run with the given failure message.
pub fn dry_run_fail(error_msg: &str) -> DryRun {
    DryRun {
        status: DryRunStatus::Fail,
        error_msg: Some(error_msg.to_string()),
        gas: GasSummary {
            computation: Amount(0),
            storage: Amount(0),
            rebate: Amount(0),
        },
        events: vec![],
        balance_changes: vec![],
        object_changes: vec![],
    }
}

/// An intent-submitted chain event at the given sequence number.
pub fn intent_event(seq: u64, intent_id: &str, blob_id: &str) -> ChainEvent {
    ChainEvent::IntentSubmitted(IntentSubmittedEvent {
        id: EventId {
            event_seq: seq,
            tx_digest: format!("0xtx{seq}"),
        },
        intent_id: intent_id.to_string(),
        blob_id: blob_id.to_string(),
        timestamp_ms: None,
    })
}

/// A solution-submitted chain event at the given sequence number.
pub fn solution_event(seq: u64, intent_id: &str, solution_id: &str, blob_id: &str) -> ChainEvent {
    ChainEvent::SolutionSubmitted(SolutionSubmittedEvent {
        id: EventId {
            event_seq: seq,
            tx_digest: format!("0xtx{seq}"),
        },
        intent_id: intent_id.to_string(),
        solution_id: solution_id.to_string(),
        blob_id: blob_id.to_string(),
        timestamp_ms: None,
    })
}

/// A [`BlobFetch`] over two in-memory maps. Cheap to clone; clones share
/// state, so bodies can be inserted while an engine is running.
#[derive(Clone, Default)]
pub struct MapBlobStore {
    intents: Arc<Mutex<HashMap<String, Intent>>>,
    solutions: Arc<Mutex<HashMap<String, Solution>>>,
}

impl MapBlobStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an intent body under `blob_id`.
    pub fn put_intent(&self, blob_id: &str, intent: Intent) {
        self.intents
            .lock()
            .unwrap()
            .insert(blob_id.to_string(), intent);
    }

    /// Insert a solution body under `blob_id`.
    pub fn put_solution(&self, blob_id: &str, solution: Solution) {
        self.solutions
            .lock()
            .unwrap()
            .insert(blob_id.to_string(), solution);
    }
}

#[async_trait::async_trait]
impl BlobFetch for MapBlobStore {
    async fn fetch_intent(&self, blob_id: &str) -> Result<Intent, BlobError> {
        self.intents
            .lock()
            .unwrap()
            .get(blob_id)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(blob_id.to_string()))
    }

    async fn fetch_solution(&self, blob_id: &str) -> Result<Solution, BlobError> {
        self.solutions
            .lock()
            .unwrap()
            .get(blob_id)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(blob_id.to_string()))
    }
}

/// A [`DryRunner`] answering from a per-transaction script, with a default
/// for unscripted transactions.
#[derive(Clone)]
pub struct ScriptedSimulator {
    default: DryRun,
    by_tx: Arc<Mutex<HashMap<String, DryRun>>>,
}

impl ScriptedSimulator {
    /// Answer `default` for every transaction not scripted explicitly.
    pub fn new(default: DryRun) -> Self {
        Self {
            default,
            by_tx: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Script the answer for one transaction.
    pub fn script(&self, transaction_bytes: &str, result: DryRun) {
        self.by_tx
            .lock()
            .unwrap()
            .insert(transaction_bytes.to_string(), result);
    }
}

#[async_trait::async_trait]
impl DryRunner for ScriptedSimulator {
    async fn dry_run(&self, transaction_bytes: &str) -> Result<DryRun, SimulatorError> {
        Ok(self
            .by_tx
            .lock()
            .unwrap()
            .get(transaction_bytes)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}

/// An [`EventSource`] over a shared in-memory event log. Events pushed
/// while an engine is running are picked up by its next poll.
#[derive(Clone, Default)]
pub struct ScriptedEvents {
    log: Arc<Mutex<Vec<ChainEvent>>>,
}

impl ScriptedEvents {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to the log.
    pub fn push(&self, event: ChainEvent) {
        self.log.lock().unwrap().push(event);
    }
}

#[async_trait::async_trait]
impl EventSource for ScriptedEvents {
    async fn query_events(
        &self,
        kind: EventKind,
        cursor: Option<&EventCursor>,
        limit: usize,
    ) -> Result<EventPage, EventSourceError> {
        let mut events: Vec<ChainEvent> = self
            .log
            .lock()
            .unwrap()
            .iter()
            .filter(|event| match (kind, event) {
                (EventKind::IntentSubmitted, ChainEvent::IntentSubmitted(_)) => true,
                (EventKind::SolutionSubmitted, ChainEvent::SolutionSubmitted(_)) => true,
                _ => false,
            })
            .filter(|event| match cursor {
                Some(cursor) => {
                    let id = event.id();
                    (id.event_seq, id.tx_digest.as_str())
                        > (cursor.event_seq, cursor.tx_digest.as_str())
                }
                None => true,
            })
            .cloned()
            .collect();
        events.sort_by(|a, b| a.id().cmp(b.id()));
        events.truncate(limit);
        let next_cursor = events.last().map(|event| event.id().clone().into());
        Ok(EventPage {
            events,
            next_cursor,
        })
    }
}
