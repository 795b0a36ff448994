//! The intent lifecycle coordinator.
//!
//! One task per active intent, fed by a single-consumer mailbox. The task
//! `select!`s over its mailbox, its window deadline and its in-flight
//! pipeline set, so record writes, counters and the flush transition all
//! happen on one thread of control. That gives the required per-intent
//! ordering without a lock: intent-open completes before any solution runs,
//! record writes never race the flush's read of the passed set, and the
//! `ACCEPTING -> FLUSHING` transition is a plain state check.
//!
//! The window timer is a `sleep_until` select arm rather than a detached
//! callback, so cancelling it is local: the task simply stops selecting on
//! it once the state leaves `ACCEPTING`.

use crate::{
    config::Config,
    pipeline::{prerank_solution, PipelineOutcome, PipelineServices},
    publish::RankingPublisher,
    status::StatusHandle,
};
use preranker_storage::{IntentStore, KeyValueStore, RankingQueue, RecordWrite};
use preranker_types::{
    ChainEvent, Intent, IntentSubmittedEvent, RankingPayload, SolutionSubmittedEvent,
};
use preranker_upstream::{BlobFetch, DryRunner};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    sync::{mpsc, Semaphore},
    task::JoinSet,
};

/// Mailbox depth per intent; sends block once a window's backlog reaches
/// this, which is the ingestor's backpressure.
const MAILBOX_CAPACITY: usize = 64;

pub(crate) enum IntentMsg {
    Solution(SolutionSubmittedEvent),
    FlushNow,
}

enum Lifecycle {
    Accepting,
    Flushing,
    Terminated,
}

/// Routes chain events to per-intent tasks and owns the active-intents map.
/// Cheap to clone.
pub struct Coordinator<S>
where
    S: KeyValueStore + Clone,
{
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Coordinator<S>
where
    S: KeyValueStore + Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<S>
where
    S: KeyValueStore + Clone,
{
    intents: IntentStore<S>,
    publisher: RankingPublisher<S>,
    services: PipelineServices,
    config: Config,
    status: StatusHandle,
    active: Mutex<HashMap<String, ActiveIntent>>,
    pipeline_permits: Arc<Semaphore>,
}

struct ActiveIntent {
    tx: mpsc::Sender<IntentMsg>,
    abort: tokio::task::AbortHandle,
}

impl<S> Coordinator<S>
where
    S: KeyValueStore + Clone,
{
    pub(crate) fn new(
        store: S,
        blob: Arc<dyn BlobFetch>,
        simulator: Arc<dyn DryRunner>,
        config: Config,
        status: StatusHandle,
    ) -> Self {
        let intents = IntentStore::new(store.clone(), config.record_ttl());
        let publisher = RankingPublisher::new(
            RankingQueue::new(store),
            config.publish_retry_limit,
            config.enqueue_timeout(),
        );
        let services = PipelineServices {
            blob,
            simulator,
            fetch_timeout: config.fetch_timeout(),
            simulator_timeout: config.simulator_timeout(),
        };
        let pipeline_permits = Arc::new(Semaphore::new(config.pipeline_concurrency.max(1)));
        Self {
            inner: Arc::new(Inner {
                intents,
                publisher,
                services,
                config,
                status,
                active: Mutex::new(HashMap::new()),
                pipeline_permits,
            }),
        }
    }

    /// Route one chain event. Never fails; every error path is logged and
    /// the event dropped, leaving recovery to event replay.
    pub async fn handle_event(&self, event: ChainEvent) {
        match event {
            ChainEvent::IntentSubmitted(event) => self.on_intent_submitted(event).await,
            ChainEvent::SolutionSubmitted(event) => self.on_solution_submitted(event).await,
        }
    }

    async fn on_intent_submitted(&self, event: IntentSubmittedEvent) {
        let intent_id = event.intent_id.clone();
        if self.inner.contains_active(&intent_id) {
            // Replay of an event we already handled, or a duplicate intent
            // id on chain. Either way the existing context stands.
            tracing::warn!(intent_id, "intent already active, dropping event");
            return;
        }

        let fetched = tokio::time::timeout(
            self.inner.services.fetch_timeout,
            self.inner.services.blob.fetch_intent(&event.blob_id),
        )
        .await;
        let intent = match fetched {
            Ok(Ok(intent)) => intent,
            Ok(Err(err)) => {
                tracing::warn!(intent_id, %err, "intent body fetch failed, dropping event");
                return;
            }
            Err(_) => {
                tracing::warn!(intent_id, "intent body fetch timed out, dropping event");
                return;
            }
        };
        if intent.intent_id != intent_id {
            tracing::warn!(
                intent_id,
                body_intent_id = intent.intent_id,
                "intent body does not match event, dropping"
            );
            return;
        }

        let persisted = tokio::time::timeout(
            self.inner.config.store_timeout(),
            self.inner.intents.put_intent(&intent),
        )
        .await;
        match persisted {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(intent_id, %err, "intent body store failed, dropping event");
                return;
            }
            Err(_) => {
                tracing::warn!(intent_id, "intent body store timed out, dropping event");
                return;
            }
        }

        let intent = Arc::new(intent);
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let task = tokio::spawn(intent_task(self.inner.clone(), intent.clone(), rx));
        let count = {
            let mut active = self.inner.lock_active();
            active.insert(
                intent_id.clone(),
                ActiveIntent {
                    tx,
                    abort: task.abort_handle(),
                },
            );
            active.len()
        };
        self.inner.status.set_active_intents(count);
        tracing::info!(
            intent_id,
            window_end_ms = intent.window_end_ms,
            active_intents = count,
            "intent accepted"
        );
    }

    async fn on_solution_submitted(&self, event: SolutionSubmittedEvent) {
        let intent_id = event.intent_id.clone();
        let solution_id = event.solution_id.clone();
        let tx = self
            .inner
            .lock_active()
            .get(&intent_id)
            .map(|active| active.tx.clone());
        let Some(tx) = tx else {
            // Normal for late events whose intent already flushed.
            tracing::warn!(intent_id, solution_id, "solution for inactive intent, dropping");
            return;
        };
        if tx.send(IntentMsg::Solution(event)).await.is_err() {
            tracing::debug!(
                intent_id,
                solution_id,
                "intent task closed during handoff, dropping"
            );
        }
    }

    /// Trigger a flush ahead of the window deadline. Returns false when the
    /// intent is not active. Runs the same procedure, under the same gate,
    /// as the timer.
    pub async fn flush(&self, intent_id: &str) -> bool {
        let tx = self
            .inner
            .lock_active()
            .get(intent_id)
            .map(|active| active.tx.clone());
        match tx {
            Some(tx) => tx.send(IntentMsg::FlushNow).await.is_ok(),
            None => false,
        }
    }

    /// Number of intents currently accepting solutions.
    pub fn active_count(&self) -> usize {
        self.inner.lock_active().len()
    }

    /// Abort every per-intent task without flushing. Used on shutdown;
    /// window state is reconstructed from the durable cursor on restart.
    pub fn abort_all(&self) {
        let mut active = self.inner.lock_active();
        for (_, intent) in active.drain() {
            intent.abort.abort();
        }
        drop(active);
        self.inner.status.set_active_intents(0);
    }
}

impl<S> Inner<S>
where
    S: KeyValueStore + Clone,
{
    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<String, ActiveIntent>> {
        self.active.lock().expect("active-intents lock poisoned")
    }

    fn contains_active(&self, intent_id: &str) -> bool {
        self.lock_active().contains_key(intent_id)
    }

    fn remove_active(&self, intent_id: &str) {
        let count = {
            let mut active = self.lock_active();
            active.remove(intent_id);
            active.len()
        };
        self.status.set_active_intents(count);
    }
}

struct IntentContext {
    intent: Arc<Intent>,
    state: Lifecycle,
    passed: u64,
    failed: u64,
}

/// The single consumer of one intent's mailbox, alive from intent-open to
/// terminal cleanup.
async fn intent_task<S>(
    inner: Arc<Inner<S>>,
    intent: Arc<Intent>,
    mut rx: mpsc::Receiver<IntentMsg>,
) where
    S: KeyValueStore + Clone,
{
    let intent_id = intent.intent_id.clone();
    let delay = Duration::from_millis(intent.window_end_ms.saturating_sub(crate::now_ms()));
    let deadline = tokio::time::Instant::now() + delay;
    let mut ctx = IntentContext {
        intent,
        state: Lifecycle::Accepting,
        passed: 0,
        failed: 0,
    };
    let mut inflight: JoinSet<PipelineOutcome> = JoinSet::new();

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                flush_intent(&inner, &mut ctx).await;
                break;
            }
            message = rx.recv() => match message {
                Some(IntentMsg::Solution(event)) => {
                    let services = inner.services.clone();
                    let permits = inner.pipeline_permits.clone();
                    let intent = ctx.intent.clone();
                    inflight.spawn(async move {
                        // Closed only at process end; treat as unlimited.
                        let _permit = permits.acquire_owned().await.ok();
                        prerank_solution(&services, &intent, &event).await
                    });
                }
                Some(IntentMsg::FlushNow) => {
                    flush_intent(&inner, &mut ctx).await;
                    break;
                }
                // The coordinator dropped the sender; stop without
                // flushing.
                None => break,
            },
            Some(result) = inflight.join_next(), if !inflight.is_empty() => {
                match result {
                    Ok(outcome) => apply_outcome(&inner, &mut ctx, outcome).await,
                    Err(err) => {
                        tracing::warn!(intent_id, %err, "pipeline task failed to join");
                    }
                }
            }
        }
    }

    // Anything still in flight is discarded; a late record write would
    // target the deleted tree and be dropped by the store layer.
    inflight.shutdown().await;
    inner.remove_active(&intent_id);
    tracing::debug!(intent_id, "intent task finished");
}

/// Apply one pipeline outcome to the store and the context counters.
/// Runs only on the intent task, so it cannot race a flush.
async fn apply_outcome<S>(inner: &Arc<Inner<S>>, ctx: &mut IntentContext, outcome: PipelineOutcome)
where
    S: KeyValueStore + Clone,
{
    let intent_id = ctx.intent.intent_id.as_str();
    let store_timeout = inner.config.store_timeout();
    match outcome {
        PipelineOutcome::Passed(record) => {
            let solution_id = record.solution_id.clone();
            let write = tokio::time::timeout(
                store_timeout,
                inner.intents.record_passed(intent_id, record),
            )
            .await;
            match write {
                Ok(Ok(RecordWrite::Recorded)) => {
                    ctx.passed += 1;
                    tracing::info!(intent_id, solution_id, "solution passed pre-ranking");
                }
                Ok(Ok(RecordWrite::Duplicate)) => {
                    tracing::debug!(intent_id, solution_id, "duplicate pass record, ignoring");
                }
                Ok(Ok(RecordWrite::Discarded)) => {
                    tracing::debug!(intent_id, solution_id, "pass record discarded");
                }
                Ok(Err(err)) => {
                    tracing::warn!(intent_id, solution_id, %err, "pass record write failed");
                }
                Err(_) => {
                    tracing::warn!(intent_id, solution_id, "pass record write timed out");
                }
            }
        }
        PipelineOutcome::Failed(record) => {
            let solution_id = record.solution_id.clone();
            let reason = record.reason;
            let write = tokio::time::timeout(
                store_timeout,
                inner.intents.record_failed(intent_id, record),
            )
            .await;
            match write {
                Ok(Ok(RecordWrite::Recorded)) => {
                    ctx.failed += 1;
                    tracing::info!(
                        intent_id,
                        solution_id,
                        reason = ?reason,
                        "solution failed pre-ranking"
                    );
                }
                Ok(Ok(RecordWrite::Duplicate)) => {
                    tracing::debug!(intent_id, solution_id, "duplicate fail record, ignoring");
                }
                Ok(Ok(RecordWrite::Discarded)) => {
                    tracing::debug!(intent_id, solution_id, "fail record discarded");
                }
                Ok(Err(err)) => {
                    tracing::warn!(intent_id, solution_id, %err, "fail record write failed");
                }
                Err(_) => {
                    tracing::warn!(intent_id, solution_id, "fail record write timed out");
                }
            }
        }
    }
}

/// The flush procedure, shared by the window timer and the manual trigger.
///
/// The state check is the at-most-once gate: this task is the only writer
/// of `ctx.state`, so a second trigger finds `Flushing` or `Terminated` and
/// returns. Every error path still terminates the context; flush errors
/// are swallowed after logging.
#[tracing::instrument(skip_all, fields(intent_id = %ctx.intent.intent_id))]
async fn flush_intent<S>(inner: &Arc<Inner<S>>, ctx: &mut IntentContext)
where
    S: KeyValueStore + Clone,
{
    if !matches!(ctx.state, Lifecycle::Accepting) {
        return;
    }
    ctx.state = Lifecycle::Flushing;
    let intent_id = ctx.intent.intent_id.clone();
    let window_closed_at = crate::now_ms();

    if ctx.passed == 0 && !inner.config.flush_on_empty_passed {
        tracing::info!(failed = ctx.failed, "window closed with no passed solutions");
        if let Err(err) = inner.intents.delete_intent_tree(&intent_id).await {
            tracing::warn!(%err, "failed to delete intent tree");
        }
        ctx.state = Lifecycle::Terminated;
        return;
    }

    let passed = match inner.intents.list_passed(&intent_id).await {
        Ok(passed) => passed,
        Err(err) => {
            tracing::error!(%err, "failed to read passed set at flush, terminating intent");
            ctx.state = Lifecycle::Terminated;
            return;
        }
    };
    let failed = match inner.intents.count_failed(&intent_id).await {
        Ok(failed) => failed,
        Err(err) => {
            tracing::warn!(%err, "failed to count failed set, using in-memory counter");
            ctx.failed
        }
    };

    let payload = RankingPayload {
        intent_id: intent_id.clone(),
        intent: (*ctx.intent).clone(),
        total_solutions_submitted: passed.len() as u64 + failed,
        passed_solutions: passed,
        window_closed_at,
    };
    inner.publisher.publish(&payload).await;

    if inner.config.eager_delete_on_flush {
        if let Err(err) = inner.intents.delete_intent_tree(&intent_id).await {
            tracing::warn!(%err, "failed to delete intent tree after flush");
        }
    }
    ctx.state = Lifecycle::Terminated;
}
