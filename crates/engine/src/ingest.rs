//! The event ingestion loop.
//!
//! A single task polls the chain's two event streams on a fixed interval,
//! merges each tick's results into one ascending sequence, and hands every
//! event to the coordinator, blocking on its backpressure. The cursor is
//! persisted once per non-empty tick, after the last handoff returns, and
//! the in-memory position only advances past the durable store, so a
//! crash or a failed store re-delivers the tail of the tick rather than
//! skipping it. Replay is absorbed downstream by the store's
//! `(intent_id, solution_id)` unique keys.
//!
//! The two streams paginate independently, so a tick in which one stream
//! fills its page advances only to that stream's frontier; ids past it on
//! the other stream are dropped and refetched, never skipped.

use crate::{config::Config, coordinator::Coordinator, run::Shutdown, status::StatusHandle};
use anyhow::Context;
use preranker_storage::{CursorStore, KeyValueStore};
use preranker_types::{ChainEvent, EventCursor};
use preranker_upstream::{EventKind, EventPage, EventSource};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;

pub(crate) struct Ingestor<S>
where
    S: KeyValueStore + Clone,
{
    source: Arc<dyn EventSource>,
    cursors: CursorStore<S>,
    coordinator: Coordinator<S>,
    config: Config,
    status: StatusHandle,
    cursor: Option<EventCursor>,
}

impl<S> Ingestor<S>
where
    S: KeyValueStore + Clone,
{
    pub(crate) fn new(
        source: Arc<dyn EventSource>,
        cursors: CursorStore<S>,
        coordinator: Coordinator<S>,
        config: Config,
        status: StatusHandle,
        initial_cursor: Option<EventCursor>,
    ) -> Self {
        Self {
            source,
            cursors,
            coordinator,
            config,
            status,
            cursor: initial_cursor,
        }
    }

    /// Poll until shutdown. Tick failures are logged and retried on the
    /// next tick; only bootstrap problems are fatal, and those surface
    /// before this loop starts.
    pub(crate) async fn run(mut self, mut shutdown: Shutdown) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            cursor = ?self.cursor,
            interval_ms = self.config.event_poll_interval_ms,
            "event listener started"
        );
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = &mut shutdown.0 => {
                    tracing::info!("event listener stopping");
                    return Ok(());
                }
            }
            if let Err(err) = self.tick().await {
                tracing::warn!(%err, "event poll tick failed");
            }
        }
    }

    async fn tick(&mut self) -> anyhow::Result<()> {
        let limit = self.config.event_batch_limit;
        let (intents, solutions) = futures::future::try_join(
            self.source
                .query_events(EventKind::IntentSubmitted, self.cursor.as_ref(), limit),
            self.source
                .query_events(EventKind::SolutionSubmitted, self.cursor.as_ref(), limit),
        )
        .await
        .context("querying event streams")?;
        self.status.poll_observed(crate::now_ms());

        // A stream that filled its page may have more events behind it that
        // this tick never fetched. Advancing past the other stream's higher
        // ids would skip them for good, so the tick is capped at the lowest
        // frontier of any full page; everything beyond the cap is refetched
        // next tick.
        let frontier = |page: &EventPage| {
            (page.events.len() >= limit)
                .then(|| page.events.last().map(|event| EventCursor::from(event.id().clone())))
                .flatten()
        };
        let cap = match (frontier(&intents), frontier(&solutions)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let mut events: Vec<ChainEvent> = intents
            .events
            .into_iter()
            .chain(solutions.events)
            .collect();
        events.sort_by(|a, b| a.id().cmp(b.id()));
        if let Some(cap) = &cap {
            events.retain(|event| {
                let id = event.id();
                (id.event_seq, id.tx_digest.as_str()) <= (cap.event_seq, cap.tx_digest.as_str())
            });
        }
        if events.is_empty() {
            return Ok(());
        }

        let count = events.len();
        let mut last: Option<EventCursor> = None;
        for event in events {
            let id = event.id().clone();
            // Blocks on the per-intent mailbox when a window is backed up.
            self.coordinator.handle_event(event).await;
            last = Some(id.into());
        }

        if let Some(cursor) = last {
            // Durable first; the in-memory position advances only past a
            // stored cursor. A failure here re-delivers this tick's events.
            self.cursors
                .store(&cursor)
                .await
                .context("persisting event cursor")?;
            self.status.set_cursor(cursor.clone());
            self.cursor = Some(cursor);
        }
        tracing::debug!(count, cursor = ?self.cursor, "event tick consumed");
        Ok(())
    }
}
