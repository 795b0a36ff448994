#![deny(missing_docs)]
//! # Upstream clients
//!
//! The three black-box services the engine talks to, behind traits so the
//! engine can be driven by scripted implementations in tests:
//!
//! - [`BlobFetch`]: content-addressed fetch of intent and solution bodies.
//! - [`DryRunner`]: simulation of a solution's transaction.
//! - [`EventSource`]: ordered queries of the chain's event streams.
//!
//! The HTTP implementations rate-limit and, where the contract permits,
//! retry with capped exponential back-off.

use preranker_types::{ChainEvent, DryRun, EventCursor, Intent, Solution};

mod blob;
mod error;
mod events;
mod retry;
mod sim;

pub use blob::HttpBlobClient;
pub use error::{BlobError, EventSourceError, SimulatorError};
pub use events::HttpEventSource;
pub use retry::RetryPolicy;
pub use sim::HttpSimulatorClient;

/// Content-addressed fetch of intent and solution payloads.
#[async_trait::async_trait]
pub trait BlobFetch: Send + Sync {
    /// Fetch and decode an intent body.
    async fn fetch_intent(&self, blob_id: &str) -> Result<Intent, BlobError>;

    /// Fetch and decode a solution body.
    async fn fetch_solution(&self, blob_id: &str) -> Result<Solution, BlobError>;
}

/// Dry-run execution of a solution's transaction.
#[async_trait::async_trait]
pub trait DryRunner: Send + Sync {
    /// Simulate the base64-encoded transaction. A simulator-reported
    /// execution failure is a successful call returning
    /// [`DryRunStatus::Fail`](preranker_types::DryRunStatus::Fail).
    async fn dry_run(&self, transaction_bytes: &str) -> Result<DryRun, SimulatorError>;
}

/// Which event stream to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Intent-submitted events.
    IntentSubmitted,
    /// Solution-submitted events.
    SolutionSubmitted,
}

/// One page of events from a stream, ascending.
#[derive(Debug, Clone)]
pub struct EventPage {
    /// The events, in ascending `(event_seq, tx_digest)` order.
    pub events: Vec<ChainEvent>,
    /// Cursor positioned after the last returned event, when the source
    /// reports one.
    pub next_cursor: Option<EventCursor>,
}

/// Ordered queries of the chain's intent and solution event streams.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Up to `limit` events of `kind` strictly after `cursor`, ascending.
    async fn query_events(
        &self,
        kind: EventKind,
        cursor: Option<&EventCursor>,
        limit: usize,
    ) -> Result<EventPage, EventSourceError>;
}
