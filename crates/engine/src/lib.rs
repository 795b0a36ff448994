//! Core logic of the pre-ranking engine.
//!
//! The engine sits between the chain's event streams and the ranking
//! consumer. For each intent that opens a solver access window it admits
//! candidate solutions, validates each one synchronously on arrival
//! (cheap constraint checks, then a simulation, then result-dependent
//! checks), and flushes the set of passed candidates to the ranking queue
//! when the window closes.
//!
//! For an executable node wrapping this engine, see the `preranker-node`
//! crate.

use preranker_storage::{CursorStore, KeyValueStore};
use preranker_upstream::{BlobFetch, DryRunner, EventSource};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;

mod config;
mod coordinator;
mod features;
mod ingest;
mod pipeline;
mod publish;
mod run;
mod status;
pub mod validate;

pub use config::Config;
pub use coordinator::Coordinator;
pub use features::extract_features;
pub use run::Handle;
pub use status::{StatusHandle, StatusSnapshot};

use ingest::Ingestor;

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The pre-ranking engine, generic over its store backend. Collaborator
/// services are taken as trait objects so tests can script them.
pub struct Engine<S>
where
    S: KeyValueStore + Clone,
{
    store: S,
    blob: Arc<dyn BlobFetch>,
    simulator: Arc<dyn DryRunner>,
    source: Arc<dyn EventSource>,
    config: Config,
}

impl<S> Engine<S>
where
    S: KeyValueStore + Clone,
{
    /// Assemble an engine from its store, collaborators and configuration.
    pub fn new(
        store: S,
        blob: Arc<dyn BlobFetch>,
        simulator: Arc<dyn DryRunner>,
        source: Arc<dyn EventSource>,
        config: Config,
    ) -> Self {
        Self {
            store,
            blob,
            simulator,
            source,
            config,
        }
    }

    /// Probe the cursor store and spawn the ingestion loop.
    ///
    /// An unreachable cursor store here is fatal: the caller is expected to
    /// exit non-zero rather than run without durable progress tracking.
    pub async fn spawn(self) -> anyhow::Result<EngineHandle<S>> {
        let status = StatusHandle::default();
        let cursors = CursorStore::new(self.store.clone());
        let initial = cursors
            .load()
            .await
            .map_err(|err| anyhow::anyhow!("cursor store unreachable at bootstrap: {err}"))?;
        if let Some(cursor) = &initial {
            status.set_cursor(cursor.clone());
        }

        let coordinator = Coordinator::new(
            self.store.clone(),
            self.blob,
            self.simulator,
            self.config.clone(),
            status.clone(),
        );
        let ingestor = Ingestor::new(
            self.source,
            cursors,
            coordinator.clone(),
            self.config.clone(),
            status.clone(),
            initial,
        );

        let (mut handle, shutdown) = Handle::new();
        let start = Arc::new(Notify::new());
        // When the listener is not auto-started, the run loop waits on this
        // gate before polling.
        let gate = (!self.config.auto_start_listener).then(|| start.clone());
        let jh = tokio::spawn(run::run(ingestor, shutdown, gate));
        handle.set_jh(jh);

        Ok(EngineHandle {
            coordinator,
            status,
            start,
            handle,
        })
    }
}

/// A running engine: the shutdown handle plus the pieces the operational
/// surface needs.
pub struct EngineHandle<S>
where
    S: KeyValueStore + Clone,
{
    coordinator: Coordinator<S>,
    status: StatusHandle,
    start: Arc<Notify>,
    handle: Handle,
}

impl<S> EngineHandle<S>
where
    S: KeyValueStore + Clone,
{
    /// The coordinator, for manual flush triggers.
    pub fn coordinator(&self) -> Coordinator<S> {
        self.coordinator.clone()
    }

    /// The live status snapshot source.
    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Start the event listener when the engine was spawned with
    /// `auto_start_listener = false`. A no-op otherwise.
    pub fn start_listener(&self) {
        self.start.notify_one();
    }

    /// Stop the ingestor, then abort per-intent tasks without flushing.
    /// Window state is reconstructed from the durable cursor on restart.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.handle.shutdown().await?;
        self.coordinator.abort_all();
        Ok(())
    }
}
