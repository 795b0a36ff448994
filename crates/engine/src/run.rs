use crate::ingest::Ingestor;
use preranker_storage::KeyValueStore;
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};

/// Handle for shutting down a spawned engine's run loop.
pub struct Handle {
    tx: oneshot::Sender<()>,
    jh: Option<tokio::task::JoinHandle<anyhow::Result<()>>>,
}

/// Receiver half of the shutdown signal, selected on by the run loop.
pub(crate) struct Shutdown(pub(crate) oneshot::Receiver<()>);

impl Handle {
    pub(crate) fn new() -> (Self, Shutdown) {
        let (tx, rx) = oneshot::channel();
        (Self { tx, jh: None }, Shutdown(rx))
    }

    pub(crate) fn set_jh(&mut self, jh: tokio::task::JoinHandle<anyhow::Result<()>>) {
        self.jh = Some(jh);
    }

    /// Signal shutdown and wait for the run loop to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.tx
            .send(())
            .map_err(|_| anyhow::anyhow!("engine run loop already stopped"))?;
        if let Some(jh) = self.jh {
            jh.await??;
        }
        Ok(())
    }
}

/// The engine's top-level task: optionally wait for an external start
/// signal, then run the ingestion loop until shutdown.
pub(crate) async fn run<S>(
    ingestor: Ingestor<S>,
    mut shutdown: Shutdown,
    start_gate: Option<Arc<Notify>>,
) -> anyhow::Result<()>
where
    S: KeyValueStore + Clone,
{
    if let Some(gate) = start_gate {
        tracing::info!("event listener waiting for external start");
        tokio::select! {
            _ = gate.notified() => {}
            _ = &mut shutdown.0 => return Ok(()),
        }
    }
    ingestor.run(shutdown).await
}
