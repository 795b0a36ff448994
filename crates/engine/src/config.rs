use serde::Deserialize;
use std::time::Duration;

/// Engine configuration. Every field has a default, so a config file only
/// needs to name what it overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Ingestor tick interval in milliseconds.
    pub event_poll_interval_ms: u64,
    /// Maximum events per stream per tick.
    pub event_batch_limit: usize,
    /// When false, the ingestor is inert until externally started.
    pub auto_start_listener: bool,
    /// TTL applied to all per-intent records, in milliseconds.
    pub record_ttl_ms: u64,
    /// When true, a flush with zero passed solutions still publishes an
    /// empty payload instead of silently deleting the intent tree.
    pub flush_on_empty_passed: bool,
    /// Pipeline worker pool size across all intents.
    pub pipeline_concurrency: usize,
    /// Deadline for a single simulator call, in milliseconds.
    pub simulator_timeout_ms: u64,
    /// Deadline for a single blob fetch, in milliseconds.
    pub fetch_timeout_ms: u64,
    /// Deadline for a single store operation, in milliseconds.
    pub store_timeout_ms: u64,
    /// Deadline for a single ranking enqueue attempt, in milliseconds.
    pub enqueue_timeout_ms: u64,
    /// Enqueue attempts before an intent is declared lost.
    pub publish_retry_limit: u32,
    /// When true, the intent tree is deleted immediately after a successful
    /// flush instead of being left to expire for auditability.
    pub eager_delete_on_flush: bool,
    /// Blob store requests per second, 0 for unlimited.
    pub blob_rps: u32,
    /// Simulator requests per second, 0 for unlimited.
    pub simulator_rps: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            event_poll_interval_ms: 2_000,
            event_batch_limit: 50,
            auto_start_listener: true,
            record_ttl_ms: 3_600_000,
            flush_on_empty_passed: false,
            pipeline_concurrency: 32,
            simulator_timeout_ms: 10_000,
            fetch_timeout_ms: 5_000,
            store_timeout_ms: 1_000,
            enqueue_timeout_ms: 2_000,
            publish_retry_limit: 5,
            eager_delete_on_flush: false,
            blob_rps: 50,
            simulator_rps: 20,
        }
    }
}

impl Config {
    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.event_poll_interval_ms)
    }

    pub(crate) fn record_ttl(&self) -> Duration {
        Duration::from_millis(self.record_ttl_ms)
    }

    pub(crate) fn simulator_timeout(&self) -> Duration {
        Duration::from_millis(self.simulator_timeout_ms)
    }

    pub(crate) fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub(crate) fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub(crate) fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }
}
