//! At-least-once publication of flush payloads to the ranking consumer.

use preranker_storage::{KeyValueStore, RankingQueue};
use preranker_types::RankingPayload;
use preranker_upstream::RetryPolicy;
use std::time::Duration;

/// Pushes flush payloads onto the consumer queue, retrying transient
/// failures with bounded back-off. After the retry budget is exhausted the
/// intent is declared lost: an operational error is logged and no state is
/// rolled back.
#[derive(Clone)]
pub(crate) struct RankingPublisher<S> {
    queue: RankingQueue<S>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
}

impl<S> RankingPublisher<S>
where
    S: KeyValueStore + Clone,
{
    pub(crate) fn new(queue: RankingQueue<S>, retry_limit: u32, attempt_timeout: Duration) -> Self {
        Self {
            queue,
            retry: RetryPolicy {
                max_attempts: retry_limit.max(1),
                ..RetryPolicy::default()
            },
            attempt_timeout,
        }
    }

    /// Publish `payload`, returning whether it was delivered.
    #[tracing::instrument(skip_all, fields(intent_id = %payload.intent_id))]
    pub(crate) async fn publish(&self, payload: &RankingPayload) -> bool {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let failure = match tokio::time::timeout(self.attempt_timeout, self.queue.push(payload))
                .await
            {
                Ok(Ok(())) => {
                    tracing::info!(
                        passed = payload.passed_solutions.len(),
                        total = payload.total_solutions_submitted,
                        "flush published to ranking queue"
                    );
                    return true;
                }
                Ok(Err(err)) => err.to_string(),
                Err(_) => "enqueue timed out".to_string(),
            };
            if attempt >= self.retry.max_attempts {
                tracing::error!(
                    failure,
                    attempts = attempt,
                    "ranking enqueue exhausted retries, intent lost"
                );
                return false;
            }
            tracing::warn!(failure, attempt, "ranking enqueue failed, retrying");
            tokio::time::sleep(self.retry.delay(attempt + 1)).await;
        }
    }
}
