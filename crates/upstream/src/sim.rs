//! Simulator client.

use crate::{error::SimulatorError, DryRunner};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use preranker_types::DryRun;
use std::num::NonZeroU32;

/// HTTP client for the simulation service: `POST {url}` with the
/// base64-encoded transaction, answering the dry-run result.
///
/// Exactly one attempt per call; any retrying the simulator does is hidden
/// behind its own interface.
pub struct HttpSimulatorClient {
    http: reqwest::Client,
    url: reqwest::Url,
    limiter: Option<DefaultDirectRateLimiter>,
}

#[derive(serde::Serialize)]
struct DryRunRequest<'a> {
    transaction_bytes: &'a str,
}

impl HttpSimulatorClient {
    /// Build a client for the simulator at `url`, issuing at most `rps`
    /// requests per second (0 disables the cap).
    pub fn new(url: &str, rps: u32) -> anyhow::Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            url: reqwest::Url::parse(url)?,
            limiter: NonZeroU32::new(rps).map(|rps| RateLimiter::direct(Quota::per_second(rps))),
        })
    }
}

#[async_trait::async_trait]
impl DryRunner for HttpSimulatorClient {
    async fn dry_run(&self, transaction_bytes: &str) -> Result<DryRun, SimulatorError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        let response = self
            .http
            .post(self.url.clone())
            .json(&DryRunRequest { transaction_bytes })
            .send()
            .await
            .map_err(|err| SimulatorError::Transient(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SimulatorError::Transient(format!(
                "simulator answered {status}"
            )));
        }
        response
            .json::<DryRun>()
            .await
            .map_err(|err| SimulatorError::Malformed(err.to_string()))
    }
}
