//! Content-addressed blob store client.

use crate::{error::BlobError, retry::RetryPolicy, BlobFetch};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use preranker_types::{Intent, Solution};
use std::num::NonZeroU32;

/// HTTP client for the blob store: `GET {base}/blob/{blob_id}`.
pub struct HttpBlobClient {
    http: reqwest::Client,
    base: reqwest::Url,
    limiter: Option<DefaultDirectRateLimiter>,
    retry: RetryPolicy,
}

impl HttpBlobClient {
    /// Build a client for the store at `base`, issuing at most `rps`
    /// requests per second (0 disables the cap) and retrying transient
    /// failures per `retry`.
    pub fn new(base: &str, rps: u32, retry: RetryPolicy) -> anyhow::Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            base: reqwest::Url::parse(base)?,
            limiter: NonZeroU32::new(rps).map(|rps| RateLimiter::direct(Quota::per_second(rps))),
            retry,
        })
    }

    async fn fetch_bytes(&self, blob_id: &str) -> Result<Vec<u8>, BlobError> {
        let url = self
            .base
            .join(&format!("blob/{blob_id}"))
            .map_err(|err| BlobError::Corrupt {
                blob_id: blob_id.to_string(),
                message: format!("invalid blob id: {err}"),
            })?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }
            match self.request(&url, blob_id).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    tracing::debug!(%err, blob_id, attempt, "retrying blob fetch");
                    tokio::time::sleep(self.retry.delay(attempt + 1)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn request(&self, url: &reqwest::Url, blob_id: &str) -> Result<Vec<u8>, BlobError> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|err| BlobError::Transient(err.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound(blob_id.to_string()));
        }
        if !status.is_success() {
            return Err(BlobError::Transient(format!(
                "blob store answered {status}"
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| BlobError::Transient(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

fn corrupt(blob_id: &str, message: impl ToString) -> BlobError {
    BlobError::Corrupt {
        blob_id: blob_id.to_string(),
        message: message.to_string(),
    }
}

#[async_trait::async_trait]
impl BlobFetch for HttpBlobClient {
    async fn fetch_intent(&self, blob_id: &str) -> Result<Intent, BlobError> {
        let bytes = self.fetch_bytes(blob_id).await?;
        serde_json::from_slice(&bytes).map_err(|err| corrupt(blob_id, err))
    }

    async fn fetch_solution(&self, blob_id: &str) -> Result<Solution, BlobError> {
        let bytes = self.fetch_bytes(blob_id).await?;
        let solution: Solution =
            serde_json::from_slice(&bytes).map_err(|err| corrupt(blob_id, err))?;
        // The simulator takes the transaction as base64; reject payloads
        // that could never simulate while the failure is still attributable
        // to the blob.
        if BASE64.decode(&solution.transaction_bytes).is_err() {
            return Err(corrupt(blob_id, "transaction_bytes is not valid base64"));
        }
        Ok(solution)
    }
}
