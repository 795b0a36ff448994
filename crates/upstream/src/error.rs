//! Error taxonomy of the upstream clients.
//!
//! Only variants marked transient are retryable; everything else is
//! terminal for the event that triggered the call.

/// Failure fetching a blob.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// No blob exists at the address. Terminal.
    #[error("blob {0} not found")]
    NotFound(String),
    /// The blob exists but its payload failed to decode. Terminal.
    #[error("blob {blob_id} is corrupt: {message}")]
    Corrupt {
        /// The blob's address.
        blob_id: String,
        /// Why decoding failed.
        message: String,
    },
    /// The store was unreachable or answered with a server error.
    /// Retryable.
    #[error("transient blob store failure: {0}")]
    Transient(String),
}

impl BlobError {
    /// Whether retrying the fetch can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BlobError::Transient(_))
    }
}

/// Failure calling the simulator. A simulator-reported execution failure is
/// not an error; it arrives as a dry run with `status = fail`.
#[derive(Debug, thiserror::Error)]
pub enum SimulatorError {
    /// The simulator was unreachable or answered with a server error.
    #[error("transient simulator failure: {0}")]
    Transient(String),
    /// The simulator's response failed to decode.
    #[error("malformed simulator response: {0}")]
    Malformed(String),
}

/// Failure querying the chain event source.
#[derive(Debug, thiserror::Error)]
pub enum EventSourceError {
    /// The RPC was unreachable or answered with a server error.
    #[error("transient event source failure: {0}")]
    Transient(String),
    /// The RPC response failed to decode.
    #[error("malformed event source response: {0}")]
    Malformed(String),
}
