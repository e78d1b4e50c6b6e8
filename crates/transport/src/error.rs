use thiserror::Error;

/// Errors raised while talking to the external crypto services.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request never produced a response (connect failure, timeout).
    #[error("request failed: {0}")]
    Request(String),

    /// The upstream answered with a non-2xx status.
    #[error("upstream responded with status {status}")]
    UpstreamStatus { status: u16 },

    /// The upstream answered 2xx but the body did not match the contract.
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    /// All retry attempts were spent. Callers must treat this as fatal —
    /// it is never substituted with a default value.
    #[error("upstream service failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl TransportError {
    /// Whether another attempt could plausibly succeed. Client errors
    /// (4xx) and malformed bodies fail fast.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Request(_) => true,
            TransportError::UpstreamStatus { status } => *status >= 500,
            TransportError::InvalidResponse(_) => false,
            TransportError::RetriesExhausted { .. } => false,
        }
    }
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
