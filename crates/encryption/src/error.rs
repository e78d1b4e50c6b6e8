use thiserror::Error;

/// Errors raised by the layered-encryption core.
///
/// Every layer reports its own typed failure so callers can tell which layer
/// broke; none of these conditions may be absorbed into a default value.
#[derive(Error, Debug)]
pub enum EncryptionError {
    /// Key material errors
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("key too short: need {needed} bytes, have {actual}")]
    KeyTooShort { needed: usize, actual: usize },

    #[error("key not found: {id}")]
    KeyNotFound { id: String },

    /// AEAD layer
    #[error("authentication failed: AEAD tag mismatch")]
    AuthenticationFailed,

    /// Envelope framing
    #[error("envelope corrupted: {0}")]
    EnvelopeCorrupted(String),

    /// Key exchange handshakes
    #[error("key exchange not found: {id}")]
    KeyExchangeNotFound { id: String },

    #[error("key exchange expired: {id}")]
    KeyExchangeExpired { id: String },

    #[error("key exchange {id} is {status}, expected pending")]
    KeyExchangeInvalidState { id: String, status: String },

    /// Serialization errors outside the envelope boundary
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for core encryption operations
pub type Result<T> = std::result::Result<T, EncryptionError>;
