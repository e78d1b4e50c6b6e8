use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod policy;
pub mod traits;

pub use policy::LayerPolicy;
pub use traits::{AuditSink, EnvelopeStore, KeyRegistry};

/// Identifier of a symmetric key held by the key store.
///
/// Minted ids follow the key-manager convention `K<unix-millis>-<hex8>` so
/// they stay chronologically sortable and collision-free across nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId(pub String);

impl KeyId {
    /// Mint a fresh key id.
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let suffix = &Uuid::new_v4().simple().to_string()[..8];
        Self(format!("K{millis}-{suffix}"))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logical mail address used to look up a recipient's KEM public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Seconds since the unix epoch.
pub fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Immutable audit events emitted by the key-management substrate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    KeyCreated {
        key_id: KeyId,
        bytes: usize,
        timestamp: u64,
    },
    KeyConsumed {
        key_id: KeyId,
        bytes_used: usize,
        timestamp: u64,
    },
    KeyRemoved {
        key_id: KeyId,
        timestamp: u64,
    },
    ExchangeInitiated {
        key_id: KeyId,
        sender: Address,
        recipient: Address,
        expires_at: u64,
    },
    ExchangeResolved {
        key_id: KeyId,
        outcome: String,
        timestamp: u64,
    },
}
