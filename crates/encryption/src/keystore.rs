//! Symmetric key store and key-exchange handshakes.
//!
//! The store is the only shared mutable state in the pipeline. A single
//! email fans out into subject, body, and attachment operations that hit
//! the same key id concurrently, so every id-keyed sequence
//! (check → generate → insert, and for handshakes
//! check → transition → insert) runs as one critical section. State is
//! sharded by key id; a key and the exchange record that produced it hash
//! to the same shard, so one shard lock covers both handshake effects.
//!
//! Key bytes are immutable once created: a second `get_or_create` for the
//! same id returns the original bytes, never regenerates. Keys are
//! zeroized on drop.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use rand::{rngs::OsRng, RngCore};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use common::{unix_ts, Address, AuditSink, Event, KeyId};

use crate::error::{EncryptionError, Result};
use crate::kdf;

/// Handshake lifetime: 24 hours.
pub const EXCHANGE_TTL_SECS: u64 = 24 * 60 * 60;

const DEFAULT_SHARDS: usize = 16;

/// A named, exact-length secret.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    #[zeroize(skip)]
    id: KeyId,
    bytes: Vec<u8>,
}

impl SymmetricKey {
    pub fn id(&self) -> &KeyId {
        &self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("id", &self.id)
            .field("bytes", &"[REDACTED]")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Status of an asynchronous key-exchange handshake.
///
/// `Pending` transitions exactly once; the other three states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl ExchangeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ExchangeStatus::Pending => "pending",
            ExchangeStatus::Accepted => "accepted",
            ExchangeStatus::Rejected => "rejected",
            ExchangeStatus::Expired => "expired",
        }
    }
}

/// An out-of-band handshake establishing a shared symmetric key.
#[derive(Debug, Clone)]
pub struct KeyExchangeRecord {
    pub key_id: KeyId,
    pub sender: Address,
    pub recipient: Address,
    pub created_at: u64,
    pub expires_at: u64,
    pub status: ExchangeStatus,
    pub initiator_public_key: Vec<u8>,
    pub responder_public_key: Option<Vec<u8>>,
    pub requested_bytes: usize,
}

/// Parameters for initiating a handshake.
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    pub sender: Address,
    pub recipient: Address,
    pub initiator_public_key: Vec<u8>,
    pub requested_bytes: usize,
}

/// Result of responding to a pending handshake.
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// Accepted; the derived key is now retrievable under the exchange's id.
    Accepted(SymmetricKey),
    Rejected,
}

#[derive(Default)]
struct Shard {
    keys: HashMap<String, SymmetricKey>,
    consumed: HashMap<String, usize>,
    exchanges: HashMap<String, KeyExchangeRecord>,
}

struct StoreInner {
    shards: Box<[Mutex<Shard>]>,
    audit: Option<Arc<dyn AuditSink>>,
}

/// Concurrency-safe symmetric key store.
///
/// Cloning the handle shares the underlying store.
#[derive(Clone)]
pub struct KeyStore {
    inner: Arc<StoreInner>,
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS, None)
    }

    /// Store that reports key lifecycle events to an audit sink.
    pub fn with_audit(audit: Arc<dyn AuditSink>) -> Self {
        Self::with_shards(DEFAULT_SHARDS, Some(audit))
    }

    fn with_shards(count: usize, audit: Option<Arc<dyn AuditSink>>) -> Self {
        let shards = (0..count.max(1))
            .map(|_| Mutex::new(Shard::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            inner: Arc::new(StoreInner { shards, audit }),
        }
    }

    fn shard(&self, id: &str) -> &Mutex<Shard> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.inner.shards.len();
        &self.inner.shards[index]
    }

    fn emit(&self, event: Event) {
        if let Some(sink) = &self.inner.audit {
            sink.record(event);
        }
    }

    /// Atomic check-then-create for a named key of exactly
    /// `required_bytes` random bytes.
    ///
    /// Concurrent callers with the same id all observe the same bytes. An
    /// existing key shorter than `required_bytes` is a caller mismatch and
    /// fails with `KeyTooShort` rather than regenerating.
    pub fn get_or_create(&self, id: &KeyId, required_bytes: usize) -> Result<SymmetricKey> {
        let created = {
            let mut shard = self
                .shard(id.as_str())
                .lock()
                .expect("key store mutex poisoned");

            if let Some(existing) = shard.keys.get(id.as_str()) {
                if existing.len() < required_bytes {
                    return Err(EncryptionError::KeyTooShort {
                        needed: required_bytes,
                        actual: existing.len(),
                    });
                }
                return Ok(existing.clone());
            }

            let mut bytes = vec![0u8; required_bytes];
            OsRng.fill_bytes(&mut bytes);
            let key = SymmetricKey {
                id: id.clone(),
                bytes,
            };
            shard.keys.insert(id.as_str().to_string(), key.clone());
            key
        };

        debug!(key_id = %id, bytes = required_bytes, "created symmetric key");
        self.emit(Event::KeyCreated {
            key_id: id.clone(),
            bytes: required_bytes,
            timestamp: unix_ts(),
        });
        Ok(created)
    }

    /// Mint a fresh id and key in one step.
    pub fn generate_key(&self, size: usize) -> Result<SymmetricKey> {
        self.get_or_create(&KeyId::generate(), size)
    }

    /// Retrieve an existing key without creating one.
    pub fn fetch(&self, id: &KeyId) -> Result<SymmetricKey> {
        let shard = self
            .shard(id.as_str())
            .lock()
            .expect("key store mutex poisoned");
        shard
            .keys
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| EncryptionError::KeyNotFound {
                id: id.as_str().to_string(),
            })
    }

    pub fn contains(&self, id: &KeyId) -> bool {
        self.shard(id.as_str())
            .lock()
            .expect("key store mutex poisoned")
            .keys
            .contains_key(id.as_str())
    }

    /// Record single-use consumption for audit. Idempotent: the first call
    /// wins, repeats are no-ops. Never mutates key bytes.
    pub fn mark_consumed(&self, id: &KeyId, bytes_used: usize) -> Result<()> {
        let first = {
            let mut shard = self
                .shard(id.as_str())
                .lock()
                .expect("key store mutex poisoned");

            if !shard.keys.contains_key(id.as_str()) {
                return Err(EncryptionError::KeyNotFound {
                    id: id.as_str().to_string(),
                });
            }

            match shard.consumed.entry(id.as_str().to_string()) {
                std::collections::hash_map::Entry::Occupied(_) => false,
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(bytes_used);
                    true
                }
            }
        };

        if first {
            self.emit(Event::KeyConsumed {
                key_id: id.clone(),
                bytes_used,
                timestamp: unix_ts(),
            });
        }
        Ok(())
    }

    /// Bytes recorded by [`Self::mark_consumed`], if any.
    pub fn consumed_bytes(&self, id: &KeyId) -> Option<usize> {
        self.shard(id.as_str())
            .lock()
            .expect("key store mutex poisoned")
            .consumed
            .get(id.as_str())
            .copied()
    }

    /// Explicit expiry: drop a key (and its usage record). Returns whether
    /// anything was removed.
    pub fn remove(&self, id: &KeyId) -> bool {
        let removed = {
            let mut shard = self
                .shard(id.as_str())
                .lock()
                .expect("key store mutex poisoned");
            shard.consumed.remove(id.as_str());
            shard.keys.remove(id.as_str()).is_some()
        };

        if removed {
            self.emit(Event::KeyRemoved {
                key_id: id.clone(),
                timestamp: unix_ts(),
            });
        }
        removed
    }

    /// Number of keys currently held.
    pub fn key_count(&self) -> usize {
        self.inner
            .shards
            .iter()
            .map(|shard| shard.lock().expect("key store mutex poisoned").keys.len())
            .sum()
    }

    /// Open a handshake with the default 24-hour expiry.
    pub fn initiate_handshake(&self, request: HandshakeRequest) -> Result<KeyId> {
        self.initiate_handshake_with_ttl(request, EXCHANGE_TTL_SECS)
    }

    /// Open a handshake with an explicit time-to-live in seconds.
    pub fn initiate_handshake_with_ttl(
        &self,
        request: HandshakeRequest,
        ttl_secs: u64,
    ) -> Result<KeyId> {
        let key_id = KeyId::generate();
        let now = unix_ts();
        let record = KeyExchangeRecord {
            key_id: key_id.clone(),
            sender: request.sender.clone(),
            recipient: request.recipient.clone(),
            created_at: now,
            expires_at: now + ttl_secs,
            status: ExchangeStatus::Pending,
            initiator_public_key: request.initiator_public_key,
            responder_public_key: None,
            requested_bytes: request.requested_bytes,
        };
        let expires_at = record.expires_at;

        {
            let mut shard = self
                .shard(key_id.as_str())
                .lock()
                .expect("key store mutex poisoned");
            shard
                .exchanges
                .insert(key_id.as_str().to_string(), record);
        }

        debug!(key_id = %key_id, recipient = %request.recipient, "initiated key exchange");
        self.emit(Event::ExchangeInitiated {
            key_id: key_id.clone(),
            sender: request.sender,
            recipient: request.recipient,
            expires_at,
        });
        Ok(key_id)
    }

    /// Resolve a pending handshake.
    ///
    /// The existence, expiry, and status checks, the status transition, and
    /// (on accept) the derived-key insert all happen under the one shard
    /// lock: concurrent callers observe the transition and the key
    /// atomically together. Accessing a pending record past its expiry
    /// transitions it to `Expired` before failing.
    pub fn respond_to_handshake(
        &self,
        key_id: &KeyId,
        responder_public_key: &[u8],
        accept: bool,
    ) -> Result<HandshakeOutcome> {
        let outcome = {
            let mut guard = self
                .shard(key_id.as_str())
                .lock()
                .expect("key store mutex poisoned");
            let shard = &mut *guard;

            let record = shard.exchanges.get_mut(key_id.as_str()).ok_or_else(|| {
                EncryptionError::KeyExchangeNotFound {
                    id: key_id.as_str().to_string(),
                }
            })?;

            if record.status != ExchangeStatus::Pending {
                return Err(EncryptionError::KeyExchangeInvalidState {
                    id: key_id.as_str().to_string(),
                    status: record.status.label().to_string(),
                });
            }

            if unix_ts() >= record.expires_at {
                record.status = ExchangeStatus::Expired;
                return Err(EncryptionError::KeyExchangeExpired {
                    id: key_id.as_str().to_string(),
                });
            }

            if !accept {
                record.status = ExchangeStatus::Rejected;
                HandshakeOutcome::Rejected
            } else {
                record.status = ExchangeStatus::Accepted;
                record.responder_public_key = Some(responder_public_key.to_vec());

                // Both parties hold both public halves, so the derived key
                // is reproducible on either side.
                let mut seed_input = record.initiator_public_key.clone();
                seed_input.extend_from_slice(responder_public_key);
                let seed = kdf::normalize(&seed_input);
                let key = SymmetricKey {
                    id: key_id.clone(),
                    bytes: kdf::expand(&seed, record.requested_bytes),
                };

                shard.keys.insert(key_id.as_str().to_string(), key.clone());
                HandshakeOutcome::Accepted(key)
            }
        };

        let label = match &outcome {
            HandshakeOutcome::Accepted(_) => "accepted",
            HandshakeOutcome::Rejected => "rejected",
        };
        debug!(key_id = %key_id, outcome = label, "resolved key exchange");
        self.emit(Event::ExchangeResolved {
            key_id: key_id.clone(),
            outcome: label.to_string(),
            timestamp: unix_ts(),
        });
        Ok(outcome)
    }

    /// Snapshot of an exchange record.
    pub fn exchange(&self, key_id: &KeyId) -> Option<KeyExchangeRecord> {
        self.shard(key_id.as_str())
            .lock()
            .expect("key store mutex poisoned")
            .exchanges
            .get(key_id.as_str())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn request(bytes: usize) -> HandshakeRequest {
        HandshakeRequest {
            sender: Address::new("alice@example.org"),
            recipient: Address::new("bob@example.org"),
            initiator_public_key: vec![0xA1; 64],
            requested_bytes: bytes,
        }
    }

    #[test]
    fn test_get_or_create_is_stable() {
        let store = KeyStore::new();
        let id = KeyId::generate();

        let first = store.get_or_create(&id, 128).unwrap();
        let second = store.get_or_create(&id, 128).unwrap();

        assert_eq!(first.bytes(), second.bytes());
        assert_eq!(first.len(), 128);
    }

    #[test]
    fn test_keys_are_random_per_id() {
        let store = KeyStore::new();
        let a = store.generate_key(64).unwrap();
        let b = store.generate_key(64).unwrap();
        assert_ne!(a.bytes(), b.bytes());
    }

    #[test]
    fn test_existing_shorter_key_is_rejected() {
        let store = KeyStore::new();
        let id = KeyId::generate();
        store.get_or_create(&id, 16).unwrap();

        let err = store.get_or_create(&id, 32).unwrap_err();
        assert!(matches!(err, EncryptionError::KeyTooShort { .. }));
    }

    #[test]
    fn test_longer_existing_key_is_returned_whole() {
        let store = KeyStore::new();
        let id = KeyId::generate();
        let created = store.get_or_create(&id, 64).unwrap();

        let fetched = store.get_or_create(&id, 16).unwrap();
        assert_eq!(fetched.bytes(), created.bytes());
        assert_eq!(fetched.len(), 64);
    }

    #[test]
    fn test_fetch_missing_key() {
        let store = KeyStore::new();
        let err = store.fetch(&KeyId::from_string("K0-missing")).unwrap_err();
        assert!(matches!(err, EncryptionError::KeyNotFound { .. }));
    }

    #[test]
    fn test_concurrent_get_or_create_same_id() {
        let store = KeyStore::new();
        let id = KeyId::generate();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let id = id.clone();
                std::thread::spawn(move || store.get_or_create(&id, 256).unwrap())
            })
            .collect();

        let keys: Vec<SymmetricKey> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for key in &keys[1..] {
            assert_eq!(key.bytes(), keys[0].bytes());
        }
        assert_eq!(store.key_count(), 1);
    }

    #[test]
    fn test_mark_consumed_is_idempotent() {
        let store = KeyStore::new();
        let key = store.generate_key(32).unwrap();

        store.mark_consumed(key.id(), 32).unwrap();
        store.mark_consumed(key.id(), 7).unwrap();

        assert_eq!(store.consumed_bytes(key.id()), Some(32));
        assert_eq!(key.bytes(), store.fetch(key.id()).unwrap().bytes());
    }

    #[test]
    fn test_mark_consumed_unknown_key() {
        let store = KeyStore::new();
        let err = store
            .mark_consumed(&KeyId::from_string("K0-missing"), 1)
            .unwrap_err();
        assert!(matches!(err, EncryptionError::KeyNotFound { .. }));
    }

    #[test]
    fn test_remove() {
        let store = KeyStore::new();
        let key = store.generate_key(8).unwrap();

        assert!(store.remove(key.id()));
        assert!(!store.remove(key.id()));
        assert!(!store.contains(key.id()));
    }

    #[test]
    fn test_handshake_accept_creates_deterministic_key() {
        let store = KeyStore::new();
        let key_id = store.initiate_handshake(request(96)).unwrap();

        let responder_pk = vec![0xB2u8; 64];
        let outcome = store
            .respond_to_handshake(&key_id, &responder_pk, true)
            .unwrap();

        let key = match outcome {
            HandshakeOutcome::Accepted(key) => key,
            other => panic!("expected acceptance, got {other:?}"),
        };

        // Either party can rederive the same bytes from the two public halves.
        let mut seed_input = vec![0xA1u8; 64];
        seed_input.extend_from_slice(&responder_pk);
        let expected = kdf::expand(&kdf::normalize(&seed_input), 96);
        assert_eq!(key.bytes(), &expected[..]);

        assert_eq!(store.fetch(&key_id).unwrap().bytes(), key.bytes());
        assert_eq!(
            store.exchange(&key_id).unwrap().status,
            ExchangeStatus::Accepted
        );
    }

    #[test]
    fn test_handshake_reject_is_terminal() {
        let store = KeyStore::new();
        let key_id = store.initiate_handshake(request(32)).unwrap();

        let outcome = store
            .respond_to_handshake(&key_id, &[0xB2; 64], false)
            .unwrap();
        assert!(matches!(outcome, HandshakeOutcome::Rejected));
        assert!(!store.contains(&key_id));

        let err = store
            .respond_to_handshake(&key_id, &[0xB2; 64], true)
            .unwrap_err();
        match err {
            EncryptionError::KeyExchangeInvalidState { status, .. } => {
                assert_eq!(status, "rejected");
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }

    #[test]
    fn test_handshake_unknown_id() {
        let store = KeyStore::new();
        let err = store
            .respond_to_handshake(&KeyId::from_string("K0-missing"), &[1], true)
            .unwrap_err();
        assert!(matches!(err, EncryptionError::KeyExchangeNotFound { .. }));
    }

    #[test]
    fn test_handshake_expiry_transitions_record() {
        let store = KeyStore::new();
        let key_id = store
            .initiate_handshake_with_ttl(request(32), 0)
            .unwrap();

        let err = store
            .respond_to_handshake(&key_id, &[0xB2; 64], true)
            .unwrap_err();
        assert!(matches!(err, EncryptionError::KeyExchangeExpired { .. }));
        assert_eq!(
            store.exchange(&key_id).unwrap().status,
            ExchangeStatus::Expired
        );

        // Terminal: a later response sees the expired state, not a retry.
        let err = store
            .respond_to_handshake(&key_id, &[0xB2; 64], true)
            .unwrap_err();
        assert!(matches!(
            err,
            EncryptionError::KeyExchangeInvalidState { .. }
        ));
    }

    struct CollectingSink {
        events: StdMutex<Vec<Event>>,
    }

    impl AuditSink for CollectingSink {
        fn record(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn test_audit_events_emitted() {
        let sink = Arc::new(CollectingSink {
            events: StdMutex::new(Vec::new()),
        });
        let store = KeyStore::with_audit(sink.clone());

        let key = store.generate_key(16).unwrap();
        store.mark_consumed(key.id(), 16).unwrap();
        store.mark_consumed(key.id(), 16).unwrap();
        store.remove(key.id());

        let events = sink.events.lock().unwrap();
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                Event::KeyCreated { .. } => "created",
                Event::KeyConsumed { .. } => "consumed",
                Event::KeyRemoved { .. } => "removed",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["created", "consumed", "removed"]);
    }

    #[test]
    fn test_debug_redacts_key_bytes() {
        let store = KeyStore::new();
        let key = store.generate_key(32).unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(&hex::encode(key.bytes())));
    }
}
