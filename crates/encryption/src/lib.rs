//! # Layered mail encryption core
//!
//! Implements the hybrid quantum-resistant confidentiality scheme for the
//! mail platform: a post-quantum KEM outer layer, an optional AES-256-GCM
//! middle layer, and a one-time-pad inner layer fed by a managed symmetric
//! key store. Confidentiality degrades gracefully — breaking any single
//! primitive is not enough to read a message.
//!
//! ## Layers
//!
//! - **KEM** (`kem`): ML-KEM encapsulation, shared secret normalized to a
//!   fixed 32-byte seed.
//! - **AEAD** (`aead`): AES-256-GCM with explicit nonce/tag framing.
//! - **OTP** (`otp`): strict exact-length XOR; short keys are hard errors.
//!
//! ## Substrate
//!
//! - `kdf`: SHA-256 normalization and counter-mode key expansion, rerun
//!   byte-identically on both sides of an exchange.
//! - `keystore`: concurrency-safe named-key store and key-exchange
//!   handshakes; the only shared mutable state in the pipeline.
//! - `envelope`: the three wire shapes, legacy field-name compatibility,
//!   structural classification, and the base64 outer-layer boundary.
//! - `engine`: the 2-layer and 3-layer compositions.
//!
//! ## Failure discipline
//!
//! Every layer raises a typed [`EncryptionError`] immediately; the engine
//! completes all layers or fails the whole operation. The one deliberate
//! leniency is [`envelope::classify`], which passes unrecognized input
//! through as plaintext so the pipeline coexists with legacy data.

pub mod aead;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod kem;
pub mod keystore;
pub mod otp;

pub use aead::{AeadParts, AEAD_FRAME_OVERHEAD, AEAD_KEY_LEN, AEAD_NONCE_LEN, AEAD_TAG_LEN};
pub use engine::{
    HybridEncryptedMessage, HybridEngine, KeyMaterialSource, AEAD_KEY_HEADROOM,
};
pub use envelope::{
    classify, restore_from_outer_layer, wrap_for_outer_layer, AeadEnvelope, Classification,
    OtpEnvelope, PqcEnvelope,
};
pub use error::{EncryptionError, Result};
pub use kem::{EncapsulationResult, KemAlgorithm, KemKeyPair};
pub use keystore::{
    ExchangeStatus, HandshakeOutcome, HandshakeRequest, KeyExchangeRecord, KeyStore,
    SymmetricKey, EXCHANGE_TTL_SECS,
};

/// Length of a normalized KEM shared secret.
pub const DERIVED_SECRET_LEN: usize = kdf::NORMALIZED_SECRET_LEN;
