//! Hybrid layered-encryption engine.
//!
//! Composes the KEM adapter, the AEAD and OTP layers, and the key store
//! into the two supported compositions:
//!
//! - **2-layer** (KEM + OTP): the pad covers exactly the plaintext.
//! - **3-layer** (KEM + AEAD + OTP): one key serves both sub-layers —
//!   bytes `[..32]` key the AEAD, bytes `[32..]` pad the AEAD frame. The
//!   key is sized `plaintext + 256` so the framing always fits.
//!
//! Key material comes from one of two sources selected at construction:
//! the store (key id travels OTP-masked under the KEM secret) or direct
//! expansion of the KEM secret. The engine never degrades a layer failure
//! into a placeholder value; it completes all layers or fails typed.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use common::{unix_ts, Address, KeyId, KeyRegistry, LayerPolicy};

use crate::aead::{self, AeadParts, AEAD_FRAME_OVERHEAD, AEAD_KEY_LEN};
use crate::envelope::PqcEnvelope;
use crate::error::{EncryptionError, Result};
use crate::kdf;
use crate::kem::{self, KemAlgorithm};
use crate::keystore::KeyStore;
use crate::otp;

/// Extra key bytes reserved in the 3-layer composition so the AEAD frame
/// and the OTP pad share one stored key.
pub const AEAD_KEY_HEADROOM: usize = 256;

/// Where the engine obtains body key material.
#[derive(Clone)]
pub enum KeyMaterialSource {
    /// Keys live in the shared store; envelopes carry the key id OTP-masked
    /// under the KEM secret.
    Store(KeyStore),
    /// Key material is expanded directly from the KEM shared secret; both
    /// sides rederive it, nothing is stored.
    DerivedDirect,
}

impl std::fmt::Debug for KeyMaterialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMaterialSource::Store(_) => f.write_str("KeyMaterialSource::Store"),
            KeyMaterialSource::DerivedDirect => f.write_str("KeyMaterialSource::DerivedDirect"),
        }
    }
}

/// Top-level engine output: the PQC envelope plus the encryption timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HybridEncryptedMessage {
    #[serde(flatten)]
    pub envelope: PqcEnvelope,
    #[serde(rename = "encryptedAt", alias = "encrypted_at", default)]
    pub encrypted_at: u64,
}

/// Orchestrates the layered compositions.
#[derive(Clone)]
pub struct HybridEngine {
    algorithm: KemAlgorithm,
    source: KeyMaterialSource,
}

impl HybridEngine {
    pub fn new(algorithm: KemAlgorithm, source: KeyMaterialSource) -> Self {
        Self { algorithm, source }
    }

    /// Store-backed engine with the default parameter set.
    pub fn with_store(store: KeyStore) -> Self {
        Self::new(KemAlgorithm::default(), KeyMaterialSource::Store(store))
    }

    /// Engine that expands key material directly from the KEM secret.
    pub fn derived_direct(algorithm: KemAlgorithm) -> Self {
        Self::new(algorithm, KeyMaterialSource::DerivedDirect)
    }

    pub fn algorithm(&self) -> KemAlgorithm {
        self.algorithm
    }

    /// Encrypt `plaintext` for the holder of `recipient_public_key`.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        recipient_public_key: &[u8],
        policy: LayerPolicy,
    ) -> Result<HybridEncryptedMessage> {
        let needed = match policy {
            LayerPolicy::TwoLayer => plaintext.len(),
            LayerPolicy::ThreeLayer => plaintext.len() + AEAD_KEY_HEADROOM,
        };

        let encapsulation = kem::encapsulate(recipient_public_key, self.algorithm)?;
        let key_id = KeyId::generate();

        let (key_bytes, encrypted_key_id) = match &self.source {
            KeyMaterialSource::Store(store) => {
                let key = store.get_or_create(&key_id, needed)?;
                let mask = kdf::expand(&encapsulation.derived_secret, key_id.as_bytes().len());
                let masked_id = otp::xor_encrypt(key_id.as_bytes(), &mask)?;
                (key.bytes().to_vec(), Some(STANDARD.encode(masked_id)))
            }
            KeyMaterialSource::DerivedDirect => {
                (kdf::expand(&encapsulation.derived_secret, needed), None)
            }
        };

        let (body, key_bytes_used) = self.seal_body(plaintext, &key_bytes, policy)?;

        if let KeyMaterialSource::Store(store) = &self.source {
            store.mark_consumed(&key_id, key_bytes_used)?;
        }

        debug!(
            key_id = %key_id,
            algorithm = self.algorithm.label(),
            use_aead = policy.use_aead(),
            plaintext_len = plaintext.len(),
            "encrypted message"
        );

        Ok(HybridEncryptedMessage {
            envelope: PqcEnvelope {
                encrypted_body: STANDARD.encode(body),
                kem_ciphertext: STANDARD.encode(&encapsulation.ciphertext),
                encrypted_key_id,
                algorithm_label: format!("{}+{}", self.algorithm.label(), policy.layer_label()),
                key_id: key_id.as_str().to_string(),
                security_level: self.algorithm.security_level(),
                used_aead: policy.use_aead(),
            },
            encrypted_at: unix_ts(),
        })
    }

    /// Encrypt for a logical address, looking the recipient key up in the
    /// identity registry.
    pub fn encrypt_for(
        &self,
        plaintext: &[u8],
        recipient: &Address,
        registry: &dyn KeyRegistry,
        policy: LayerPolicy,
    ) -> Result<HybridEncryptedMessage> {
        let public_key = registry
            .lookup(recipient)
            .map_err(|err| {
                EncryptionError::InvalidKeyMaterial(format!(
                    "registry lookup for {recipient} failed: {err}"
                ))
            })?
            .ok_or_else(|| {
                EncryptionError::InvalidKeyMaterial(format!(
                    "no KEM public key published for {recipient}"
                ))
            })?;
        self.encrypt(plaintext, &public_key, policy)
    }

    /// Decrypt a message produced by [`Self::encrypt`].
    pub fn decrypt(
        &self,
        message: &HybridEncryptedMessage,
        own_secret_key: &[u8],
    ) -> Result<Vec<u8>> {
        self.decrypt_envelope(&message.envelope, own_secret_key)
    }

    /// Decrypt a bare PQC envelope.
    pub fn decrypt_envelope(
        &self,
        envelope: &PqcEnvelope,
        own_secret_key: &[u8],
    ) -> Result<Vec<u8>> {
        let body = envelope.body()?;
        let kem_ciphertext = envelope.kem_ciphertext_bytes()?;
        let derived_secret = kem::decapsulate(&kem_ciphertext, own_secret_key, self.algorithm)?;

        let needed = if envelope.used_aead {
            if body.len() < AEAD_FRAME_OVERHEAD {
                return Err(EncryptionError::EnvelopeCorrupted(format!(
                    "AEAD body of {} bytes is shorter than the {}-byte frame header",
                    body.len(),
                    AEAD_FRAME_OVERHEAD
                )));
            }
            body.len() - AEAD_FRAME_OVERHEAD + AEAD_KEY_HEADROOM
        } else {
            body.len()
        };

        let key_bytes = match (&self.source, envelope.encrypted_key_id_bytes()?) {
            (KeyMaterialSource::Store(store), Some(masked_id)) => {
                let mask = kdf::expand(&derived_secret, masked_id.len());
                let id_bytes = otp::xor_decrypt(&masked_id, &mask)?;
                let recovered = String::from_utf8(id_bytes).map_err(|_| {
                    EncryptionError::EnvelopeCorrupted(
                        "recovered key id is not valid UTF-8".to_string(),
                    )
                })?;
                if !envelope.key_id.is_empty() && envelope.key_id != recovered {
                    warn!(
                        envelope_key_id = %envelope.key_id,
                        recovered_key_id = %recovered,
                        "envelope key id does not match recovered key id"
                    );
                }

                let key_id = KeyId::from_string(recovered);
                let key = store.get_or_create(&key_id, needed)?;
                store.mark_consumed(&key_id, needed)?;
                key.bytes().to_vec()
            }
            (KeyMaterialSource::Store(_), None) => {
                return Err(EncryptionError::InvalidKeyMaterial(
                    "envelope carries no encrypted key id for a store-backed engine".to_string(),
                ));
            }
            (KeyMaterialSource::DerivedDirect, None) => kdf::expand(&derived_secret, needed),
            (KeyMaterialSource::DerivedDirect, Some(_)) => {
                return Err(EncryptionError::InvalidKeyMaterial(
                    "envelope is store-backed but the engine derives keys directly".to_string(),
                ));
            }
        };

        self.open_body(&body, &key_bytes, envelope.used_aead)
    }

    fn seal_body(
        &self,
        plaintext: &[u8],
        key: &[u8],
        policy: LayerPolicy,
    ) -> Result<(Vec<u8>, usize)> {
        match policy {
            LayerPolicy::TwoLayer => {
                let body = otp::xor_encrypt(plaintext, key)?;
                Ok((body, plaintext.len()))
            }
            LayerPolicy::ThreeLayer => {
                let aead_key = aead_key_window(key)?;
                let frame = aead::encrypt(plaintext, &aead_key, b"")?.to_frame();
                let pad = otp_pad_window(key, frame.len())?;
                let body = otp::xor_encrypt(&frame, pad)?;
                Ok((body, AEAD_KEY_LEN + frame.len()))
            }
        }
    }

    fn open_body(&self, body: &[u8], key: &[u8], used_aead: bool) -> Result<Vec<u8>> {
        if !used_aead {
            return otp::xor_decrypt(body, key);
        }

        let pad = otp_pad_window(key, body.len())?;
        let frame = otp::xor_decrypt(body, pad)?;
        let parts = AeadParts::from_frame(&frame)?;
        let aead_key = aead_key_window(key)?;
        aead::decrypt(&parts, &aead_key, b"")
    }
}

fn aead_key_window(key: &[u8]) -> Result<[u8; AEAD_KEY_LEN]> {
    key.get(..AEAD_KEY_LEN)
        .and_then(|window| window.try_into().ok())
        .ok_or(EncryptionError::KeyTooShort {
            needed: AEAD_KEY_LEN,
            actual: key.len(),
        })
}

fn otp_pad_window(key: &[u8], frame_len: usize) -> Result<&[u8]> {
    key.get(AEAD_KEY_LEN..AEAD_KEY_LEN + frame_len)
        .ok_or(EncryptionError::KeyTooShort {
            needed: AEAD_KEY_LEN + frame_len,
            actual: key.len(),
        })
}
