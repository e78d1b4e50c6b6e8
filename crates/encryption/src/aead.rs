//! AES-256-GCM layer with explicit nonce/tag framing.
//!
//! The cipher output is kept as separate parts (12-byte nonce, 16-byte tag,
//! ciphertext) so envelopes can carry each field individually; the
//! `nonce || tag || ciphertext` frame is the byte layout handed to the OTP
//! sub-layer in the three-layer composition.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};

use crate::error::{EncryptionError, Result};

/// AES-256 key length.
pub const AEAD_KEY_LEN: usize = 32;

/// GCM nonce length (96 bits).
pub const AEAD_NONCE_LEN: usize = 12;

/// GCM authentication tag length (128 bits).
pub const AEAD_TAG_LEN: usize = 16;

/// Fixed framing overhead of [`AeadParts::to_frame`].
pub const AEAD_FRAME_OVERHEAD: usize = AEAD_NONCE_LEN + AEAD_TAG_LEN;

/// Output of one AEAD encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AeadParts {
    pub nonce: [u8; AEAD_NONCE_LEN],
    pub tag: [u8; AEAD_TAG_LEN],
    pub ciphertext: Vec<u8>,
}

impl AeadParts {
    /// Serialize as `nonce || tag || ciphertext`.
    pub fn to_frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(AEAD_FRAME_OVERHEAD + self.ciphertext.len());
        frame.extend_from_slice(&self.nonce);
        frame.extend_from_slice(&self.tag);
        frame.extend_from_slice(&self.ciphertext);
        frame
    }

    /// Parse a `nonce || tag || ciphertext` frame.
    pub fn from_frame(frame: &[u8]) -> Result<Self> {
        if frame.len() < AEAD_FRAME_OVERHEAD {
            return Err(EncryptionError::EnvelopeCorrupted(format!(
                "AEAD frame of {} bytes is shorter than the {}-byte header",
                frame.len(),
                AEAD_FRAME_OVERHEAD
            )));
        }

        let mut nonce = [0u8; AEAD_NONCE_LEN];
        nonce.copy_from_slice(&frame[..AEAD_NONCE_LEN]);
        let mut tag = [0u8; AEAD_TAG_LEN];
        tag.copy_from_slice(&frame[AEAD_NONCE_LEN..AEAD_FRAME_OVERHEAD]);

        Ok(Self {
            nonce,
            tag,
            ciphertext: frame[AEAD_FRAME_OVERHEAD..].to_vec(),
        })
    }
}

/// Encrypt under AES-256-GCM with a fresh random nonce.
pub fn encrypt(plaintext: &[u8], key: &[u8; AEAD_KEY_LEN], aad: &[u8]) -> Result<AeadParts> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| EncryptionError::InvalidKeyMaterial(format!("AEAD key: {e}")))?;

    let mut nonce = [0u8; AEAD_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut sealed = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::InvalidKeyMaterial("AEAD encryption failed".into()))?;

    // aes-gcm appends the tag to the ciphertext; split it back out.
    let tag_offset = sealed.len() - AEAD_TAG_LEN;
    let mut tag = [0u8; AEAD_TAG_LEN];
    tag.copy_from_slice(&sealed[tag_offset..]);
    sealed.truncate(tag_offset);

    Ok(AeadParts {
        nonce,
        tag,
        ciphertext: sealed,
    })
}

/// Decrypt and verify; a tag mismatch is always `AuthenticationFailed`.
pub fn decrypt(parts: &AeadParts, key: &[u8; AEAD_KEY_LEN], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| EncryptionError::InvalidKeyMaterial(format!("AEAD key: {e}")))?;

    let mut sealed = Vec::with_capacity(parts.ciphertext.len() + AEAD_TAG_LEN);
    sealed.extend_from_slice(&parts.ciphertext);
    sealed.extend_from_slice(&parts.tag);

    cipher
        .decrypt(
            Nonce::from_slice(&parts.nonce),
            Payload {
                msg: &sealed,
                aad,
            },
        )
        .map_err(|_| EncryptionError::AuthenticationFailed)
}
