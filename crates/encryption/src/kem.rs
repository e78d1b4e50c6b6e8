//! ML-KEM adapter.
//!
//! Wraps encapsulation/decapsulation for the supported ML-KEM parameter
//! sets and normalizes the native shared secret through [`crate::kdf`] so
//! everything downstream can assume a fixed 32-byte seed. Decapsulation
//! reproduces the encapsulator's derived secret bit-identically for the
//! same ciphertext and keypair; the whole engine rests on that.

use pqcrypto_traits::kem::{Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{EncryptionError, Result};
use crate::kdf;

/// Supported KEM parameter sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KemAlgorithm {
    MlKem512,
    MlKem768,
    MlKem1024,
}

impl Default for KemAlgorithm {
    fn default() -> Self {
        KemAlgorithm::MlKem768
    }
}

macro_rules! with_kem {
    ($alg:expr, $kem:ident, $body:expr) => {
        match $alg {
            KemAlgorithm::MlKem512 => {
                use pqcrypto_mlkem::mlkem512 as $kem;
                $body
            }
            KemAlgorithm::MlKem768 => {
                use pqcrypto_mlkem::mlkem768 as $kem;
                $body
            }
            KemAlgorithm::MlKem1024 => {
                use pqcrypto_mlkem::mlkem1024 as $kem;
                $body
            }
        }
    };
}

impl KemAlgorithm {
    /// Canonical label carried in envelopes.
    pub fn label(&self) -> &'static str {
        match self {
            KemAlgorithm::MlKem512 => "ML-KEM-512",
            KemAlgorithm::MlKem768 => "ML-KEM-768",
            KemAlgorithm::MlKem1024 => "ML-KEM-1024",
        }
    }

    /// NIST security category.
    pub fn security_level(&self) -> u8 {
        match self {
            KemAlgorithm::MlKem512 => 1,
            KemAlgorithm::MlKem768 => 3,
            KemAlgorithm::MlKem1024 => 5,
        }
    }

    /// Parse a label; legacy Kyber spellings map onto the matching
    /// ML-KEM parameter set.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "ML-KEM-512" | "mlkem512" | "Kyber512" | "CRYSTALS-Kyber-512" => {
                Some(KemAlgorithm::MlKem512)
            }
            "ML-KEM-768" | "mlkem768" | "Kyber768" | "CRYSTALS-Kyber-768" => {
                Some(KemAlgorithm::MlKem768)
            }
            "ML-KEM-1024" | "mlkem1024" | "Kyber1024" | "CRYSTALS-Kyber-1024" => {
                Some(KemAlgorithm::MlKem1024)
            }
            _ => None,
        }
    }

    pub fn public_key_len(&self) -> usize {
        with_kem!(self, kem, kem::public_key_bytes())
    }

    pub fn secret_key_len(&self) -> usize {
        with_kem!(self, kem, kem::secret_key_bytes())
    }

    pub fn ciphertext_len(&self) -> usize {
        with_kem!(self, kem, kem::ciphertext_bytes())
    }
}

/// One identity's KEM keypair.
///
/// The public half is distributed through the registry; the secret half
/// never leaves the holder and is wiped on drop.
#[derive(Clone)]
pub struct KemKeyPair {
    pub public_key: Vec<u8>,
    secret_key: Vec<u8>,
    pub algorithm: KemAlgorithm,
    pub generated_at: u64,
}

impl KemKeyPair {
    pub fn secret_key(&self) -> &[u8] {
        &self.secret_key
    }
}

impl Drop for KemKeyPair {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

impl std::fmt::Debug for KemKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KemKeyPair")
            .field("public_key", &hex::encode(&self.public_key[..8.min(self.public_key.len())]))
            .field("secret_key", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .field("generated_at", &self.generated_at)
            .finish()
    }
}

/// Result of encapsulating against a recipient public key.
#[derive(Clone)]
pub struct EncapsulationResult {
    /// 32-byte normalized shared secret.
    pub derived_secret: [u8; kdf::NORMALIZED_SECRET_LEN],
    /// KEM ciphertext to ship inside the envelope.
    pub ciphertext: Vec<u8>,
    pub algorithm: KemAlgorithm,
}

impl std::fmt::Debug for EncapsulationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncapsulationResult")
            .field("derived_secret", &"[REDACTED]")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Generate a fresh keypair for the given parameter set.
pub fn generate_keypair(algorithm: KemAlgorithm) -> KemKeyPair {
    with_kem!(algorithm, kem, {
        let (public, secret) = kem::keypair();
        KemKeyPair {
            public_key: public.as_bytes().to_vec(),
            secret_key: secret.as_bytes().to_vec(),
            algorithm,
            generated_at: common::unix_ts(),
        }
    })
}

/// Encapsulate against a recipient public key and normalize the secret.
pub fn encapsulate(
    recipient_public_key: &[u8],
    algorithm: KemAlgorithm,
) -> Result<EncapsulationResult> {
    if recipient_public_key.len() != algorithm.public_key_len() {
        return Err(EncryptionError::InvalidKeyMaterial(format!(
            "{} public key must be {} bytes, got {}",
            algorithm.label(),
            algorithm.public_key_len(),
            recipient_public_key.len()
        )));
    }

    with_kem!(algorithm, kem, {
        let public = kem::PublicKey::from_bytes(recipient_public_key).map_err(|err| {
            EncryptionError::InvalidKeyMaterial(format!(
                "{} public key: {err:?}",
                algorithm.label()
            ))
        })?;
        let (shared, ciphertext) = kem::encapsulate(&public);
        Ok(EncapsulationResult {
            derived_secret: kdf::normalize(shared.as_bytes()),
            ciphertext: ciphertext.as_bytes().to_vec(),
            algorithm,
        })
    })
}

/// Decapsulate a KEM ciphertext and normalize the secret.
pub fn decapsulate(
    ciphertext: &[u8],
    own_secret_key: &[u8],
    algorithm: KemAlgorithm,
) -> Result<[u8; kdf::NORMALIZED_SECRET_LEN]> {
    if own_secret_key.len() != algorithm.secret_key_len() {
        return Err(EncryptionError::InvalidKeyMaterial(format!(
            "{} secret key must be {} bytes, got {}",
            algorithm.label(),
            algorithm.secret_key_len(),
            own_secret_key.len()
        )));
    }

    with_kem!(algorithm, kem, {
        let ct = kem::Ciphertext::from_bytes(ciphertext).map_err(|err| {
            EncryptionError::InvalidKeyMaterial(format!(
                "{} ciphertext: {err:?}",
                algorithm.label()
            ))
        })?;
        let secret = kem::SecretKey::from_bytes(own_secret_key).map_err(|err| {
            EncryptionError::InvalidKeyMaterial(format!(
                "{} secret key: {err:?}",
                algorithm.label()
            ))
        })?;
        let shared = kem::decapsulate(&ct, &secret);
        Ok(kdf::normalize(shared.as_bytes()))
    })
}

/// Structural validation only: the bytes parse as a public key for the
/// parameter set. Not a proof of cryptographic validity.
pub fn validate_public_key(key: &[u8], algorithm: KemAlgorithm) -> bool {
    if key.len() != algorithm.public_key_len() {
        return false;
    }
    with_kem!(algorithm, kem, kem::PublicKey::from_bytes(key).is_ok())
}
