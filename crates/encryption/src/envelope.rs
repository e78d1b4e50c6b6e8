//! Envelope shapes, classification, and the outer-layer boundary.
//!
//! Three envelope shapes travel through storage and transport: the OTP and
//! AEAD shapes produced by the external services and the PQC shape produced
//! by the hybrid engine. Two field-naming conventions exist in stored data;
//! decode accepts both, encode emits only camelCase.
//!
//! Classification is structural, not type-tagged: shapes are tried in a
//! fixed priority order (AEAD, then OTP, then PQC) because the most
//! field-constrained shape must win when field names overlap. Anything that
//! matches no shape is passed through as plaintext — the boundary stays
//! lenient even though every layer operation is strict.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::aead::{AeadParts, AEAD_NONCE_LEN, AEAD_TAG_LEN};
use crate::error::{EncryptionError, Result};

/// One-time-pad envelope, as emitted by the OTP service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OtpEnvelope {
    #[serde(rename = "keyId", alias = "key_id")]
    pub key_id: String,
    #[serde(rename = "ciphertextB64Url", alias = "ciphertext_b64url")]
    pub ciphertext_b64url: String,
}

impl OtpEnvelope {
    pub fn new(key_id: impl Into<String>, ciphertext: &[u8]) -> Self {
        Self {
            key_id: key_id.into(),
            ciphertext_b64url: URL_SAFE_NO_PAD.encode(ciphertext),
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| EncryptionError::EnvelopeCorrupted(format!("OTP envelope: {err}")))
    }

    /// Ciphertext bytes; legacy writers padded the url-safe base64.
    pub fn ciphertext(&self) -> Result<Vec<u8>> {
        URL_SAFE_NO_PAD
            .decode(self.ciphertext_b64url.trim_end_matches('='))
            .map_err(|err| {
                EncryptionError::EnvelopeCorrupted(format!("OTP ciphertext base64: {err}"))
            })
    }
}

/// AEAD envelope, as emitted by the AES-256-GCM service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AeadEnvelope {
    #[serde(rename = "keyId", alias = "key_id")]
    pub key_id: String,
    #[serde(rename = "ivHex", alias = "iv_hex")]
    pub iv_hex: String,
    #[serde(rename = "ciphertextHex", alias = "ciphertext_hex")]
    pub ciphertext_hex: String,
    #[serde(rename = "tagHex", alias = "tag_hex")]
    pub tag_hex: String,
    #[serde(rename = "aadHex", alias = "aad_hex", default)]
    pub aad_hex: String,
    #[serde(
        rename = "algorithmLabel",
        alias = "algorithm_label",
        alias = "algorithm",
        default
    )]
    pub algorithm_label: String,
}

impl AeadEnvelope {
    pub fn from_parts(key_id: impl Into<String>, parts: &AeadParts, aad: &[u8]) -> Self {
        Self {
            key_id: key_id.into(),
            iv_hex: hex::encode(parts.nonce),
            ciphertext_hex: hex::encode(&parts.ciphertext),
            tag_hex: hex::encode(parts.tag),
            aad_hex: hex::encode(aad),
            algorithm_label: "AES-256-GCM".to_string(),
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| EncryptionError::EnvelopeCorrupted(format!("AEAD envelope: {err}")))
    }

    pub fn aad(&self) -> Result<Vec<u8>> {
        hex::decode(&self.aad_hex)
            .map_err(|err| EncryptionError::EnvelopeCorrupted(format!("AEAD aad hex: {err}")))
    }

    /// Reassemble the cipher parts, validating field lengths.
    pub fn to_parts(&self) -> Result<AeadParts> {
        let nonce_bytes = hex::decode(&self.iv_hex)
            .map_err(|err| EncryptionError::EnvelopeCorrupted(format!("AEAD iv hex: {err}")))?;
        let tag_bytes = hex::decode(&self.tag_hex)
            .map_err(|err| EncryptionError::EnvelopeCorrupted(format!("AEAD tag hex: {err}")))?;
        let ciphertext = hex::decode(&self.ciphertext_hex).map_err(|err| {
            EncryptionError::EnvelopeCorrupted(format!("AEAD ciphertext hex: {err}"))
        })?;

        let nonce: [u8; AEAD_NONCE_LEN] = nonce_bytes.try_into().map_err(|_| {
            EncryptionError::EnvelopeCorrupted("AEAD iv must be 12 bytes".to_string())
        })?;
        let tag: [u8; AEAD_TAG_LEN] = tag_bytes.try_into().map_err(|_| {
            EncryptionError::EnvelopeCorrupted("AEAD tag must be 16 bytes".to_string())
        })?;

        Ok(AeadParts {
            nonce,
            tag,
            ciphertext,
        })
    }
}

/// Hybrid PQC envelope produced by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PqcEnvelope {
    #[serde(rename = "encryptedBody", alias = "encrypted_body")]
    pub encrypted_body: String,
    #[serde(
        rename = "kemCiphertext",
        alias = "kem_ciphertext",
        alias = "pqcCiphertext",
        alias = "pqc_ciphertext"
    )]
    pub kem_ciphertext: String,
    #[serde(
        rename = "encryptedKeyId",
        alias = "encrypted_key_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub encrypted_key_id: Option<String>,
    #[serde(
        rename = "algorithmLabel",
        alias = "algorithm_label",
        alias = "algorithm",
        default
    )]
    pub algorithm_label: String,
    #[serde(rename = "keyId", alias = "key_id", default)]
    pub key_id: String,
    #[serde(rename = "securityLevel", alias = "security_level", default)]
    pub security_level: u8,
    #[serde(rename = "usedAead", alias = "used_aead", default)]
    pub used_aead: bool,
}

impl PqcEnvelope {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| EncryptionError::EnvelopeCorrupted(format!("PQC envelope: {err}")))
    }

    pub fn body(&self) -> Result<Vec<u8>> {
        STANDARD.decode(&self.encrypted_body).map_err(|err| {
            EncryptionError::EnvelopeCorrupted(format!("PQC encrypted body base64: {err}"))
        })
    }

    pub fn kem_ciphertext_bytes(&self) -> Result<Vec<u8>> {
        STANDARD.decode(&self.kem_ciphertext).map_err(|err| {
            EncryptionError::EnvelopeCorrupted(format!("KEM ciphertext base64: {err}"))
        })
    }

    pub fn encrypted_key_id_bytes(&self) -> Result<Option<Vec<u8>>> {
        match &self.encrypted_key_id {
            None => Ok(None),
            Some(encoded) => STANDARD.decode(encoded).map(Some).map_err(|err| {
                EncryptionError::EnvelopeCorrupted(format!("encrypted key id base64: {err}"))
            }),
        }
    }
}

/// Outcome of structural envelope sniffing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Aead(AeadEnvelope),
    Otp(OtpEnvelope),
    Pqc(PqcEnvelope),
    /// Matched no known shape; treated as already-plaintext, not an error.
    PlainText,
}

/// Classify a stored string by structural parse in fixed priority order.
///
/// AEAD is the most field-constrained shape and is tried first so an AEAD
/// or PQC envelope is never misread as a partial OTP envelope.
pub fn classify(raw: &str) -> Classification {
    if let Ok(env) = serde_json::from_str::<AeadEnvelope>(raw) {
        if !env.key_id.is_empty() && !env.iv_hex.is_empty() && !env.tag_hex.is_empty() {
            return Classification::Aead(env);
        }
    }

    if let Ok(env) = serde_json::from_str::<OtpEnvelope>(raw) {
        if !env.key_id.is_empty() {
            return Classification::Otp(env);
        }
    }

    if let Ok(env) = serde_json::from_str::<PqcEnvelope>(raw) {
        if !env.kem_ciphertext.is_empty() {
            return Classification::Pqc(env);
        }
    }

    Classification::PlainText
}

/// Encode a PQC envelope as an opaque string safe to hand to a
/// text-oriented outer layer.
pub fn wrap_for_outer_layer(envelope: &PqcEnvelope) -> Result<String> {
    let json = serde_json::to_string(envelope)?;
    Ok(STANDARD.encode(json))
}

/// Undo [`wrap_for_outer_layer`] after the outer layer is removed.
///
/// Every failure here — base64, UTF-8, JSON, or the structural check — is a
/// hard `EnvelopeCorrupted`. Undecodable bytes are never returned as if
/// they were the recovered envelope.
pub fn restore_from_outer_layer(wrapped: &str) -> Result<PqcEnvelope> {
    let bytes = STANDARD.decode(wrapped.trim()).map_err(|err| {
        EncryptionError::EnvelopeCorrupted(format!("outer layer base64: {err}"))
    })?;
    let json = String::from_utf8(bytes).map_err(|_| {
        EncryptionError::EnvelopeCorrupted("outer layer payload is not UTF-8".to_string())
    })?;

    // `encryptedBody` is a required field, so its absence fails the parse:
    // that is the structural recovery check.
    serde_json::from_str(&json)
        .map_err(|err| EncryptionError::EnvelopeCorrupted(format!("outer layer JSON: {err}")))
}
