//! One-time-pad layer.
//!
//! Plain XOR against key material that must cover the whole input. The
//! length precondition is enforced before any byte is touched: cycling or
//! truncating the pad silently corrupts everything past the key length, so
//! a short key is always a hard `KeyTooShort` error.

use crate::error::{EncryptionError, Result};

/// XOR `data` against `key`, requiring `key.len() >= data.len()`.
pub fn xor_encrypt(data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() < data.len() {
        return Err(EncryptionError::KeyTooShort {
            needed: data.len(),
            actual: key.len(),
        });
    }

    Ok(data.iter().zip(key).map(|(b, k)| b ^ k).collect())
}

/// Inverse of [`xor_encrypt`]; XOR is its own inverse.
pub fn xor_decrypt(data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    xor_encrypt(data, key)
}
