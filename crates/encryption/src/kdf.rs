//! Key derivation over KEM shared secrets.
//!
//! KEM implementations differ in native shared-secret length, so every
//! downstream layer works from a 32-byte SHA-256 normalization of the raw
//! secret. Longer key material is produced by a counter-mode SHA-256 chain
//! that both sender and receiver rerun independently; the construction is
//! pinned byte-for-byte because any deviation desynchronizes the two sides
//! past the first hash block.

use sha2::{Digest, Sha256};

/// Length of a normalized shared secret.
pub const NORMALIZED_SECRET_LEN: usize = 32;

/// Hash a raw KEM shared secret down to exactly 32 bytes.
///
/// Deterministic: the encapsulating and decapsulating parties obtain the
/// same normalized secret for the same KEM exchange.
pub fn normalize(secret: &[u8]) -> [u8; NORMALIZED_SECRET_LEN] {
    let digest = Sha256::digest(secret);
    digest.into()
}

/// Stretch `seed` to exactly `target_len` bytes.
///
/// For `target_len <= seed.len()` this is a plain prefix. Otherwise the
/// output is the counter chain: round `r` emits
/// `SHA256(current || LE32(r))` and feeds that block forward as `current`,
/// starting from the seed. Within the chain regime, shorter outputs are
/// prefixes of longer ones.
///
/// This is deliberately not HKDF: the chain above is the construction both
/// endpoints reproduce. Seed truncation in place of expansion when
/// `target_len > seed.len()` yields undersized pads and is never acceptable.
pub fn expand(seed: &[u8], target_len: usize) -> Vec<u8> {
    if target_len <= seed.len() {
        return seed[..target_len].to_vec();
    }

    let mut output = Vec::with_capacity(target_len);
    let mut current = seed.to_vec();
    let mut round: u32 = 0;

    while output.len() < target_len {
        let mut hasher = Sha256::new();
        hasher.update(&current);
        hasher.update(round.to_le_bytes());
        let block = hasher.finalize();

        let take = usize::min(block.len(), target_len - output.len());
        output.extend_from_slice(&block[..take]);

        current = block.to_vec();
        round += 1;
    }

    output
}
