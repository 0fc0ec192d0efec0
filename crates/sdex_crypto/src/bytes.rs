//! Byte-block helpers for the SDEx cipher.
//!
//! The cipher operates on fixed-size blocks the length of its hash output.
//! Everything here is a pure function; the engine owns no mutable state.

use rand::RngCore;

use crate::error::CryptoError;

/// XOR three equal-length blocks: `b ⊕ h1 ⊕ h2`.
///
/// Both encryption and decryption reduce to this operation, which is its own
/// inverse for a fixed pair of hashes.
pub fn xor_blocks(block: &[u8], hash1: &[u8], hash2: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if block.len() != hash1.len() || block.len() != hash2.len() {
        return Err(CryptoError::Encryption("Invalid block length".into()));
    }
    Ok(block
        .iter()
        .zip(hash1.iter())
        .zip(hash2.iter())
        .map(|((b, h1), h2)| b ^ h1 ^ h2)
        .collect())
}

/// Split `data` into ordered blocks of `block_size` bytes, zero-padding the
/// last block. The padding stays part of the ciphertext on encryption and is
/// trimmed with [`trim_trailing_zeros`] after decryption.
pub fn split_into_blocks(data: &[u8], block_size: usize) -> Vec<Vec<u8>> {
    let mut blocks: Vec<Vec<u8>> = data.chunks(block_size).map(|c| c.to_vec()).collect();
    if let Some(last) = blocks.last_mut() {
        last.resize(block_size, 0);
    }
    blocks
}

/// Split a session key into its two halves. `k1 ‖ k2 == key`.
pub fn split_session_key(key: &[u8]) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    if key.is_empty() || key.len() % 2 != 0 {
        return Err(CryptoError::InvalidKey(format!(
            "Session key length must be even and non-zero, got {}",
            key.len()
        )));
    }
    let half = key.len() / 2;
    Ok((key[..half].to_vec(), key[half..].to_vec()))
}

/// Truncate after the last non-zero byte. All-zero input yields an empty slice.
pub fn trim_trailing_zeros(data: &[u8]) -> &[u8] {
    match data.iter().rposition(|&b| b != 0) {
        Some(i) => &data[..=i],
        None => &[],
    }
}

/// OS-random bytes (session keys, initialization material).
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}
