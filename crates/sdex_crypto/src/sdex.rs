//! SDEx cipher engine — hash-chain keystream XORed against fixed-size blocks.
//!
//! # Construction
//! From a session key `IV` and hash length `L`:
//!
//!   baseHash  = H(IV)
//!   halfHash1 = H(k1)   where (k1, k2) are the two halves of IV
//!   halfHash2 = H(k2)
//!
//! The message is zero-padded into `L`-byte blocks `B[1..n]` and transformed:
//!
//!   C[1] = B[1] ⊕ halfHash1 ⊕ baseHash
//!   C[2] = B[2] ⊕ halfHash1 ⊕ halfHash2
//!   h[1] = H(baseHash,        ctx = B[1] ‖ B[2])
//!   h[2] = H(h[1] ⊕ baseHash, ctx = B[3] ‖ B[4])
//!   for k = 3, 4, … while 2k−1 ≤ n:
//!     h[k]     = H(h[k−1] ⊕ h[k−2], ctx = B[2k−1] ‖ B[2k])
//!     C[2k−1]  = B[2k−1] ⊕ h[k] ⊕ h[k−1]
//!     C[2k]    = B[2k]   ⊕ halfHash2 ⊕ h[k]
//!
//! (Missing blocks are replaced by a zero block; the output is the defined
//! `C[i]` concatenated in index order.)
//!
//! # Known asymmetry beyond two blocks
//! The same transform runs in both directions, and the chain contexts are
//! built from whichever byte array was passed in — plaintext on encrypt,
//! ciphertext on decrypt. Blocks 1 and 2 use fixed hashes and always
//! round-trip; blocks beyond index 2 do not. This is the protocol as deployed
//! and is reproduced bit-for-bit, not repaired. See the round-trip tests
//! below for the exact observable behaviour.

use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::bytes::{random_bytes, split_into_blocks, split_session_key, trim_trailing_zeros, xor_blocks};
use crate::error::CryptoError;
use crate::hash::{hash, hash_with_context};

pub const DEFAULT_HASH_LENGTH: usize = 32;

/// Keyed cipher instance, 1:1 with a resolved crypto context.
///
/// All hash-chain state is fixed at construction; the engine has no mutable
/// fields and is safe to share across threads.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SdexEngine {
    session_key: Vec<u8>,
    base_hash: Vec<u8>,
    half_hash1: Vec<u8>,
    half_hash2: Vec<u8>,
    #[zeroize(skip)]
    hash_length: usize,
}

impl SdexEngine {
    /// Build an engine from a session key. The key length must be even and
    /// non-zero so the two-half split is meaningful.
    pub fn new(session_key: Vec<u8>, hash_length: usize) -> Result<Self, CryptoError> {
        let (first_half, second_half) = split_session_key(&session_key)?;
        let engine = Self {
            base_hash: hash(&session_key, hash_length),
            half_hash1: hash(&first_half, hash_length),
            half_hash2: hash(&second_half, hash_length),
            session_key,
            hash_length,
        };
        debug!(
            key_len = engine.session_key.len(),
            hash_length, "SDEx engine constructed"
        );
        Ok(engine)
    }

    pub fn with_default_hash_length(session_key: Vec<u8>) -> Result<Self, CryptoError> {
        Self::new(session_key, DEFAULT_HASH_LENGTH)
    }

    /// Generate a fresh OS-random session key. The engine needs two halves
    /// each worth hashing, so the default length is `2 × L`.
    pub fn generate_session_key(len: usize) -> Vec<u8> {
        random_bytes(len)
    }

    pub fn hash_length(&self) -> usize {
        self.hash_length
    }

    pub fn session_key(&self) -> &[u8] {
        &self.session_key
    }

    /// Shared transform for both directions.
    fn calculate_message(&self, input: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let l = self.hash_length;
        let zero_block = vec![0u8; l];
        let blocks = split_into_blocks(input, l);
        let n = blocks.len();
        let block = |i: usize| -> &[u8] {
            // 1-indexed, zero block past the end
            if i >= 1 && i <= n {
                &blocks[i - 1]
            } else {
                &zero_block
            }
        };
        let context = |i: usize| -> Vec<u8> { [block(i), block(i + 1)].concat() };

        let mut out = Vec::with_capacity(n * l);

        // Blocks 1 and 2 use the fixed key hashes only.
        out.extend(xor_blocks(block(1), &self.half_hash1, &self.base_hash)?);
        if n >= 2 {
            out.extend(xor_blocks(block(2), &self.half_hash1, &self.half_hash2)?);
        }

        // Hash chain: h[1], h[2], then h[k] = H(h[k-1] ⊕ h[k-2], ctx).
        // Indexed from 1; h_chain[k - 1] is h[k].
        let h1 = hash_with_context(&self.base_hash, &context(1), l);
        let mut h_chain = vec![h1];
        if n >= 2 {
            let seed = xor_pair(&h_chain[0], &self.base_hash);
            h_chain.push(hash_with_context(&seed, &context(3), l));
        }

        let mut k = 3;
        while 2 * k - 1 <= n {
            debug!(k, "calculating hash chain iteration");
            let seed = xor_pair(&h_chain[k - 2], &h_chain[k - 3]);
            let hk = hash_with_context(&seed, &context(2 * k - 1), l);
            out.extend(xor_blocks(block(2 * k - 1), &hk, &h_chain[k - 2])?);
            out.extend(xor_blocks(block(2 * k), &self.half_hash2, &hk)?);
            h_chain.push(hk);
            k += 1;
        }

        Ok(out)
    }

    /// Encrypt a UTF-8 message. Trailing zero padding remains part of the
    /// ciphertext and must be transported.
    pub fn encrypt(&self, message: &str) -> Result<Vec<u8>, CryptoError> {
        if message.is_empty() {
            return Err(CryptoError::Encryption("Message is empty".into()));
        }
        debug!(len = message.len(), "encrypting message");
        self.calculate_message(message.as_bytes())
    }

    /// Decrypt ciphertext back to a UTF-8 message, trimming the zero padding.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<String, CryptoError> {
        if ciphertext.is_empty() {
            return Err(CryptoError::Decryption("Message is empty".into()));
        }
        debug!(len = ciphertext.len(), "decrypting message");
        let padded = self.calculate_message(ciphertext)?;
        let trimmed = trim_trailing_zeros(&padded);
        String::from_utf8(trimmed.to_vec())
            .map_err(|e| CryptoError::Decryption(format!("Invalid UTF-8 in plaintext: {e}")))
    }
}

fn xor_pair(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}
