//! BLAKE3 wrappers used by the SDEx engine, plus the SHA-512 registration
//! digest.
//!
//! The exact construction is pinned: the engine's ciphertext depends on every
//! byte produced here, so swapping the primitive or the context derivation
//! breaks interoperability with existing peers.

use sha2::{Digest, Sha512};

/// Plain BLAKE3 extended to `out_len` bytes via the XOF.
pub fn hash(data: &[u8], out_len: usize) -> Vec<u8> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(data);
    let mut out = vec![0u8; out_len];
    hasher.finalize_xof().fill(&mut out);
    out
}

/// Contextualized BLAKE3: keyed hash with `key = BLAKE3-256(context)`,
/// extended to `out_len` bytes.
///
/// The context here is arbitrary bytes (message blocks), so it is folded to a
/// 32-byte key first rather than using the string-only derive-key API.
pub fn hash_with_context(data: &[u8], context: &[u8], out_len: usize) -> Vec<u8> {
    let key = blake3::hash(context);
    let mut hasher = blake3::Hasher::new_keyed(key.as_bytes());
    hasher.update(data);
    let mut out = vec![0u8; out_len];
    hasher.finalize_xof().fill(&mut out);
    out
}

/// Proof-of-possession digest for registration: lowercase hex of
/// `SHA512(privateKey ‖ salt)`.
///
/// This exposes a value derived directly from the private key instead of a
/// signature over a challenge. Reproduced as the protocol defines it; changing
/// it requires protocol-owner sign-off.
pub fn registration_digest(private_key_pem: &str, salt: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(private_key_pem.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}
