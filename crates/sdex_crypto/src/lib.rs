//! sdex_crypto — SDEx Secure Channel cryptographic primitives
//!
//! # Design principles
//! - The SDEx hash-chain construction is pinned exactly as deployed; the
//!   BLAKE3 wrappers in `hash` define the interoperable byte meaning.
//! - Session keys and chain state are zeroized on drop.
//! - Errors are typed and never retried at this layer.
//!
//! # Module layout
//! - `bytes` — XOR/split/trim block helpers (pure functions)
//! - `hash`  — BLAKE3 wrappers + SHA-512 registration digest
//! - `sdex`  — the SDEx cipher engine (hash-chain keystream XOR)
//! - `rsa`   — RSA envelope layer (PKCS#1 PEM keys, base64 ciphertext)
//! - `error` — unified error type

pub mod bytes;
pub mod error;
pub mod hash;
pub mod rsa;
pub mod sdex;

pub use error::CryptoError;
pub use rsa::KeyPair;
pub use sdex::SdexEngine;
