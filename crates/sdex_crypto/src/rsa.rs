//! RSA envelope layer — asymmetric wrapping of SDEx ciphertext.
//!
//! One PKCS#1 v1.5 operation per call, PEM-encoded PKCS#1 keys, base64
//! ciphertext strings. There is no chunking: the plaintext for a single call
//! is bounded by the modulus size (k − 11 bytes, 245 for 2048-bit keys). The
//! payload composer is responsible for respecting that bound.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs1::{
    DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding,
};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::error::CryptoError;

pub const DEFAULT_KEY_BITS: usize = 2048;

/// PEM-encoded key pair owned by the local device. The private key never
/// leaves the device in cleartext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: String,
}

/// Generate a fresh RSA key pair as PKCS#1 PEM strings.
pub fn generate_key_pair(bits: usize) -> Result<KeyPair, CryptoError> {
    debug!(bits, "generating RSA key pair");
    let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, bits)
        .map_err(|e| CryptoError::RsaGeneration(e.to_string()))?;
    let public = RsaPublicKey::from(&private);
    Ok(KeyPair {
        public_key: public
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| CryptoError::RsaGeneration(e.to_string()))?,
        private_key: private
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| CryptoError::RsaGeneration(e.to_string()))?
            .to_string(),
    })
}

fn parse_public(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_pkcs1_pem(pem).map_err(|e| CryptoError::RsaEncryption(e.to_string()))
}

fn parse_private(pem: &str) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| CryptoError::RsaDecryption(e.to_string()))
}

/// Encrypt a UTF-8 string under a public key. Output is base64.
pub fn encrypt(public_key_pem: &str, text: &str) -> Result<String, CryptoError> {
    let key = parse_public(public_key_pem)?;
    let ciphertext = key
        .encrypt(&mut rand::rngs::OsRng, Pkcs1v15Encrypt, text.as_bytes())
        .map_err(|e| CryptoError::RsaEncryption(e.to_string()))?;
    Ok(BASE64.encode(ciphertext))
}

/// Decrypt a base64 ciphertext with the own private key.
pub fn decrypt(private_key_pem: &str, text: &str) -> Result<String, CryptoError> {
    let key = parse_private(private_key_pem)?;
    let ciphertext = BASE64
        .decode(text)
        .map_err(|e| CryptoError::RsaDecryption(e.to_string()))?;
    let plaintext = key
        .decrypt(Pkcs1v15Encrypt, &ciphertext)
        .map_err(|e| CryptoError::RsaDecryption(e.to_string()))?;
    String::from_utf8(plaintext)
        .map_err(|e| CryptoError::RsaDecryption(format!("Invalid UTF-8 in plaintext: {e}")))
}

/// Two sequential RSA operations binding sender origin to confidentiality:
/// the text is encrypted under the counterpart's public key, then the
/// ciphertext is signed (PKCS#1 v1.5, SHA-256) with the own private key.
#[derive(Debug, Serialize, Deserialize)]
struct SignedEnvelope {
    ciphertext: String,
    signature: String,
}

pub fn double_encrypt(
    own_private_pem: &str,
    counterpart_public_pem: &str,
    text: &str,
) -> Result<String, CryptoError> {
    let ciphertext = encrypt(counterpart_public_pem, text)?;
    let signing_key = SigningKey::<Sha256>::new(parse_private(own_private_pem)?);
    let signature = signing_key
        .sign_with_rng(&mut rand::rngs::OsRng, ciphertext.as_bytes())
        .to_bytes();
    let envelope = SignedEnvelope {
        ciphertext,
        signature: BASE64.encode(signature),
    };
    serde_json::to_string(&envelope).map_err(|e| CryptoError::RsaEncryption(e.to_string()))
}

/// Verify the counterpart's signature over the ciphertext, then decrypt it.
pub fn double_decrypt(
    own_private_pem: &str,
    counterpart_public_pem: &str,
    payload: &str,
) -> Result<String, CryptoError> {
    let envelope: SignedEnvelope = serde_json::from_str(payload)
        .map_err(|e| CryptoError::RsaDecryption(format!("Malformed envelope: {e}")))?;
    let verifying_key = VerifyingKey::<Sha256>::new(parse_public(counterpart_public_pem)?);
    let signature_bytes = BASE64
        .decode(&envelope.signature)
        .map_err(|e| CryptoError::RsaDecryption(e.to_string()))?;
    let signature = Signature::try_from(signature_bytes.as_slice())
        .map_err(|e| CryptoError::RsaDecryption(e.to_string()))?;
    verifying_key
        .verify(envelope.ciphertext.as_bytes(), &signature)
        .map_err(|_| CryptoError::RsaDecryption("Signature verification failed".into()))?;
    decrypt(own_private_pem, &envelope.ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1024-bit keys keep the test suite fast; production callers use 2048.
    const TEST_KEY_BITS: usize = 1024;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let pair = generate_key_pair(TEST_KEY_BITS).unwrap();
        let ciphertext = encrypt(&pair.public_key, "This is a test").unwrap();
        assert_ne!(ciphertext, "This is a test");
        assert_eq!(decrypt(&pair.private_key, &ciphertext).unwrap(), "This is a test");
    }

    #[test]
    fn encrypting_with_a_malformed_key_fails() {
        let err = encrypt("-----BEGIN RSA PUBLIC KEY-----\nwrong\n-----END RSA PUBLIC KEY-----", "x")
            .unwrap_err();
        assert!(matches!(err, CryptoError::RsaEncryption(_)));
    }

    #[test]
    fn decrypting_with_the_wrong_key_fails() {
        let pair_a = generate_key_pair(TEST_KEY_BITS).unwrap();
        let pair_b = generate_key_pair(TEST_KEY_BITS).unwrap();
        let ciphertext = encrypt(&pair_a.public_key, "secret").unwrap();
        assert!(matches!(
            decrypt(&pair_b.private_key, &ciphertext),
            Err(CryptoError::RsaDecryption(_))
        ));
    }

    #[test]
    fn double_encrypt_round_trip_and_origin_binding() {
        let sender = generate_key_pair(TEST_KEY_BITS).unwrap();
        let receiver = generate_key_pair(TEST_KEY_BITS).unwrap();
        let payload = double_encrypt(&sender.private_key, &receiver.public_key, "bound").unwrap();
        let plaintext =
            double_decrypt(&receiver.private_key, &sender.public_key, &payload).unwrap();
        assert_eq!(plaintext, "bound");

        // A third party's key must not verify.
        let impostor = generate_key_pair(TEST_KEY_BITS).unwrap();
        assert!(matches!(
            double_decrypt(&receiver.private_key, &impostor.public_key, &payload),
            Err(CryptoError::RsaDecryption(_))
        ));
    }
}
