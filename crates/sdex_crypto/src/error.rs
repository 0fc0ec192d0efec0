use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("RSA key generation failed: {0}")]
    RsaGeneration(String),

    #[error("RSA encryption failed: {0}")]
    RsaEncryption(String),

    #[error("RSA decryption failed: {0}")]
    RsaDecryption(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),
}
