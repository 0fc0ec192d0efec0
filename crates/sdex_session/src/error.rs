use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Missing key material or crypto context required by an operation.
    #[error("Precondition not met: {0}")]
    Precondition(String),

    /// Protocol invariant violated by a peer or the relay.
    #[error("Communication error: {0}")]
    Communication(String),

    /// A single transport step timed out (transient; the retry policy decides
    /// whether to try again).
    #[error("'{event}' not acknowledged after {attempts} attempt(s)")]
    Timeout { event: String, attempts: u32 },

    /// A handshake step exhausted its retries. Terminal for this exchange.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error(transparent)]
    Crypto(#[from] sdex_crypto::CryptoError),

    #[error(transparent)]
    Proto(#[from] sdex_proto::ProtoError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
