//! Session layer: crypto context store, key-exchange handshake, and payload
//! composition over an abstract relay transport.
//!
//! The flow for one counterparty:
//!
//! 1. [`SessionManager::register`] proves key possession to the relay.
//! 2. [`SessionManager::initiate_chat`] negotiates a shared session key
//!    (`chatInit` / `chatInitFollowUp`), resolving simultaneous-initiation
//!    collisions deterministically.
//! 3. [`SessionManager::send_message`] / [`SessionManager::ingest_message`]
//!    move chat payloads through the SDEx-then-RSA composer.
//!
//! The transport and the key storage are seams ([`Transport`], [`KeyStore`]);
//! the core never touches a socket or the platform keychain directly.

pub mod composer;
pub mod context;
pub mod error;
pub mod handshake;
pub mod keystore;
pub mod transport;

pub use context::{ContextUpdate, CryptoContext, CryptoSession};
pub use error::SessionError;
pub use handshake::{HandshakeState, SessionManager};
pub use keystore::{KeyStore, MemoryKeyStore};
pub use transport::{RetryPolicy, Transport, TransportError};
