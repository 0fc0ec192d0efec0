//! Per-counterparty crypto context store.
//!
//! A context is the tuple (sessionKey, initializationHash, passwordHash)
//! negotiated with one counterparty. Updates always construct and install a
//! brand-new record — a reader can never observe a context with a new session
//! key but stale hashes. The store itself is owned by the session manager and
//! sits behind a single writer lock; nothing here synchronizes.

use std::collections::HashMap;

use zeroize::Zeroizing;

use sdex_crypto::sdex::SdexEngine;

use crate::error::SessionError;

pub const HASH_BYTES: usize = 32;

/// Negotiated key material for one counterparty (or the own, first-party
/// context). Fields fill in as handshake messages arrive.
#[derive(Clone, Default)]
pub struct CryptoContext {
    session_key: Option<Zeroizing<Vec<u8>>>,
    initialization_hash: Option<[u8; HASH_BYTES]>,
    password_hash: Option<[u8; HASH_BYTES]>,
}

impl CryptoContext {
    pub fn session_key(&self) -> Option<&[u8]> {
        self.session_key.as_deref().map(Vec::as_slice)
    }

    pub fn initialization_hash(&self) -> Option<&[u8; HASH_BYTES]> {
        self.initialization_hash.as_ref()
    }

    pub fn password_hash(&self) -> Option<&[u8; HASH_BYTES]> {
        self.password_hash.as_ref()
    }

    /// Build the replacement record: supplied fields win, absent fields carry
    /// over from `self`.
    fn merged(&self, update: ContextUpdate) -> Self {
        Self {
            session_key: update
                .session_key
                .map(Zeroizing::new)
                .or_else(|| self.session_key.clone()),
            initialization_hash: update.initialization_hash.or(self.initialization_hash),
            password_hash: update.password_hash.or(self.password_hash),
        }
    }
}

/// Partial context update; only supplied fields are replaced.
#[derive(Default)]
pub struct ContextUpdate {
    pub session_key: Option<Vec<u8>>,
    pub initialization_hash: Option<[u8; HASH_BYTES]>,
    pub password_hash: Option<[u8; HASH_BYTES]>,
}

/// All negotiated key material for one device: the own context plus the
/// counterparty map, keyed by public key. No process-wide state.
pub struct CryptoSession {
    own: CryptoContext,
    counterparties: HashMap<String, CryptoContext>,
    hash_length: usize,
}

impl CryptoSession {
    pub fn new(hash_length: usize) -> Self {
        Self {
            own: CryptoContext::default(),
            counterparties: HashMap::new(),
            hash_length,
        }
    }

    pub fn hash_length(&self) -> usize {
        self.hash_length
    }

    /// Install the first-party context (whole-object swap).
    pub fn set_own_context(
        &mut self,
        initialization_hash: [u8; HASH_BYTES],
        password_hash: [u8; HASH_BYTES],
    ) {
        self.own = CryptoContext {
            session_key: None,
            initialization_hash: Some(initialization_hash),
            password_hash: Some(password_hash),
        };
    }

    pub fn own_context(&self) -> &CryptoContext {
        &self.own
    }

    /// Merge a partial update into the counterparty's context by installing a
    /// freshly built record.
    pub fn upsert_counterpart(&mut self, public_key: &str, update: ContextUpdate) {
        let merged = match self.counterparties.get(public_key) {
            Some(existing) => existing.merged(update),
            None => CryptoContext::default().merged(update),
        };
        self.counterparties.insert(public_key.to_string(), merged);
    }

    pub fn context_for(&self, public_key: &str) -> Option<&CryptoContext> {
        self.counterparties.get(public_key)
    }

    pub fn session_key_for(&self, public_key: &str) -> Option<Vec<u8>> {
        self.counterparties
            .get(public_key)
            .and_then(|c| c.session_key())
            .map(<[u8]>::to_vec)
    }

    /// Resolve a cipher engine for the counterparty's negotiated session key.
    pub fn engine_for(&self, public_key: &str) -> Result<SdexEngine, SessionError> {
        let key = self.session_key_for(public_key).ok_or_else(|| {
            SessionError::Precondition(format!(
                "No crypto context for counterparty; run the handshake first (key: {public_key:.24})"
            ))
        })?;
        Ok(SdexEngine::new(key, self.hash_length)?)
    }
}
