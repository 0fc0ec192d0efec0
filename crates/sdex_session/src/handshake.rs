//! Session-key exchange handshake and event coordination.
//!
//! One [`SessionManager`] owns the crypto session for a device: it runs the
//! registration sub-protocol, negotiates session keys per counterparty, and
//! sends/receives chat payloads through the composer. All context mutation
//! funnels through this manager behind a single write lock.
//!
//! # Handshake states (per counterparty)
//!
//!   NoContext ── chatInit sent/received ──▶ Initiated ──▶ Established
//!
//! with a collision sub-path folding back into `Established`.
//!
//! # Collision tie-break
//! Two peers can initiate toward each other before either side's `chatInit`
//! lands; each then holds a different key for the other. The responder keeps
//! its pre-existing key and answers with `chatInitFollowUp`; the other side
//! adopts. "Responder" is deterministic: the party whose public key PEM sorts
//! lexicographically greater. Both delivery orders converge on the
//! responder's originally-chosen key; this convention is load-bearing for
//! interoperability.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use sdex_crypto::bytes::random_bytes;
use sdex_crypto::hash::{hash, registration_digest};
use sdex_crypto::sdex::SdexEngine;
use sdex_crypto::{rsa, KeyPair};
use sdex_proto::codec;
use sdex_proto::events::{
    Ack, ChatInitFollowUpPayload, ChatInitPayload, ClientEvent, InboundEvent, KeyQueryPayload,
    RegisterFollowUpPayload,
};
use sdex_proto::message::{Message, TransportedMessage};

use crate::composer;
use crate::context::{ContextUpdate, CryptoSession, HASH_BYTES};
use crate::error::SessionError;
use crate::keystore::{self, KeyStore};
use crate::transport::{RetryPolicy, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    NoContext,
    Initiated,
    Established,
}

/// Owns the crypto session and the handshake state machine for one device.
pub struct SessionManager {
    key_pair: KeyPair,
    session: RwLock<CryptoSession>,
    states: RwLock<HashMap<String, HandshakeState>>,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl SessionManager {
    /// Build a manager from explicit key material. The own context is
    /// bootstrapped immediately: password hash from the PIN, initialization
    /// hash from OS randomness.
    pub fn new(
        key_pair: KeyPair,
        pin: &str,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        hash_length: usize,
    ) -> Self {
        let mut session = CryptoSession::new(hash_length);
        session.set_own_context(derive_initialization_hash(), derive_password_hash(pin));
        Self {
            key_pair,
            session: RwLock::new(session),
            states: RwLock::new(HashMap::new()),
            transport,
            retry,
        }
    }

    /// Build a manager from platform key storage. Missing key material is a
    /// precondition failure, reported before any protocol traffic.
    pub fn from_key_store(
        store: &dyn KeyStore,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        hash_length: usize,
    ) -> Result<Self, SessionError> {
        let require = |key: &str| {
            store.get(key).ok_or_else(|| {
                SessionError::Precondition(format!("'{key}' not found in key storage"))
            })
        };
        let key_pair = KeyPair {
            public_key: require(keystore::PUBLIC_KEY)?,
            private_key: require(keystore::PRIVATE_KEY)?,
        };
        let pin = require(keystore::PIN)?;
        Ok(Self::new(key_pair, &pin, transport, retry, hash_length))
    }

    pub fn public_key(&self) -> &str {
        &self.key_pair.public_key
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// Prove possession of the private key to the relay: `registerInit`
    /// yields a salt, `registerFollowUp` returns `SHA512(privateKey ‖ salt)`.
    pub async fn register(&self) -> Result<(), SessionError> {
        info!("registering on the relay");
        let ack = self.emit_handshake(ClientEvent::RegisterInit).await?;
        let salt = match ack {
            Ack::Salt(salt) => salt,
            other => {
                return Err(SessionError::Communication(format!(
                    "registerInit ack carried no salt: {other:?}"
                )))
            }
        };
        let digest = registration_digest(&self.key_pair.private_key, &salt);
        let follow_up = ClientEvent::RegisterFollowUp(RegisterFollowUpPayload {
            public_key: self.key_pair.public_key.clone(),
            digest,
        });
        match self.emit_handshake(follow_up).await? {
            Ack::Status(true) | Ack::Delivered => {
                info!("registered on the relay");
                Ok(())
            }
            _ => Err(SessionError::HandshakeFailed(
                "Relay rejected the registration digest".into(),
            )),
        }
    }

    // ── Session-key exchange ─────────────────────────────────────────────────

    /// Open (or reuse) a session toward a counterparty.
    ///
    /// Reuse requires an established exchange, not just a stored key: a key
    /// installed by a previous initiation whose emission never got through
    /// was never learned by the peer, so the retry must generate and emit a
    /// fresh opener.
    pub async fn initiate_chat(&self, public_key_to: &str) -> Result<(), SessionError> {
        if self.state_for(public_key_to).await == HandshakeState::Established
            && self.session.read().await.session_key_for(public_key_to).is_some()
        {
            debug!("session key already negotiated; reusing it");
            return Ok(());
        }
        info!("initiating session key exchange");

        let (init_hash, password_hash) = self.own_hashes().await?;
        let hash_length = self.session.read().await.hash_length();
        let session_key = SdexEngine::generate_session_key(2 * hash_length);

        let payload = ChatInitPayload {
            public_key_from: self.key_pair.public_key.clone(),
            public_key_to: public_key_to.to_string(),
            initialization_hash_encrypted: seal_bytes(public_key_to, &init_hash)?,
            password_hash_encrypted: seal_bytes(public_key_to, &password_hash)?,
            session_key_encrypted: seal_bytes(public_key_to, &session_key)?,
        };

        // Install the chosen key before emitting so a racing chatInit from
        // the counterparty sees it and the collision rule applies.
        self.session.write().await.upsert_counterpart(
            public_key_to,
            ContextUpdate {
                session_key: Some(session_key),
                ..Default::default()
            },
        );
        self.set_state(public_key_to, HandshakeState::Initiated).await;

        self.emit_handshake(ClientEvent::ChatInit(payload)).await?;
        self.set_state(public_key_to, HandshakeState::Established).await;
        Ok(())
    }

    /// Dispatch a validated inbound event.
    ///
    /// Handshake events are handled internally (follow-ups are emitted from
    /// here). A `chat` event is returned to the caller, who resolves the
    /// sending contact and calls [`Self::ingest_message`] — persistence is
    /// outside the core.
    pub async fn handle_event(
        &self,
        event: InboundEvent,
    ) -> Result<Option<TransportedMessage>, SessionError> {
        match event {
            InboundEvent::ChatInit(payload) => {
                self.handle_chat_init(payload).await?;
                Ok(None)
            }
            InboundEvent::ChatInitFollowUp(payload) => {
                self.handle_chat_init_follow_up(payload).await?;
                Ok(None)
            }
            InboundEvent::Chat(message) => Ok(Some(message)),
        }
    }

    async fn handle_chat_init(&self, payload: ChatInitPayload) -> Result<(), SessionError> {
        info!("received chatInit");
        if payload.public_key_to != self.key_pair.public_key {
            return Err(SessionError::Communication(
                "chatInit receiver key does not match the own public key".into(),
            ));
        }

        let init_hash = fixed_hash(open_bytes(&self.key_pair.private_key, &payload.initialization_hash_encrypted)?)?;
        let password_hash = fixed_hash(open_bytes(&self.key_pair.private_key, &payload.password_hash_encrypted)?)?;
        let received_key = open_bytes(&self.key_pair.private_key, &payload.session_key_encrypted)?;

        let from = payload.public_key_from.as_str();
        let reply = {
            let mut session = self.session.write().await;
            let existing = session.session_key_for(from);
            match existing {
                None => {
                    debug!("no existing context; adopting the received key");
                    session.upsert_counterpart(
                        from,
                        ContextUpdate {
                            session_key: Some(received_key),
                            initialization_hash: Some(init_hash),
                            password_hash: Some(password_hash),
                        },
                    );
                    None
                }
                Some(ref own_key) if *own_key == received_key => {
                    debug!("existing key matches the received one; refreshing hashes");
                    session.upsert_counterpart(
                        from,
                        ContextUpdate {
                            initialization_hash: Some(init_hash),
                            password_hash: Some(password_hash),
                            ..Default::default()
                        },
                    );
                    None
                }
                Some(own_key) => {
                    // Collision: both sides generated keys independently.
                    if self.key_pair.public_key.as_str() > from {
                        warn!("session key collision; keeping the own key as responder");
                        session.upsert_counterpart(
                            from,
                            ContextUpdate {
                                initialization_hash: Some(init_hash),
                                password_hash: Some(password_hash),
                                ..Default::default()
                            },
                        );
                        Some(ChatInitFollowUpPayload {
                            public_key_from: self.key_pair.public_key.clone(),
                            session_key_encrypted: seal_bytes(from, &own_key)?,
                        })
                    } else {
                        warn!("session key collision; adopting the received key");
                        session.upsert_counterpart(
                            from,
                            ContextUpdate {
                                session_key: Some(received_key),
                                initialization_hash: Some(init_hash),
                                password_hash: Some(password_hash),
                            },
                        );
                        None
                    }
                }
            }
        };
        self.set_state(from, HandshakeState::Established).await;

        if let Some(follow_up) = reply {
            self.emit_handshake(ClientEvent::ChatInitFollowUp(follow_up)).await?;
        }
        Ok(())
    }

    async fn handle_chat_init_follow_up(
        &self,
        payload: ChatInitFollowUpPayload,
    ) -> Result<(), SessionError> {
        info!("received chatInitFollowUp; adopting the responder's key");
        let session_key = open_bytes(&self.key_pair.private_key, &payload.session_key_encrypted)?;
        self.session.write().await.upsert_counterpart(
            &payload.public_key_from,
            ContextUpdate {
                session_key: Some(session_key),
                ..Default::default()
            },
        );
        self.set_state(&payload.public_key_from, HandshakeState::Established).await;
        Ok(())
    }

    // ── Messaging ────────────────────────────────────────────────────────────

    /// Compose and emit a chat message, surfacing a relay rejection as an
    /// error rather than a silent drop.
    pub async fn send_message(
        &self,
        message: &Message,
        public_key_to: &str,
    ) -> Result<(), SessionError> {
        let engine = self.engine_for(public_key_to).await?;
        let transported = composer::prepare_to_send(
            message,
            &self.key_pair.public_key,
            public_key_to,
            &engine,
        )?;
        match self.emit_with_retry(ClientEvent::Chat(transported)).await? {
            Ack::Status(true) | Ack::Delivered => Ok(()),
            _ => Err(SessionError::Communication(
                "Relay refused to deliver the message".into(),
            )),
        }
    }

    /// Decrypt an inbound transported message for the resolved contact.
    pub async fn ingest_message(
        &self,
        message: &TransportedMessage,
        contact_id_from: i64,
    ) -> Result<Message, SessionError> {
        let engine = self.engine_for(&message.public_key_from).await?;
        composer::prepare_to_ingest(message, &engine, &self.key_pair.private_key, contact_id_from)
    }

    // ── Relay queries ────────────────────────────────────────────────────────

    pub async fn check_online(&self, public_key: &str) -> Result<bool, SessionError> {
        self.query(ClientEvent::CheckOnline(KeyQueryPayload {
            public_key: public_key.to_string(),
        }))
        .await
    }

    /// Whether a public key was ever registered on the relay.
    pub async fn check_key(&self, public_key: &str) -> Result<bool, SessionError> {
        self.query(ClientEvent::CheckKey(KeyQueryPayload {
            public_key: public_key.to_string(),
        }))
        .await
    }

    pub async fn update_public_key(&self, new_public_key: &str) -> Result<(), SessionError> {
        match self
            .emit_with_retry(ClientEvent::UpdatePublicKey(KeyQueryPayload {
                public_key: new_public_key.to_string(),
            }))
            .await?
        {
            Ack::Status(true) | Ack::Delivered => Ok(()),
            _ => Err(SessionError::Communication(
                "Relay rejected the public key update".into(),
            )),
        }
    }

    async fn query(&self, event: ClientEvent) -> Result<bool, SessionError> {
        let name = event.event_name();
        match self.emit_with_retry(event).await? {
            Ack::Status(answer) => Ok(answer),
            other => Err(SessionError::Communication(format!(
                "'{name}' ack carried no status: {other:?}"
            ))),
        }
    }

    // ── Introspection (used by callers and tests) ────────────────────────────

    pub async fn state_for(&self, public_key: &str) -> HandshakeState {
        self.states
            .read()
            .await
            .get(public_key)
            .copied()
            .unwrap_or(HandshakeState::NoContext)
    }

    pub async fn session_key_for(&self, public_key: &str) -> Option<Vec<u8>> {
        self.session.read().await.session_key_for(public_key)
    }

    pub async fn engine_for(&self, public_key: &str) -> Result<SdexEngine, SessionError> {
        self.session.read().await.engine_for(public_key)
    }

    pub async fn counterpart_hashes(
        &self,
        public_key: &str,
    ) -> Option<([u8; HASH_BYTES], [u8; HASH_BYTES])> {
        let session = self.session.read().await;
        let ctx = session.context_for(public_key)?;
        Some((*ctx.initialization_hash()?, *ctx.password_hash()?))
    }

    pub async fn own_hashes(&self) -> Result<([u8; HASH_BYTES], [u8; HASH_BYTES]), SessionError> {
        let session = self.session.read().await;
        let own = session.own_context();
        match (own.initialization_hash(), own.password_hash()) {
            (Some(init), Some(pwd)) => Ok((*init, *pwd)),
            _ => Err(SessionError::Precondition(
                "Own crypto context not initialized".into(),
            )),
        }
    }

    // ── Emission plumbing ────────────────────────────────────────────────────

    async fn set_state(&self, public_key: &str, state: HandshakeState) {
        self.states
            .write()
            .await
            .insert(public_key.to_string(), state);
    }

    /// Emit with the retry policy; a retry-exhausted timeout on a handshake
    /// event is terminal for the exchange.
    async fn emit_handshake(&self, event: ClientEvent) -> Result<Ack, SessionError> {
        let name = event.event_name();
        self.emit_with_retry(event).await.map_err(|e| match e {
            SessionError::Timeout { attempts, .. } => SessionError::HandshakeFailed(format!(
                "'{name}' was not acknowledged after {attempts} attempt(s)"
            )),
            other => other,
        })
    }

    async fn emit_with_retry(&self, event: ClientEvent) -> Result<Ack, SessionError> {
        let mut attempt = 1u32;
        loop {
            match tokio::time::timeout(self.retry.ack_timeout, self.transport.emit(event.clone()))
                .await
            {
                Ok(Ok(ack)) => return Ok(ack),
                Ok(Err(err)) => warn!(attempt, %err, event = event.event_name(), "emit failed"),
                Err(_) => warn!(attempt, event = event.event_name(), "ack timed out"),
            }
            if attempt >= self.retry.max_attempts {
                return Err(SessionError::Timeout {
                    event: event.event_name().to_string(),
                    attempts: attempt,
                });
            }
            tokio::time::sleep(self.retry.backoff(attempt)).await;
            attempt += 1;
        }
    }
}

/// RSA-encrypt raw bytes for a handshake field (base64 repack first).
fn seal_bytes(public_key_pem: &str, bytes: &[u8]) -> Result<String, SessionError> {
    Ok(rsa::encrypt(public_key_pem, &codec::encode_content(bytes))?)
}

/// Reverse of [`seal_bytes`].
fn open_bytes(private_key_pem: &str, ciphertext: &str) -> Result<Vec<u8>, SessionError> {
    let repacked = rsa::decrypt(private_key_pem, ciphertext)?;
    Ok(codec::decode_content(&repacked)?)
}

fn fixed_hash(bytes: Vec<u8>) -> Result<[u8; HASH_BYTES], SessionError> {
    <[u8; HASH_BYTES]>::try_from(bytes.as_slice()).map_err(|_| {
        SessionError::Communication(format!(
            "Handshake hash field must be {HASH_BYTES} bytes, got {}",
            bytes.len()
        ))
    })
}

fn derive_password_hash(pin: &str) -> [u8; HASH_BYTES] {
    let mut out = [0u8; HASH_BYTES];
    out.copy_from_slice(&hash(pin.as_bytes(), HASH_BYTES));
    out
}

fn derive_initialization_hash() -> [u8; HASH_BYTES] {
    let mut out = [0u8; HASH_BYTES];
    out.copy_from_slice(&random_bytes(HASH_BYTES));
    out
}
