//! Protocol events — one variant per named event on the transport.
//!
//! The wire protocol is a named-event channel carrying JSON payloads. Every
//! payload is a closed struct here, and inbound data is validated into
//! [`InboundEvent`] at the transport boundary, before any core logic runs.

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;
use crate::message::TransportedMessage;

/// Session-key exchange opener. All three content fields are RSA-encrypted
/// under the receiver's public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInitPayload {
    pub public_key_from: String,
    pub public_key_to: String,
    pub initialization_hash_encrypted: String,
    pub password_hash_encrypted: String,
    pub session_key_encrypted: String,
}

/// Collision resolution reply: the responder's original session key,
/// RSA-encrypted under the initiator's public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInitFollowUpPayload {
    pub public_key_from: String,
    pub session_key_encrypted: String,
}

/// Registration proof-of-possession: hex SHA-512 of the private key and the
/// server-issued salt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterFollowUpPayload {
    pub public_key: String,
    pub digest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyQueryPayload {
    pub public_key: String,
}

/// Events emitted by the client toward the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum ClientEvent {
    RegisterInit,
    RegisterFollowUp(RegisterFollowUpPayload),
    ChatInit(ChatInitPayload),
    ChatInitFollowUp(ChatInitFollowUpPayload),
    Chat(TransportedMessage),
    CheckOnline(KeyQueryPayload),
    CheckKey(KeyQueryPayload),
    UpdatePublicKey(KeyQueryPayload),
}

impl ClientEvent {
    /// Wire event name, as the relay routes it.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::RegisterInit => "registerInit",
            Self::RegisterFollowUp(_) => "registerFollowUp",
            Self::ChatInit(_) => "chatInit",
            Self::ChatInitFollowUp(_) => "chatInitFollowUp",
            Self::Chat(_) => "chat",
            Self::CheckOnline(_) => "checkOnline",
            Self::CheckKey(_) => "checkKey",
            Self::UpdatePublicKey(_) => "updatePublicKey",
        }
    }
}

/// Events delivered by the relay to the client.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    ChatInit(ChatInitPayload),
    ChatInitFollowUp(ChatInitFollowUpPayload),
    Chat(TransportedMessage),
}

impl InboundEvent {
    /// Validate a named event and its JSON payload into a typed variant.
    /// Unknown names and malformed payloads are rejected here, never deeper.
    pub fn decode(event_name: &str, payload: serde_json::Value) -> Result<Self, ProtoError> {
        let malformed = |e: serde_json::Error| ProtoError::MalformedPayload {
            event: event_name.to_string(),
            reason: e.to_string(),
        };
        match event_name {
            "chatInit" => Ok(Self::ChatInit(
                serde_json::from_value(payload).map_err(malformed)?,
            )),
            "chatInitFollowUp" => Ok(Self::ChatInitFollowUp(
                serde_json::from_value(payload).map_err(malformed)?,
            )),
            "chat" => Ok(Self::Chat(
                serde_json::from_value(payload).map_err(malformed)?,
            )),
            other => Err(ProtoError::UnknownEvent(other.to_string())),
        }
    }
}

/// Typed acknowledgement values returned by the relay for an emitted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// Event accepted; no data attached.
    Delivered,
    /// Boolean answer (`chat` delivery, `checkKey`, `checkOnline`).
    Status(bool),
    /// Registration salt issued in response to `registerInit`.
    Salt(String),
}
