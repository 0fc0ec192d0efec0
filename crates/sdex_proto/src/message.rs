//! Plaintext and wire message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local contact id reserved for the device's own identity.
pub const FIRST_PARTY_CONTACT_ID: i64 = 0;

/// Plaintext domain message, as stored and rendered by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Option<i64>,
    pub contact_id_from: i64,
    pub contact_id_to: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub unread: bool,
    pub image: Option<String>,
    pub video: Option<String>,
    pub audio: Option<String>,
}

impl Message {
    pub fn new(
        contact_id_from: i64,
        contact_id_to: i64,
        text: String,
        created_at: DateTime<Utc>,
        unread: bool,
    ) -> Self {
        Self {
            id: None,
            contact_id_from,
            contact_id_to,
            text,
            created_at,
            unread,
            image: None,
            video: None,
            audio: None,
        }
    }
}

/// On-wire message — what the relay sees.
///
/// Content fields carry ciphertext strings only (SDEx then RSA, see the
/// payload composer). Public keys and the timestamp pass in the clear as
/// routing/ordering metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportedMessage {
    pub public_key_from: String,
    pub public_key_to: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_media_fields_stay_off_the_wire() {
        let msg = TransportedMessage {
            public_key_from: "pk-a".into(),
            public_key_to: "pk-b".into(),
            text: "ct".into(),
            created_at: Utc::now(),
            image: None,
            video: None,
            audio: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("image"));
        assert!(json.contains("publicKeyFrom"));
    }
}
