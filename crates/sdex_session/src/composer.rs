//! Payload composer — sequences SDEx and RSA per message field.
//!
//! Outbound: SDEx-encrypt each populated content field, repack the bytes as
//! base64, RSA-encrypt that string under the recipient's key. Inbound is the
//! exact mirror. The order is load-bearing in both directions: reversing it
//! produces garbage, not an error.
//!
//! RSA has no chunking here, so each field's base64-repacked SDEx ciphertext
//! must fit a single RSA operation (modulus − 11 bytes). That bound is the
//! caller's to respect.

use tracing::debug;

use sdex_crypto::{rsa, SdexEngine};
use sdex_proto::codec;
use sdex_proto::message::{Message, TransportedMessage, FIRST_PARTY_CONTACT_ID};

use crate::error::SessionError;

fn seal_field(
    engine: &SdexEngine,
    public_key_to: &str,
    plaintext: &str,
) -> Result<String, SessionError> {
    let sdex_ciphertext = engine.encrypt(plaintext)?;
    let repacked = codec::encode_content(&sdex_ciphertext);
    Ok(rsa::encrypt(public_key_to, &repacked)?)
}

fn open_field(
    engine: &SdexEngine,
    private_key_to: &str,
    ciphertext: &str,
) -> Result<String, SessionError> {
    let repacked = rsa::decrypt(private_key_to, ciphertext)?;
    let sdex_ciphertext = codec::decode_content(&repacked)?;
    Ok(engine.decrypt(&sdex_ciphertext)?)
}

/// Transform a plaintext message into its transport-opaque form.
pub fn prepare_to_send(
    message: &Message,
    public_key_from: &str,
    public_key_to: &str,
    engine: &SdexEngine,
) -> Result<TransportedMessage, SessionError> {
    debug!("composing outbound message");
    let seal = |field: &Option<String>| -> Result<Option<String>, SessionError> {
        field
            .as_deref()
            .map(|f| seal_field(engine, public_key_to, f))
            .transpose()
    };
    Ok(TransportedMessage {
        public_key_from: public_key_from.to_string(),
        public_key_to: public_key_to.to_string(),
        text: seal_field(engine, public_key_to, &message.text)?,
        created_at: message.created_at,
        image: seal(&message.image)?,
        video: seal(&message.video)?,
        audio: seal(&message.audio)?,
    })
}

/// Reverse [`prepare_to_send`]: reconstruct the plaintext message addressed
/// to the local identity (`contact_id_to = 0`, unread).
pub fn prepare_to_ingest(
    message: &TransportedMessage,
    engine: &SdexEngine,
    private_key_to: &str,
    contact_id_from: i64,
) -> Result<Message, SessionError> {
    debug!("composing inbound message");
    let open = |field: &Option<String>| -> Result<Option<String>, SessionError> {
        field
            .as_deref()
            .map(|f| open_field(engine, private_key_to, f))
            .transpose()
    };
    Ok(Message {
        id: None,
        contact_id_from,
        contact_id_to: FIRST_PARTY_CONTACT_ID,
        text: open_field(engine, private_key_to, &message.text)?,
        created_at: message.created_at,
        unread: true,
        image: open(&message.image)?,
        video: open(&message.video)?,
        audio: open(&message.audio)?,
    })
}
