use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Unknown event name: {0}")]
    UnknownEvent(String),

    #[error("Malformed {event} payload: {reason}")]
    MalformedPayload { event: String, reason: String },

    #[error("Content decode error: {0}")]
    ContentDecode(#[from] base64::DecodeError),
}
