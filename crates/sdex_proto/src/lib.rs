//! sdex_proto — SDEx Secure Channel protocol types and wire codec
//!
//! # Module layout
//! - `message` — plaintext `Message` and on-wire `TransportedMessage`
//! - `events`  — typed event union + boundary validation + ack values
//! - `codec`   — binary-safe base64 repacking of ciphertext
//! - `error`   — protocol error type

pub mod codec;
pub mod error;
pub mod events;
pub mod message;

pub use error::ProtoError;
pub use events::{Ack, ClientEvent, InboundEvent};
pub use message::{Message, TransportedMessage};
