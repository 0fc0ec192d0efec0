//! Async transport seam.
//!
//! The relay speaks a named-event socket with ack callbacks; the seam here is
//! an async request/response trait. Emitting an event suspends until the
//! relay acknowledges it (or the caller's timeout fires), and cancellation is
//! dropping the future. Inbound events arrive through
//! [`crate::SessionManager::handle_event`] after boundary validation in
//! `sdex_proto`.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use sdex_proto::{Ack, ClientEvent};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Acknowledgement timed out")]
    Timeout,

    #[error("Transport failure: {0}")]
    Failed(String),

    #[error("Not connected")]
    Disconnected,
}

/// Bidirectional event channel to the relay, authenticated at connect time
/// with the local public key. Implementations live outside the core.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Emit a named event and suspend until the relay acknowledges it.
    async fn emit(&self, event: ClientEvent) -> Result<Ack, TransportError>;
}

/// Bounded retry with exponential backoff for event emission.
///
/// An unacknowledged request must never hang forever. Every emission is
/// bounded: `ack_timeout` per attempt, `base_delay * 2^(attempt-1)` between
/// attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub ack_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            ack_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the attempt after `attempt` (1-indexed) failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}
