//! Synchronization error taxonomy.
//!
//! None of these escape the protocol: they are classified and logged at the
//! point they occur.

use scenario_core::error::DomainError;
use scenario_core::generator::GenerationError;
use thiserror::Error;

/// Errors raised while handling a membership event or generator completion.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The generator request failed or produced no usable text.
    #[error("scenario generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// A generator completion belonging to an earlier room session.
    #[error("stale generator completion for epoch {completed}; current epoch is {current}")]
    StaleCompletion {
        /// Epoch the request was issued in.
        completed: u64,
        /// Epoch of the store when the completion arrived.
        current: u64,
    },

    /// A room event arrived while the participant was not in a room.
    #[error("{event} ignored while not joined to a room")]
    NotJoined {
        /// Kind of the ignored event.
        event: &'static str,
    },

    /// A broadcast or durable value that does not carry scenario text.
    #[error("malformed {origin} payload: {reason}")]
    MalformedPayload {
        /// Channel the payload came from.
        origin: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// Store transition or membership-layer failure.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl SyncError {
    /// Whether the error is expected protocol noise that must never reach the
    /// user.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::StaleCompletion { .. } | Self::NotJoined { .. })
    }
}
