//! Domain error types.

use thiserror::Error;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A status change that the scenario lifecycle does not allow.
    #[error("invalid scenario transition from {from} to {to}")]
    InvalidTransition {
        /// Status the store was in.
        from: &'static str,
        /// Status that was requested.
        to: &'static str,
    },

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// A membership/transport error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
