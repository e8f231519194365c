//! Scenario node error types.

use std::time::Duration;

use scenario_core::error::DomainError;
use scenario_core::generator::GenerationError;
use scenario_generator::ConfigError;
use thiserror::Error;

/// Startup and runtime errors for the node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A configuration variable is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The generator client could not be built.
    #[error("generator setup error: {0}")]
    Generator(#[from] GenerationError),

    /// Room membership failure.
    #[error("room error: {0}")]
    Room(#[from] DomainError),

    /// A participant did not settle in time.
    #[error("{participant} did not settle within {waited:?}")]
    Timeout {
        /// Participant name.
        participant: String,
        /// How long we waited.
        waited: Duration,
    },
}
