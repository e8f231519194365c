//! Notifications emitted by the protocol for interested collaborators.

use serde::Serialize;

use super::scenario::ScenarioSource;

/// Lifecycle notifications. Subscribers use these instead of polling a
/// shared "scenario generated" flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioNotification {
    /// New scenario text became visible.
    Ready {
        /// Room session the text belongs to.
        epoch: u64,
        /// The scenario text.
        text: String,
        /// Where it came from.
        source: ScenarioSource,
    },
    /// The participant left the room and the scenario was discarded.
    Reset {
        /// Epoch of the new, empty session.
        epoch: u64,
    },
    /// The coordinator's generation attempt failed.
    GenerationFailed {
        /// Room session of the failed attempt.
        epoch: u64,
        /// Failure description.
        reason: String,
    },
}

impl ScenarioNotification {
    /// Dotted event name for logs and routing.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "scenario.ready",
            Self::Reset { .. } => "scenario.reset",
            Self::GenerationFailed { .. } => "scenario.generation_failed",
        }
    }
}
