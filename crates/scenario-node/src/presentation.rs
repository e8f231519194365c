//! Presentation sink that writes to the log.

use scenario_core::presentation::PresentationSink;
use tracing::info;

/// Sends everything a participant would display to the tracing output,
/// tagged with the participant's name.
#[derive(Debug, Clone)]
pub struct TracingPresentationSink {
    participant: String,
}

impl TracingPresentationSink {
    /// Creates a sink for `participant`.
    #[must_use]
    pub fn new(participant: impl Into<String>) -> Self {
        Self {
            participant: participant.into(),
        }
    }
}

impl PresentationSink for TracingPresentationSink {
    fn show_text(&self, text: &str) {
        info!(participant = %self.participant, text, "display scenario");
    }

    fn show_status(&self, status: &str) {
        info!(participant = %self.participant, status, "display status");
    }

    fn clear(&self) {
        info!(participant = %self.participant, "clear display");
    }
}
